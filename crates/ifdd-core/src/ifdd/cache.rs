use std::collections::HashMap;

use crate::feature::{BaseSet, FeatureId};

/// Memoized final active features, keyed by the initial (base) active set.
#[derive(Debug, Clone, Default)]
pub struct ActivationCache {
    entries: HashMap<Vec<FeatureId>, Vec<FeatureId>>,
    hits: u64,
    misses: u64,
}

impl ActivationCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn get(&mut self, initial: &[FeatureId]) -> Option<&[FeatureId]> {
        if let Some(active) = self.entries.get(initial) {
            self.hits += 1;
            Some(active)
        } else {
            self.misses += 1;
            None
        }
    }

    pub fn insert(&mut self, initial: Vec<FeatureId>, active: Vec<FeatureId>) {
        self.entries.insert(initial, active);
    }

    /// Brings cached results up to date after `id` covering `base_set` was
    /// promoted.
    ///
    /// With sparsify the new feature may replace base features or shadow
    /// smaller conjunctions, so every affected entry is dropped and recomputed
    /// on the next query. Without sparsify the new feature is simply active
    /// in addition to everything else.
    pub fn on_promotion(&mut self, base_set: &BaseSet, id: FeatureId, sparsify: bool) {
        if sparsify {
            self.entries
                .retain(|initial, _| !base_set.is_subset_of(initial));
        } else {
            for (initial, active) in &mut self.entries {
                if base_set.is_subset_of(initial) {
                    // new ids are the largest so far
                    active.push(id);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
