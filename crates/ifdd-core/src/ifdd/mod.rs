//! Incremental feature dependency discovery.
//!
//! The [`IfddEngine`] starts from the base features of a
//! [`DiscretizationGrid`] and grows conjunctions of them online. Whenever the
//! learner observes a TD error, every pair of simultaneously active features
//! forms a candidate conjunction whose relevance accumulates that error.
//! Once a candidate's relevance exceeds the discovery threshold it is
//! promoted to a new feature with the next free id.
//!
//! Activation is greedy: discovered features are tried largest first, and
//! with sparsify enabled an activated conjunction switches off the base
//! features it covers.
//!
//! # Example
//!
//! ```
//! use ifdd_core::{
//!     discretization::DiscretizationGrid,
//!     feature::FeatureId,
//!     ifdd::{IfddConfig, IfddEngine},
//! };
//!
//! let grid = DiscretizationGrid::uniform(&[(0.0, 1.0), (0.0, 1.0)], 2).unwrap();
//! let config = IfddConfig {
//!     discovery_threshold: 5.0,
//!     ..IfddConfig::default()
//! };
//! let mut engine = IfddEngine::new(grid, config).unwrap();
//!
//! let active = engine.active_features(&[0.1, 0.1], false).unwrap();
//! assert_eq!(active, vec![FeatureId::new(0), FeatureId::new(2)]);
//!
//! let mut discovered = vec![];
//! for _ in 0..6 {
//!     discovered.extend(engine.discover(&active, 1.0).unwrap());
//! }
//! assert_eq!(discovered, vec![FeatureId::new(4)]);
//! assert_eq!(engine.num_features(), 5);
//! assert_eq!(
//!     engine.active_features(&[0.1, 0.1], false).unwrap(),
//!     vec![FeatureId::new(4)]
//! );
//! ```

use std::collections::BTreeMap;

use rand::{Rng as _, SeedableRng as _};
use rand_pcg::Pcg32;

use crate::{
    discretization::DiscretizationGrid,
    error::{RepresentationError, SnapshotError, UnknownFeatureError},
    feature::{BaseSet, CatalogueEntry, FeatureCatalogue, FeatureId},
    relevance::RelevanceTracker,
    snapshot::CatalogueSnapshot,
};

pub use self::{
    cache::ActivationCache,
    config::{IfddConfig, RelevanceMode},
};

mod cache;
mod config;

#[derive(Debug, Clone)]
pub struct IfddEngine {
    grid: DiscretizationGrid,
    config: IfddConfig,
    catalogue: FeatureCatalogue,
    tracker: RelevanceTracker,
    cache: ActivationCache,
    rng: Pcg32,
    step: u64,
    max_relevance: f64,
}

/// A candidate that crossed the threshold during one discovery call.
struct Crossing {
    key: BaseSet,
    parents: [FeatureId; 2],
    relevance: f64,
}

impl IfddEngine {
    pub fn new(grid: DiscretizationGrid, config: IfddConfig) -> Result<Self, RepresentationError> {
        config.validate()?;
        let catalogue = FeatureCatalogue::new(grid.feature_count());
        let tracker = config.build_tracker();
        let rng = Pcg32::seed_from_u64(config.seed);
        Ok(Self {
            grid,
            config,
            catalogue,
            tracker,
            cache: ActivationCache::new(),
            rng,
            step: 0,
            max_relevance: 0.0,
        })
    }

    /// Rebuilds an engine whose catalogue matches `snapshot`.
    ///
    /// Candidate statistics are not part of a snapshot; the restored engine
    /// starts with an empty tracker.
    pub fn restore(
        grid: DiscretizationGrid,
        config: IfddConfig,
        snapshot: &CatalogueSnapshot,
    ) -> Result<Self, RepresentationError> {
        let mut engine = Self::new(grid, config)?;
        if snapshot.base_feature_count != engine.catalogue.base_count() {
            return Err(SnapshotError::BaseCountMismatch {
                expected: engine.catalogue.base_count(),
                actual: snapshot.base_feature_count,
            }
            .into());
        }
        snapshot.validate()?;
        for record in &snapshot.discovered {
            engine.catalogue.insert_discovered(
                record.base_ids.clone(),
                record.parents,
                record.discovered_at,
                record.relevance,
            );
            engine.step = engine.step.max(record.discovered_at);
        }
        Ok(engine)
    }

    #[must_use]
    pub fn grid(&self) -> &DiscretizationGrid {
        &self.grid
    }

    #[must_use]
    pub fn config(&self) -> &IfddConfig {
        &self.config
    }

    #[must_use]
    pub fn catalogue(&self) -> &FeatureCatalogue {
        &self.catalogue
    }

    #[must_use]
    pub fn tracker(&self) -> &RelevanceTracker {
        &self.tracker
    }

    #[must_use]
    pub fn cache(&self) -> &ActivationCache {
        &self.cache
    }

    #[must_use]
    pub fn num_features(&self) -> usize {
        self.catalogue.len()
    }

    #[must_use]
    pub fn base_feature_count(&self) -> usize {
        self.catalogue.base_count()
    }

    pub fn feature(&self, id: FeatureId) -> Result<&CatalogueEntry, UnknownFeatureError> {
        self.catalogue.get(id)
    }

    /// Number of discovery calls so far.
    #[must_use]
    pub fn discovery_step(&self) -> u64 {
        self.step
    }

    /// Largest candidate relevance observed since the last promotion.
    #[must_use]
    pub fn max_relevance(&self) -> f64 {
        self.max_relevance
    }

    #[must_use]
    pub fn snapshot(&self) -> CatalogueSnapshot {
        CatalogueSnapshot::from_catalogue(&self.catalogue)
    }

    /// Final active features of `state`, ascending. Terminal states activate
    /// nothing.
    pub fn active_features(
        &mut self,
        state: &[f64],
        terminal: bool,
    ) -> Result<Vec<FeatureId>, RepresentationError> {
        if terminal {
            return Ok(vec![]);
        }
        let initial = self.grid.active_features(state)?;
        Ok(self.final_active_features(&initial)?)
    }

    /// Maps an initial set of base features to the final active features.
    pub fn final_active_features(
        &mut self,
        initial: &[FeatureId],
    ) -> Result<Vec<FeatureId>, UnknownFeatureError> {
        self.catalogue.check_base(initial)?;
        let mut initial = initial.to_vec();
        initial.sort_unstable();
        initial.dedup();

        if !self.config.use_cache {
            return Ok(self.compute_final_active(&initial));
        }
        if let Some(active) = self.cache.get(&initial) {
            return Ok(active.to_vec());
        }
        let active = self.compute_final_active(&initial);
        self.cache.insert(initial, active.clone());
        Ok(active)
    }

    fn compute_final_active(&self, initial: &[FeatureId]) -> Vec<FeatureId> {
        let mut remaining = initial.to_vec();
        let mut active = vec![];
        for &id in self.catalogue.activation_order() {
            if remaining.len() < 2 {
                break;
            }
            let base_set = &self.catalogue.as_slice()[id.index()].base_set;
            if base_set.is_subset_of(&remaining) {
                active.push(id);
                if self.config.sparsify {
                    remaining.retain(|b| base_set.as_slice().binary_search(b).is_err());
                }
            }
        }
        active.extend(remaining);
        active.sort_unstable();
        active
    }

    /// Feeds one TD error into the relevance of every candidate formed by
    /// `active` and promotes candidates that crossed the threshold.
    ///
    /// Returns the ids created by this call, in creation order. Weight
    /// vectors must be grown by the caller for each of them.
    pub fn discover(
        &mut self,
        active: &[FeatureId],
        td_error: f64,
    ) -> Result<Vec<FeatureId>, RepresentationError> {
        self.advance_step();
        if td_error == 0.0 {
            return Ok(vec![]);
        }
        if !td_error.is_finite() {
            tracing::warn!(td_error, "ignoring non-finite TD error");
            return Ok(vec![]);
        }

        let mut active = active.to_vec();
        active.sort_unstable();
        active.dedup();
        for &id in &active {
            self.catalogue.get(id)?;
        }

        let mut crossings = BTreeMap::new();
        for (i, &g) in active.iter().enumerate() {
            for &h in &active[i + 1..] {
                let Some((key, relevance)) = self.bump_pair(g, h, td_error) else {
                    continue;
                };
                let first_seen = self.tracker.get(&key).map_or(u64::MAX, |s| s.first_seen);
                if relevance > self.config.discovery_threshold {
                    crossings.insert(
                        first_seen,
                        Crossing {
                            key,
                            parents: [g, h],
                            relevance,
                        },
                    );
                } else {
                    // iFDD+ relevance can drop below the threshold again
                    crossings.remove(&first_seen);
                }
            }
        }

        Ok(crossings
            .into_values()
            .map(|crossing| self.promote(crossing))
            .collect())
    }

    /// Inspects a single pair of active features and promotes its
    /// conjunction immediately if it crosses the threshold.
    ///
    /// Unlike [`discover`](Self::discover) this does not advance the
    /// discovery step.
    pub fn inspect_pair(
        &mut self,
        g: FeatureId,
        h: FeatureId,
        td_error: f64,
    ) -> Result<Option<FeatureId>, RepresentationError> {
        self.catalogue.get(g)?;
        self.catalogue.get(h)?;
        if g == h || td_error == 0.0 || !td_error.is_finite() {
            return Ok(None);
        }
        let (g, h) = if g < h { (g, h) } else { (h, g) };
        let Some((key, relevance)) = self.bump_pair(g, h, td_error) else {
            return Ok(None);
        };
        if relevance > self.config.discovery_threshold {
            let crossing = Crossing {
                key,
                parents: [g, h],
                relevance,
            };
            Ok(Some(self.promote(crossing)))
        } else {
            Ok(None)
        }
    }

    /// Runs [`discover`](Self::discover) on each `(active, td_error)` sample
    /// in order and returns every id created.
    pub fn batch_discover<I, A>(&mut self, samples: I) -> Result<Vec<FeatureId>, RepresentationError>
    where
        I: IntoIterator<Item = (A, f64)>,
        A: AsRef<[FeatureId]>,
    {
        let mut created = vec![];
        for (active, td_error) in samples {
            created.extend(self.discover(active.as_ref(), td_error)?);
        }
        Ok(created)
    }

    fn advance_step(&mut self) {
        self.step += 1;
        self.tracker.advance_step();
    }

    /// Bumps the conjunction of `g` and `h`. Returns `None` when the
    /// conjunction is already a known feature.
    fn bump_pair(&mut self, g: FeatureId, h: FeatureId, td_error: f64) -> Option<(BaseSet, f64)> {
        let entries = self.catalogue.as_slice();
        let key = entries[g.index()]
            .base_set
            .union(&entries[h.index()].base_set);
        if self.catalogue.lookup(&key).is_some() {
            return None;
        }

        let stats = self.tracker.bump(&key, [g, h], td_error);
        let normalized = match self.config.relevance {
            RelevanceMode::Classic => false,
            RelevanceMode::Plus { probability } => self.rng.random_bool(probability),
        };
        let relevance = if normalized {
            stats.normalized_relevance()
        } else {
            stats.cumulative_abs_td
        };

        if relevance > self.max_relevance {
            self.max_relevance = relevance;
            tracing::trace!(candidate = %key, relevance, "new maximum relevance");
        }
        Some((key, relevance))
    }

    fn promote(&mut self, crossing: Crossing) -> FeatureId {
        let Crossing {
            key,
            parents,
            relevance,
        } = crossing;
        self.tracker.remove(&key);
        let id = self
            .catalogue
            .insert_discovered(key.clone(), parents, self.step, relevance);
        if self.config.use_cache {
            self.cache.on_promotion(&key, id, self.config.sparsify);
        }
        self.max_relevance = 0.0;
        tracing::debug!(
            %id,
            base_set = %key,
            parent_a = %parents[0],
            parent_b = %parents[1],
            relevance,
            step = self.step,
            "discovered feature"
        );
        id
    }
}
