//! Relevance bookkeeping for candidate conjunctions.
//!
//! Each candidate is keyed by the [`BaseSet`] it would cover if promoted.
//! The tracker accumulates TD error evidence per candidate and remembers
//! when each candidate was first seen, which fixes the promotion order when
//! several candidates cross the threshold in the same discovery step.
//!
//! # Decay
//!
//! With a decay factor `d`, accumulated sums shrink by `d` for every
//! discovery step during which the candidate was not touched. Decay is
//! applied lazily when the candidate is read or bumped.
//!
//! # Capacity
//!
//! A tracker can be capped. Once the cap is reached, bumping an unseen
//! candidate evicts the least recently bumped one.

use std::{collections::HashMap, num::NonZeroUsize};

use lru::LruCache;

use crate::feature::{BaseSet, FeatureId};

/// Evidence accumulated for one candidate conjunction.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateStats {
    /// The first pair of active features seen forming this candidate.
    pub parents: [FeatureId; 2],
    /// Sequence number assigned when the candidate was first bumped.
    pub first_seen: u64,
    /// Sum of signed TD errors.
    pub cumulative_td: f64,
    /// Sum of absolute TD errors.
    pub cumulative_abs_td: f64,
    /// Number of bumps.
    pub count: u64,
    last_step: u64,
}

impl CandidateStats {
    /// `|sum of TD errors| / sqrt(count)`, the iFDD+ relevance.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn normalized_relevance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.cumulative_td.abs() / (self.count as f64).sqrt()
        }
    }
}

#[derive(Debug)]
enum Candidates {
    Unbounded(HashMap<BaseSet, CandidateStats>),
    Bounded(LruCache<BaseSet, CandidateStats>),
}

impl Clone for Candidates {
    fn clone(&self) -> Self {
        match self {
            Self::Unbounded(map) => Self::Unbounded(map.clone()),
            Self::Bounded(cache) => {
                let mut copy = LruCache::new(cache.cap());
                // oldest first so the copy keeps the same recency order
                for (key, stats) in cache.iter().rev() {
                    copy.put(key.clone(), stats.clone());
                }
                Self::Bounded(copy)
            }
        }
    }
}

impl Candidates {
    fn len(&self) -> usize {
        match self {
            Self::Unbounded(map) => map.len(),
            Self::Bounded(cache) => cache.len(),
        }
    }

    fn get(&self, key: &BaseSet) -> Option<&CandidateStats> {
        match self {
            Self::Unbounded(map) => map.get(key),
            Self::Bounded(cache) => cache.peek(key),
        }
    }

    fn remove(&mut self, key: &BaseSet) -> Option<CandidateStats> {
        match self {
            Self::Unbounded(map) => map.remove(key),
            Self::Bounded(cache) => cache.pop(key),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelevanceTracker {
    candidates: Candidates,
    decay: f64,
    step: u64,
    next_seq: u64,
    evicted: u64,
}

impl Default for RelevanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RelevanceTracker {
    /// Unbounded tracker without decay.
    #[must_use]
    pub fn new() -> Self {
        Self {
            candidates: Candidates::Unbounded(HashMap::new()),
            decay: 1.0,
            step: 0,
            next_seq: 0,
            evicted: 0,
        }
    }

    /// Caps the tracker at `capacity` candidates. Candidates already
    /// tracked are kept if they fit.
    #[must_use]
    pub fn with_capacity_limit(mut self, capacity: NonZeroUsize) -> Self {
        // oldest first, so the newest candidates survive a smaller cap
        let existing = match self.candidates {
            Candidates::Unbounded(map) => {
                let mut existing = map.into_iter().collect::<Vec<_>>();
                existing.sort_by_key(|(_, stats)| stats.first_seen);
                existing
            }
            Candidates::Bounded(old) => {
                let mut existing = old.into_iter().collect::<Vec<_>>();
                existing.reverse();
                existing
            }
        };
        let mut cache = LruCache::new(capacity);
        for (key, stats) in existing {
            if cache.push(key, stats).is_some() {
                self.evicted += 1;
            }
        }
        self.candidates = Candidates::Bounded(cache);
        self
    }

    /// Sets the per-step decay factor. `decay` must be in `(0, 1]`; `1.0`
    /// disables decay.
    #[must_use]
    pub fn with_decay(mut self, decay: f64) -> Self {
        debug_assert!(decay > 0.0 && decay <= 1.0);
        self.decay = decay;
        self
    }

    /// Advances the decay clock by one discovery step.
    pub fn advance_step(&mut self) {
        self.step += 1;
    }

    #[must_use]
    pub fn step(&self) -> u64 {
        self.step
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of candidates dropped because of the capacity limit.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Accumulates `td_error` into the candidate `key`, creating it if unseen.
    pub fn bump(&mut self, key: &BaseSet, parents: [FeatureId; 2], td_error: f64) -> &CandidateStats {
        let (step, decay, seq) = (self.step, self.decay, self.next_seq);
        let fresh = move || CandidateStats {
            parents,
            first_seen: seq,
            cumulative_td: 0.0,
            cumulative_abs_td: 0.0,
            count: 0,
            last_step: step,
        };

        let (stats, created, evicted) = match &mut self.candidates {
            Candidates::Unbounded(map) => {
                let created = !map.contains_key(key);
                (map.entry(key.clone()).or_insert_with(fresh), created, false)
            }
            Candidates::Bounded(cache) => {
                let created = !cache.contains(key);
                let evicted = created && cache.len() == cache.cap().get();
                (cache.get_or_insert_mut(key.clone(), fresh), created, evicted)
            }
        };
        apply_decay(stats, step, decay);
        stats.cumulative_td += td_error;
        stats.cumulative_abs_td += td_error.abs();
        stats.count += 1;

        if created {
            self.next_seq += 1;
        }
        if evicted {
            self.evicted += 1;
        }
        stats
    }

    /// Decayed cumulative absolute TD error of `key`; zero if unseen.
    #[must_use]
    pub fn value_of(&self, key: &BaseSet) -> f64 {
        self.get(key).map_or(0.0, |stats| {
            stats.cumulative_abs_td * decay_factor(self.decay, self.step - stats.last_step)
        })
    }

    /// Looks up `key` without refreshing its recency.
    #[must_use]
    pub fn get(&self, key: &BaseSet) -> Option<&CandidateStats> {
        self.candidates.get(key)
    }

    pub fn remove(&mut self, key: &BaseSet) -> Option<CandidateStats> {
        self.candidates.remove(key)
    }
}

fn decay_factor(decay: f64, elapsed: u64) -> f64 {
    if decay >= 1.0 || elapsed == 0 {
        1.0
    } else {
        decay.powi(i32::try_from(elapsed).unwrap_or(i32::MAX))
    }
}

fn apply_decay(stats: &mut CandidateStats, step: u64, decay: f64) {
    let factor = decay_factor(decay, step - stats.last_step);
    stats.cumulative_td *= factor;
    stats.cumulative_abs_td *= factor;
    stats.last_step = step;
}
