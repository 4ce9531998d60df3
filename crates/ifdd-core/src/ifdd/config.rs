use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::{error::ConfigurationError, relevance::RelevanceTracker};

/// How a candidate's relevance is computed from its accumulated evidence.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RelevanceMode {
    /// Sum of absolute TD errors.
    #[default]
    Classic,
    /// With the given probability, `|sum of TD errors| / sqrt(count)`;
    /// otherwise the classic sum of absolute TD errors.
    Plus { probability: f64 },
}

/// Parameters of an [`IfddEngine`](super::IfddEngine).
///
/// Deserializes from JSON with every field optional:
///
/// ```
/// use ifdd_core::ifdd::IfddConfig;
///
/// let config: IfddConfig = serde_json::from_str(r#"{"discovery_threshold": 5.0}"#).unwrap();
/// assert_eq!(config.discovery_threshold, 5.0);
/// assert!(config.sparsify);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IfddConfig {
    /// A candidate is promoted once its relevance is strictly greater than
    /// this value.
    pub discovery_threshold: f64,
    /// Activate a discovered feature in place of its base features.
    pub sparsify: bool,
    /// Memoize final active features per initial active set.
    pub use_cache: bool,
    pub relevance: RelevanceMode,
    /// Evict least recently bumped candidates beyond this count.
    pub max_tracked_candidates: Option<usize>,
    /// Per-step decay of candidate evidence, in `(0, 1]`.
    pub relevance_decay: Option<f64>,
    /// Seed of the engine's own generator (used by [`RelevanceMode::Plus`]).
    pub seed: u64,
}

impl Default for IfddConfig {
    fn default() -> Self {
        Self {
            discovery_threshold: 1.0,
            sparsify: true,
            use_cache: true,
            relevance: RelevanceMode::Classic,
            max_tracked_candidates: None,
            relevance_decay: None,
            seed: 1,
        }
    }
}

impl IfddConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let threshold = self.discovery_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ConfigurationError::InvalidThreshold { threshold });
        }
        if let Some(decay) = self.relevance_decay
            && !(decay > 0.0 && decay <= 1.0)
        {
            return Err(ConfigurationError::InvalidDecay { decay });
        }
        if self.max_tracked_candidates == Some(0) {
            return Err(ConfigurationError::ZeroCapacity);
        }
        if let RelevanceMode::Plus { probability } = self.relevance
            && !(0.0..=1.0).contains(&probability)
        {
            return Err(ConfigurationError::InvalidProbability { probability });
        }
        Ok(())
    }

    pub(crate) fn build_tracker(&self) -> RelevanceTracker {
        let mut tracker = RelevanceTracker::new();
        if let Some(capacity) = self.max_tracked_candidates.and_then(NonZeroUsize::new) {
            tracker = tracker.with_capacity_limit(capacity);
        }
        if let Some(decay) = self.relevance_decay {
            tracker = tracker.with_decay(decay);
        }
        tracker
    }
}
