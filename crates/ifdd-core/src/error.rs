use crate::feature::FeatureId;

/// Invalid setup parameters. Raised while building a grid, an engine or a
/// learner, and never recovered from.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum ConfigurationError {
    #[display("dimension {dimension} must have at least one bin")]
    ZeroBins { dimension: usize },
    #[display("dimension {dimension} has an invalid range [{lower}, {upper}]")]
    InvalidRange {
        dimension: usize,
        lower: f64,
        upper: f64,
    },
    #[display("dimension {dimension} uses compact binary activation but has {bins} bins")]
    CompactBinaryBins { dimension: usize, bins: usize },
    #[display("state has {actual} dimensions but the grid expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[display("grid must have at least one dimension")]
    NoDimensions,
    #[display("discovery threshold must be positive and finite, got {threshold}")]
    InvalidThreshold { threshold: f64 },
    #[display("relevance decay must be in (0, 1], got {decay}")]
    InvalidDecay { decay: f64 },
    #[display("candidate capacity must be positive")]
    ZeroCapacity,
    #[display("iFDD+ probability must be in [0, 1], got {probability}")]
    InvalidProbability { probability: f64 },
    #[display("{name} must be in [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[display("{name} must be at least {min}, got {value}")]
    TooSmall {
        name: &'static str,
        value: usize,
        min: usize,
    },
    #[display("a value function needs at least one action")]
    NoActions,
    #[display("grid has more cells than fit in an index")]
    StateSpaceOverflow,
}

/// A query referenced a feature id that is not in the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("feature {id} is not in the catalogue ({known} features known)")]
pub struct UnknownFeatureError {
    pub id: FeatureId,
    pub known: usize,
}

/// An action index outside the range of a value function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("action {action} is out of range for {num_actions} actions")]
pub struct UnknownActionError {
    pub action: usize,
    pub num_actions: usize,
}

/// A state vector contained a value that cannot be discretized.
#[derive(Debug, Clone, Copy, PartialEq, derive_more::Display, derive_more::Error)]
#[display("state value {value} in dimension {dimension} is not finite")]
pub struct InvalidStateError {
    pub dimension: usize,
    pub value: f64,
}

/// Weights can only be appended at the next free index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("cannot append weight for feature {actual}; next weight index is {expected}")]
pub struct WeightGrowthError {
    pub expected: FeatureId,
    pub actual: FeatureId,
}

/// A snapshot does not describe a consistent catalogue or weight table.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum SnapshotError {
    #[display("snapshot has {actual} base features but the grid provides {expected}")]
    BaseCountMismatch { expected: usize, actual: usize },
    #[display("discovered feature {actual} is out of sequence; expected {expected}")]
    NonSequentialId { expected: FeatureId, actual: FeatureId },
    #[display("discovered feature {id} has an invalid base set")]
    InvalidBaseSet { id: FeatureId },
    #[display("discovered feature {id} duplicates the base set of an earlier feature")]
    DuplicateBaseSet { id: FeatureId },
    #[display("weights for action {action} have length {actual}, expected {expected}")]
    WeightLengthMismatch {
        action: usize,
        expected: usize,
        actual: usize,
    },
    #[display("snapshot has no weight vectors")]
    NoWeights,
}

/// Any failure a [`Representation`](crate::representation::Representation) or
/// value function can report.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum RepresentationError {
    #[display("{_0}")]
    Configuration(ConfigurationError),
    #[display("{_0}")]
    UnknownFeature(UnknownFeatureError),
    #[display("{_0}")]
    UnknownAction(UnknownActionError),
    #[display("{_0}")]
    InvalidState(InvalidStateError),
    #[display("{_0}")]
    WeightGrowth(WeightGrowthError),
    #[display("{_0}")]
    Snapshot(SnapshotError),
}
