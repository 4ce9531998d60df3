//! Learning experiments on top of `ifdd-core` representations.
//!
//! - [`seed`] - reproducible seeds for runs and their components
//! - [`domain`] - the environment interface and two small test domains
//! - [`policy`] - epsilon-greedy action selection
//! - [`agent`] - linear SARSA / Q-learning with eligibility traces
//! - [`experiment`] - the learn / evaluate loop, reports and seed sweeps
//!
//! Progress is reported through `tracing`; installing a subscriber is left
//! to the caller.

use ifdd_core::{
    ConfigurationError, RepresentationError, UnknownActionError, UnknownFeatureError,
    WeightGrowthError,
};

pub mod agent;
pub mod domain;
pub mod experiment;
pub mod policy;
pub mod seed;

#[derive(
    Debug, derive_more::Display, derive_more::Error, derive_more::From, derive_more::IsVariant,
)]
pub enum AgentError {
    #[display("{_0}")]
    Representation(RepresentationError),
    #[display("{_0}")]
    Configuration(ConfigurationError),
    #[display("no allowed actions in the current state")]
    #[from(skip)]
    NoAllowedActions,
    #[display("action {action} is out of range for {num_actions} actions")]
    #[from(skip)]
    UnknownAction { action: usize, num_actions: usize },
    #[display("snapshot does not describe the representation's features")]
    #[from(skip)]
    SnapshotMismatch,
}

impl From<UnknownFeatureError> for AgentError {
    fn from(err: UnknownFeatureError) -> Self {
        Self::Representation(err.into())
    }
}

impl From<WeightGrowthError> for AgentError {
    fn from(err: WeightGrowthError) -> Self {
        Self::Representation(err.into())
    }
}

impl From<UnknownActionError> for AgentError {
    fn from(err: UnknownActionError) -> Self {
        let UnknownActionError {
            action,
            num_actions,
        } = err;
        Self::UnknownAction {
            action,
            num_actions,
        }
    }
}
