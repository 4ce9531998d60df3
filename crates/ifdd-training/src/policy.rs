use ifdd_core::{feature::FeatureId, value_function::ActionValueFunction};
use rand::{Rng as _, seq::IndexedRandom as _};
use rand_pcg::Pcg32;

use crate::AgentError;

/// Epsilon-greedy action selection over an [`ActionValueFunction`].
///
/// With probability `epsilon` a uniformly random allowed action is taken;
/// otherwise the best action. Exploration can be switched off for
/// performance checks.
#[derive(Debug, Clone)]
pub struct EpsilonGreedy {
    epsilon: f64,
    deterministic_ties: bool,
    exploring: bool,
    rng: Pcg32,
}

impl EpsilonGreedy {
    #[must_use]
    pub fn new(epsilon: f64, deterministic_ties: bool, rng: Pcg32) -> Self {
        Self {
            epsilon,
            deterministic_ties,
            exploring: true,
            rng,
        }
    }

    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    #[must_use]
    pub fn is_exploring(&self) -> bool {
        self.exploring
    }

    pub fn turn_off_exploration(&mut self) {
        self.exploring = false;
    }

    pub fn turn_on_exploration(&mut self) {
        self.exploring = true;
    }

    pub fn select(
        &mut self,
        q: &ActionValueFunction,
        active: &[FeatureId],
        allowed: &[usize],
    ) -> Result<usize, AgentError> {
        if allowed.is_empty() {
            return Err(AgentError::NoAllowedActions);
        }
        if self.exploring && self.rng.random_bool(self.epsilon) {
            return allowed
                .choose(&mut self.rng)
                .copied()
                .ok_or(AgentError::NoAllowedActions);
        }
        let best = q.best_actions(active, allowed)?;
        let choice = if self.deterministic_ties {
            best.first()
        } else {
            best.choose(&mut self.rng)
        };
        choice.copied().ok_or(AgentError::NoAllowedActions)
    }
}
