//! Linear TD control: SARSA and Q-learning with eligibility traces.
//!
//! One learning step, given a transition `(s, a, r, s', a')`:
//!
//! 1. compute the active features of `s` and `s'`
//! 2. compute the TD error `r + gamma * Q(s', a'') - Q(s, a)`, where `a''` is
//!    `a'` for SARSA and the greedy action in `s'` for Q-learning
//! 3. feed the TD error to the representation and append a weight for every
//!    feature it discovers
//! 4. update the weights along the eligibility traces
//!
//! Updates that would make any weight non-finite are rolled back.

use ifdd_core::{
    error::ConfigurationError,
    feature::FeatureId,
    representation::{NewFeature, Representation},
    snapshot::Snapshot,
    value_function::ActionValueFunction,
};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::{AgentError, domain::Observation, policy::EpsilonGreedy};

#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::FromStr,
)]
#[serde(rename_all = "snake_case")]
pub enum TdAlgorithm {
    /// On-policy: bootstraps from the action actually taken next.
    #[default]
    Sarsa,
    /// Off-policy: bootstraps from the greedy action.
    QLearning,
}

/// How the step size evolves during learning.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StepSizeSchedule {
    #[default]
    Constant,
    /// `alpha0 * (n0 + 1) / (n0 + episodes^1.1)`, divided by the number of
    /// active features.
    Boyan { n0: f64 },
    /// Like [`Boyan`](Self::Boyan) without the division by the number of
    /// active features.
    BoyanConstant { n0: f64 },
    /// Adaptive upper bound from Dabney and Barto (2012).
    Dabney,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub algorithm: TdAlgorithm,
    /// Trace decay; `0` disables eligibility traces.
    pub lambda: f64,
    pub initial_step_size: f64,
    pub schedule: StepSizeSchedule,
    pub epsilon: f64,
    /// Break ties between equally valued actions by taking the first one.
    pub deterministic_ties: bool,
    /// Initialize weights of discovered features to the sum of their parents'
    /// weights instead of zero.
    pub inherit_parent_weights: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            algorithm: TdAlgorithm::Sarsa,
            lambda: 0.0,
            initial_step_size: 0.1,
            schedule: StepSizeSchedule::Constant,
            epsilon: 0.1,
            deterministic_ties: false,
            inherit_parent_weights: false,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_range("lambda", self.lambda, 0.0, 1.0)?;
        check_range("epsilon", self.epsilon, 0.0, 1.0)?;
        if !self.initial_step_size.is_finite() || self.initial_step_size <= 0.0 {
            return Err(ConfigurationError::OutOfRange {
                name: "initial step size",
                value: self.initial_step_size,
                min: f64::MIN_POSITIVE,
                max: f64::MAX,
            });
        }
        if let StepSizeSchedule::Boyan { n0 } | StepSizeSchedule::BoyanConstant { n0 } =
            self.schedule
        {
            check_range("boyan n0", n0, 0.0, f64::MAX)?;
        }
        Ok(())
    }
}

fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigurationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigurationError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}

/// Result of one learning step.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnOutcome {
    pub td_error: f64,
    pub new_features: Vec<NewFeature>,
    /// The weight update was rolled back because it produced non-finite
    /// weights.
    pub diverged: bool,
}

#[derive(Debug, Clone)]
pub struct TdAgent<R> {
    representation: R,
    q: ActionValueFunction,
    policy: EpsilonGreedy,
    config: AgentConfig,
    discount_factor: f64,
    // one trace per action, empty when lambda is zero
    traces: Vec<Vec<f64>>,
    step_size: f64,
    episode_count: u64,
    diverged_updates: u64,
}

impl<R> TdAgent<R>
where
    R: Representation,
{
    pub fn new(
        representation: R,
        num_actions: usize,
        discount_factor: f64,
        config: AgentConfig,
        rng: Pcg32,
    ) -> Result<Self, AgentError> {
        let q = ActionValueFunction::new(
            num_actions,
            representation.num_features(),
            config.initial_step_size,
        )?;
        Self::with_value_function(representation, q, discount_factor, config, rng)
    }

    /// Resumes learning from stored weights.
    ///
    /// `representation` must already describe the catalogue of `snapshot`,
    /// e.g. an engine built with `IfddEngine::restore`.
    pub fn restore(
        representation: R,
        discount_factor: f64,
        config: AgentConfig,
        rng: Pcg32,
        snapshot: &Snapshot,
    ) -> Result<Self, AgentError> {
        snapshot
            .validate()
            .map_err(ifdd_core::RepresentationError::from)?;
        if snapshot.catalogue != representation.catalogue_snapshot() {
            return Err(AgentError::SnapshotMismatch);
        }
        let q = ActionValueFunction::from_weights(
            snapshot.weights.clone(),
            config.initial_step_size,
        )?;
        Self::with_value_function(representation, q, discount_factor, config, rng)
    }

    fn with_value_function(
        representation: R,
        q: ActionValueFunction,
        discount_factor: f64,
        config: AgentConfig,
        rng: Pcg32,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        check_range("discount factor", discount_factor, 0.0, 1.0)?;
        let traces = if config.lambda > 0.0 {
            vec![vec![0.0; q.num_features()]; q.num_actions()]
        } else {
            vec![]
        };
        let policy = EpsilonGreedy::new(config.epsilon, config.deterministic_ties, rng);
        Ok(Self {
            representation,
            q,
            policy,
            step_size: config.initial_step_size,
            config,
            discount_factor,
            traces,
            episode_count: 0,
            diverged_updates: 0,
        })
    }

    #[must_use]
    pub fn representation(&self) -> &R {
        &self.representation
    }

    #[must_use]
    pub fn value_function(&self) -> &ActionValueFunction {
        &self.q
    }

    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn policy_mut(&mut self) -> &mut EpsilonGreedy {
        &mut self.policy
    }

    #[must_use]
    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    #[must_use]
    pub fn episode_count(&self) -> u64 {
        self.episode_count
    }

    #[must_use]
    pub fn diverged_updates(&self) -> u64 {
        self.diverged_updates
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            catalogue: self.representation.catalogue_snapshot(),
            weights: self.q.weights(),
        }
    }

    /// Chooses an action in `observation` with the current policy.
    pub fn act(&mut self, observation: &Observation) -> Result<usize, AgentError> {
        let active = self
            .representation
            .active_features(&observation.state, observation.terminal)?;
        for &action in &observation.actions {
            self.check_action(action)?;
        }
        self.policy.select(&self.q, &active, &observation.actions)
    }

    /// `max_a Q(s, a)` over the allowed actions of `observation`.
    pub fn state_value(&mut self, observation: &Observation) -> Result<f64, AgentError> {
        let active = self
            .representation
            .active_features(&observation.state, observation.terminal)?;
        let mut best = f64::NEG_INFINITY;
        for &action in &observation.actions {
            self.check_action(action)?;
            best = best.max(self.q.q(&active, action)?);
        }
        Ok(best)
    }

    pub fn learn(
        &mut self,
        state: &Observation,
        action: usize,
        reward: f64,
        next: &Observation,
        next_action: usize,
    ) -> Result<LearnOutcome, AgentError> {
        self.check_action(action)?;
        self.check_action(next_action)?;

        // the state an action was taken in is never terminal
        let phi_s = self.representation.active_features(&state.state, false)?;
        let phi_ns = self
            .representation
            .active_features(&next.state, next.terminal)?;

        let bootstrap_action = match self.config.algorithm {
            TdAlgorithm::Sarsa => next_action,
            TdAlgorithm::QLearning => self
                .q
                .best_actions(&phi_ns, &next.actions)?
                .first()
                .copied()
                .unwrap_or(next_action),
        };
        let gamma = self.discount_factor;
        let td_error =
            reward + gamma * self.q.q(&phi_ns, bootstrap_action)? - self.q.q(&phi_s, action)?;

        let new_features = self.representation.post_discover(&phi_s, td_error)?;
        self.grow(&new_features)?;

        let mut diverged = false;
        if !phi_s.is_empty() {
            self.decay_traces(&phi_s, action);
            self.update_step_size(&phi_s, action, &phi_ns, bootstrap_action, next.terminal);
            diverged = !self.apply_update(&phi_s, action, td_error)?;
        }

        if next.terminal {
            self.episode_terminated();
        }
        Ok(LearnOutcome {
            td_error,
            new_features,
            diverged,
        })
    }

    /// Ends the current episode: clears the traces and advances the episode
    /// counter used by the Boyan schedules.
    pub fn episode_terminated(&mut self) {
        self.episode_count += 1;
        for trace in &mut self.traces {
            trace.fill(0.0);
        }
    }

    fn check_action(&self, action: usize) -> Result<(), AgentError> {
        self.q.action(action)?;
        Ok(())
    }

    fn grow(&mut self, new_features: &[NewFeature]) -> Result<(), AgentError> {
        for feature in new_features {
            if self.config.inherit_parent_weights {
                self.q.inherit_from_parents(feature.id, feature.parents)?;
            } else {
                self.q.grow(&[feature.id])?;
            }
            for trace in &mut self.traces {
                trace.push(0.0);
            }
        }
        Ok(())
    }

    fn decay_traces(&mut self, phi_s: &[FeatureId], action: usize) {
        if self.traces.is_empty() {
            return;
        }
        let decay = self.discount_factor * self.config.lambda;
        for trace in &mut self.traces {
            for e in trace.iter_mut() {
                *e *= decay;
            }
        }
        // replacing traces
        for id in phi_s {
            self.traces[action][id.index()] = 1.0;
        }
    }

    /// Trace value of `id` under `action`; without traces, the indicator of
    /// the current state-action pair.
    fn trace(&self, phi_s: &[FeatureId], action: usize, id: FeatureId, b: usize) -> f64 {
        if self.traces.is_empty() {
            if b == action && phi_s.binary_search(&id).is_ok() {
                1.0
            } else {
                0.0
            }
        } else {
            self.traces[b][id.index()]
        }
    }

    #[expect(clippy::cast_precision_loss)]
    fn update_step_size(
        &mut self,
        phi_s: &[FeatureId],
        action: usize,
        phi_ns: &[FeatureId],
        bootstrap_action: usize,
        terminal: bool,
    ) {
        let alpha0 = self.config.initial_step_size;
        let boyan = |n0: f64, episodes: u64| {
            alpha0 * (n0 + 1.0) / (n0 + ((episodes + 1) as f64).powf(1.1))
        };
        self.step_size = match self.config.schedule {
            StepSizeSchedule::Constant => alpha0,
            StepSizeSchedule::Boyan { n0 } => {
                boyan(n0, self.episode_count) / phi_s.len() as f64
            }
            StepSizeSchedule::BoyanConstant { n0 } => boyan(n0, self.episode_count),
            StepSizeSchedule::Dabney => {
                let mut step = self.step_size;
                if !terminal {
                    let next = phi_ns
                        .iter()
                        .map(|&id| self.trace(phi_s, action, id, bootstrap_action))
                        .sum::<f64>();
                    let current = phi_s
                        .iter()
                        .map(|&id| self.trace(phi_s, action, id, action))
                        .sum::<f64>();
                    let candidate = self.discount_factor * next - current;
                    if candidate < 0.0 {
                        step = step.min(-1.0 / candidate);
                    }
                }
                step
            }
        };
        self.q.set_step_size(self.step_size);
    }

    /// Applies the TD update. Returns `false` if it was rolled back.
    fn apply_update(
        &mut self,
        phi_s: &[FeatureId],
        action: usize,
        td_error: f64,
    ) -> Result<bool, AgentError> {
        let backup = self.q.clone();
        if self.traces.is_empty() {
            self.q.update(phi_s, action, td_error)?;
        } else {
            for (b, trace) in self.traces.iter().enumerate() {
                self.q.action_mut(b)?.update_with_trace(trace, td_error)?;
            }
        }
        if self.q.is_finite() {
            return Ok(true);
        }
        self.q = backup;
        self.diverged_updates += 1;
        tracing::warn!(
            td_error,
            step_size = self.step_size,
            diverged_updates = self.diverged_updates,
            "TD update diverged; weights reverted"
        );
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use ifdd_core::{
        discretization::DiscretizationGrid,
        ifdd::{IfddConfig, IfddEngine},
        representation::{IndependentDiscretization, Tabular},
    };
    use rand::SeedableRng as _;

    use super::*;

    fn obs(x: f64, terminal: bool) -> Observation {
        Observation {
            state: vec![x],
            terminal,
            actions: vec![0, 1],
        }
    }

    fn line_grid(bins: usize) -> DiscretizationGrid {
        DiscretizationGrid::uniform(&[(0.0, 1.0)], bins).unwrap()
    }

    fn agent<R: Representation>(representation: R, config: AgentConfig) -> TdAgent<R> {
        TdAgent::new(representation, 2, 0.9, config, Pcg32::seed_from_u64(0)).unwrap()
    }

    #[test]
    fn test_algorithm_parses_from_str() {
        assert_eq!("Sarsa".parse::<TdAlgorithm>().unwrap(), TdAlgorithm::Sarsa);
        assert_eq!("QLearning".parse::<TdAlgorithm>().unwrap(), TdAlgorithm::QLearning);
        assert!("Expected".parse::<TdAlgorithm>().is_err());
        assert_eq!(TdAlgorithm::QLearning.to_string(), "QLearning");
    }

    #[test]
    fn test_config_json_defaults() {
        let config: AgentConfig = serde_json::from_str(
            r#"{"algorithm": "q_learning", "schedule": {"kind": "boyan", "n0": 100.0}}"#,
        )
        .unwrap();
        assert_eq!(config.algorithm, TdAlgorithm::QLearning);
        assert_eq!(config.schedule, StepSizeSchedule::Boyan { n0: 100.0 });
        assert!((config.epsilon - 0.1).abs() < f64::EPSILON);
        config.validate().unwrap();
    }

    #[test]
    fn test_config_validation() {
        let config = AgentConfig {
            lambda: 1.5,
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());
        let config = AgentConfig {
            initial_step_size: 0.0,
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());
        let err = TdAgent::new(
            Tabular::new(line_grid(2)).unwrap(),
            2,
            1.5,
            AgentConfig::default(),
            Pcg32::seed_from_u64(0),
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_sarsa_update_on_terminal_transition() {
        let config = AgentConfig {
            initial_step_size: 0.5,
            ..AgentConfig::default()
        };
        let mut agent = agent(Tabular::new(line_grid(2)).unwrap(), config);
        let outcome = agent.learn(&obs(0.2, false), 1, 1.0, &obs(0.8, true), 0).unwrap();
        assert!((outcome.td_error - 1.0).abs() < 1e-12);
        assert!(!outcome.diverged);
        assert_eq!(agent.value_function().weights(), vec![vec![0.0, 0.0], vec![0.5, 0.0]]);
        assert_eq!(agent.episode_count(), 1);
    }

    #[test]
    fn test_q_learning_bootstraps_from_greedy_action() {
        let config = AgentConfig {
            algorithm: TdAlgorithm::QLearning,
            initial_step_size: 1.0,
            ..AgentConfig::default()
        };
        let mut agent = agent(Tabular::new(line_grid(2)).unwrap(), config);
        // Q(s1, 1) = 1
        agent.learn(&obs(0.8, false), 1, 1.0, &obs(0.8, true), 0).unwrap();
        // next action 0 is worth 0, but Q-learning uses action 1
        let outcome = agent.learn(&obs(0.2, false), 0, 0.0, &obs(0.8, false), 0).unwrap();
        assert!((outcome.td_error - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_eligibility_traces_credit_earlier_states() {
        let config = AgentConfig {
            lambda: 1.0,
            initial_step_size: 1.0,
            ..AgentConfig::default()
        };
        let mut agent = agent(Tabular::new(line_grid(3)).unwrap(), config);
        agent.learn(&obs(0.1, false), 1, 0.0, &obs(0.5, false), 1).unwrap();
        agent.learn(&obs(0.5, false), 1, 1.0, &obs(0.9, true), 1).unwrap();
        let weights = agent.value_function().weights();
        // the first state's trace decayed by gamma * lambda
        assert!((weights[1][0] - 0.9).abs() < 1e-12);
        assert!((weights[1][1] - 1.0).abs() < 1e-12);
        assert!(weights[0].iter().all(|w| *w == 0.0));
    }

    #[test]
    fn test_boyan_schedule_divides_by_active_count() {
        let config = AgentConfig {
            initial_step_size: 1.0,
            schedule: StepSizeSchedule::Boyan { n0: 10.0 },
            ..AgentConfig::default()
        };
        let grid = DiscretizationGrid::uniform(&[(0.0, 1.0), (0.0, 1.0)], 2).unwrap();
        let mut agent = agent(IndependentDiscretization::new(grid), config);
        let s = Observation {
            state: vec![0.2, 0.2],
            terminal: false,
            actions: vec![0, 1],
        };
        agent.learn(&s, 0, 1.0, &s, 0).unwrap();
        // episode 0: 1 * 11 / (10 + 1) / 2 active features
        assert!((agent.step_size() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_dabney_schedule_bounds_step_size() {
        let config = AgentConfig {
            initial_step_size: 10.0,
            schedule: StepSizeSchedule::Dabney,
            ..AgentConfig::default()
        };
        let mut agent = agent(Tabular::new(line_grid(2)).unwrap(), config);
        agent.learn(&obs(0.2, false), 0, 1.0, &obs(0.8, false), 0).unwrap();
        // candidate = 0.9 * 0 - 1
        assert!((agent.step_size() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_discovered_features_get_weights() {
        let grid = DiscretizationGrid::uniform(&[(0.0, 1.0), (0.0, 1.0)], 2).unwrap();
        let engine = IfddEngine::new(
            grid,
            IfddConfig {
                discovery_threshold: 0.5,
                ..IfddConfig::default()
            },
        )
        .unwrap();
        let config = AgentConfig {
            initial_step_size: 0.5,
            lambda: 0.5,
            inherit_parent_weights: true,
            ..AgentConfig::default()
        };
        let mut agent = agent(engine, config);
        let s = Observation {
            state: vec![0.2, 0.2],
            terminal: false,
            actions: vec![0, 1],
        };
        let outcome = agent.learn(&s, 1, 1.0, &s, 1).unwrap();
        assert_eq!(outcome.new_features.len(), 1);
        assert_eq!(agent.value_function().num_features(), 5);
        assert_eq!(agent.representation().num_features(), 5);

        // the second step inherits the updated base weights
        let outcome = agent.learn(&s, 1, 1.0, &s, 1).unwrap();
        assert!(outcome.new_features.is_empty());
        let snapshot = agent.snapshot();
        assert_eq!(snapshot.weights[1].len(), 5);
        snapshot.validate().unwrap();
    }

    #[test]
    fn test_conjunction_inherits_parent_value() {
        let grid = DiscretizationGrid::uniform(&[(0.0, 1.0), (0.0, 1.0)], 2).unwrap();
        let engine = IfddEngine::new(
            grid,
            IfddConfig {
                discovery_threshold: 1.5,
                ..IfddConfig::default()
            },
        )
        .unwrap();
        let config = AgentConfig {
            initial_step_size: 0.1,
            epsilon: 0.0,
            inherit_parent_weights: true,
            ..AgentConfig::default()
        };
        let mut agent = agent(engine, config);
        let s = Observation {
            state: vec![0.2, 0.2],
            terminal: false,
            actions: vec![0],
        };
        let end = Observation {
            terminal: true,
            ..s.clone()
        };
        agent.learn(&s, 0, 1.0, &end, 0).unwrap();
        let before = agent.state_value(&s).unwrap();
        assert!((before - 0.2).abs() < 1e-12);
        // the second error pushes relevance over 1.5 and promotes {0, 2}
        let outcome = agent.learn(&s, 0, 1.0, &s, 0).unwrap();
        assert_eq!(outcome.new_features.len(), 1);
        // the conjunction replaces both parents with their summed weight
        let after = agent.state_value(&s).unwrap();
        assert!((after - before).abs() < 1e-12);
    }

    #[test]
    fn test_divergent_update_is_reverted() {
        let mut agent = agent(Tabular::new(line_grid(2)).unwrap(), AgentConfig::default());
        let outcome = agent
            .learn(&obs(0.2, false), 0, f64::INFINITY, &obs(0.8, false), 0)
            .unwrap();
        assert!(outcome.diverged);
        assert_eq!(agent.diverged_updates(), 1);
        assert!(agent.value_function().is_finite());
    }

    #[test]
    fn test_unknown_action() {
        let mut agent = agent(Tabular::new(line_grid(2)).unwrap(), AgentConfig::default());
        let err = agent
            .learn(&obs(0.2, false), 2, 0.0, &obs(0.8, false), 0)
            .unwrap_err();
        assert!(err.is_unknown_action());
    }

    #[test]
    fn test_act_rejects_unknown_allowed_action() {
        let mut agent = agent(Tabular::new(line_grid(2)).unwrap(), AgentConfig::default());
        let mut observation = obs(0.2, false);
        observation.actions = vec![0, 5];
        let err = agent.act(&observation).unwrap_err();
        assert!(matches!(
            err,
            AgentError::UnknownAction {
                action: 5,
                num_actions: 2
            }
        ));
    }

    #[test]
    fn test_restore_from_snapshot() {
        let mut agent = agent(Tabular::new(line_grid(2)).unwrap(), AgentConfig::default());
        agent.learn(&obs(0.2, false), 1, 1.0, &obs(0.8, true), 0).unwrap();
        let snapshot = agent.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let snapshot: Snapshot = serde_json::from_str(&json).unwrap();

        let mut restored = TdAgent::restore(
            Tabular::new(line_grid(2)).unwrap(),
            0.9,
            AgentConfig::default(),
            Pcg32::seed_from_u64(0),
            &snapshot,
        )
        .unwrap();
        assert_eq!(restored.value_function(), agent.value_function());
        assert!((restored.state_value(&obs(0.2, false)).unwrap() - 0.1).abs() < 1e-12);

        let err = TdAgent::restore(
            Tabular::new(line_grid(3)).unwrap(),
            0.9,
            AgentConfig::default(),
            Pcg32::seed_from_u64(0),
            &snapshot,
        )
        .unwrap_err();
        assert!(err.is_snapshot_mismatch());
    }
}
