//! The learn / evaluate loop.
//!
//! An [`Experiment`] alternates learning steps on a domain with periodic
//! policy checks: greedy episodes on a clone of the domain whose returns form
//! the learning curve. [`run_sweep`] repeats an experiment over several seeds
//! in parallel and averages the curves.

use std::{iter, thread};

use chrono::{DateTime, Utc};
use ifdd_core::{
    error::ConfigurationError, representation::Representation, snapshot::Snapshot,
};
use ifdd_stats::{
    curve::{CurvePoint, summarize_curves},
    descriptive::DescriptiveStats,
};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::{
    AgentError,
    agent::{AgentConfig, TdAgent},
    domain::Domain,
    seed::{DOMAIN_STREAM, PERFORMANCE_STREAM, POLICY_STREAM, RunSeed},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Total number of learning steps.
    pub max_steps: usize,
    /// Number of policy checks after the initial one.
    pub num_policy_checks: usize,
    /// Greedy episodes averaged per policy check.
    pub checks_per_policy: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            max_steps: 10_000,
            num_policy_checks: 10,
            checks_per_policy: 1,
        }
    }
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let too_small = |name: &'static str, value: usize, min: usize| {
            if value < min {
                Err(ConfigurationError::TooSmall { name, value, min })
            } else {
                Ok(())
            }
        };
        too_small("num_policy_checks", self.num_policy_checks, 1)?;
        too_small("checks_per_policy", self.checks_per_policy, 1)?;
        too_small("max_steps", self.max_steps, self.num_policy_checks)?;
        Ok(())
    }

    fn check_interval(&self) -> usize {
        self.max_steps / self.num_policy_checks
    }
}

/// One greedy episode.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PerformanceRun {
    episode_return: f64,
    steps: usize,
    terminated: bool,
    discounted_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceCheck {
    pub learning_steps: usize,
    pub learning_episode: usize,
    pub num_features: usize,
    /// Undiscounted returns of the greedy episodes.
    pub returns: DescriptiveStats,
    pub mean_steps: f64,
    /// Share of the greedy episodes that reached a terminal state.
    pub terminated: f64,
    pub mean_discounted_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub seed: RunSeed,
    pub domain: String,
    pub representation: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub config: ExperimentConfig,
    pub agent: AgentConfig,
    pub checks: Vec<PerformanceCheck>,
    pub episodes: usize,
    pub diverged_updates: u64,
    pub snapshot: Snapshot,
}

impl ExperimentReport {
    /// `(learning steps, mean return)` per policy check.
    #[must_use]
    pub fn learning_curve(&self) -> Vec<(u64, f64)> {
        self.checks
            .iter()
            .map(|c| (c.learning_steps as u64, c.returns.mean))
            .collect()
    }

    #[must_use]
    pub fn final_check(&self) -> Option<&PerformanceCheck> {
        self.checks.last()
    }
}

#[derive(Debug)]
pub struct Experiment<D, R> {
    domain: D,
    agent: TdAgent<R>,
    config: ExperimentConfig,
    seed: RunSeed,
    domain_rng: Pcg32,
    performance_rng: Pcg32,
}

impl<D, R> Experiment<D, R>
where
    D: Domain,
    R: Representation,
{
    pub fn new(
        domain: D,
        representation: R,
        agent_config: AgentConfig,
        config: ExperimentConfig,
        seed: RunSeed,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        let agent = TdAgent::new(
            representation,
            domain.num_actions(),
            domain.discount_factor(),
            agent_config,
            seed.child(POLICY_STREAM).rng(),
        )?;
        Ok(Self {
            domain,
            agent,
            config,
            seed,
            domain_rng: seed.child(DOMAIN_STREAM).rng(),
            performance_rng: seed.child(PERFORMANCE_STREAM).rng(),
        })
    }

    #[must_use]
    pub fn agent(&self) -> &TdAgent<R> {
        &self.agent
    }

    pub fn run(mut self) -> Result<ExperimentReport, AgentError> {
        let started_at = Utc::now();
        tracing::info!(
            seed = %self.seed,
            domain = self.domain.name(),
            representation = self.agent.representation().name(),
            max_steps = self.config.max_steps,
            "experiment started"
        );

        let interval = self.config.check_interval();
        let mut checks = vec![self.check_policy(0, 0)?];
        let mut episode = 0;
        let mut episode_steps = 0;
        let mut state = self.domain.reset(&mut self.domain_rng);
        let mut action = self.agent.act(&state)?;

        for step in 1..=self.config.max_steps {
            let transition = self.domain.step(action, &mut self.domain_rng);
            let next = transition.next;
            episode_steps += 1;
            let next_action = if next.terminal {
                action
            } else {
                self.agent.act(&next)?
            };
            self.agent
                .learn(&state, action, transition.reward, &next, next_action)?;

            if next.terminal || episode_steps >= self.domain.episode_cap() {
                if !next.terminal {
                    self.agent.episode_terminated();
                }
                episode += 1;
                episode_steps = 0;
                state = self.domain.reset(&mut self.domain_rng);
                action = self.agent.act(&state)?;
            } else {
                state = next;
                action = next_action;
            }

            if step % interval == 0 && checks.len() <= self.config.num_policy_checks {
                checks.push(self.check_policy(step, episode)?);
            }
        }

        let report = ExperimentReport {
            seed: self.seed,
            domain: self.domain.name().to_owned(),
            representation: self.agent.representation().name().to_owned(),
            started_at,
            finished_at: Utc::now(),
            config: self.config,
            agent: self.agent.config().clone(),
            checks,
            episodes: episode,
            diverged_updates: self.agent.diverged_updates(),
            snapshot: self.agent.snapshot(),
        };
        tracing::info!(
            seed = %self.seed,
            episodes = report.episodes,
            num_features = self.agent.representation().num_features(),
            diverged_updates = report.diverged_updates,
            "experiment finished"
        );
        Ok(report)
    }

    fn check_policy(
        &mut self,
        learning_steps: usize,
        learning_episode: usize,
    ) -> Result<PerformanceCheck, AgentError> {
        self.agent.policy_mut().turn_off_exploration();
        let runs = (0..self.config.checks_per_policy)
            .map(|_| self.performance_run())
            .collect::<Result<Vec<_>, _>>();
        self.agent.policy_mut().turn_on_exploration();
        let runs = runs?;

        #[expect(clippy::cast_precision_loss)]
        let n = runs.len() as f64;
        #[expect(clippy::cast_precision_loss)]
        let mean_steps = runs.iter().map(|r| r.steps as f64).sum::<f64>() / n;
        let terminated = runs.iter().filter(|r| r.terminated).count();
        #[expect(clippy::cast_precision_loss)]
        let terminated = terminated as f64 / n;
        let mean_discounted_return = runs.iter().map(|r| r.discounted_return).sum::<f64>() / n;
        let returns = DescriptiveStats::new(runs.iter().map(|r| r.episode_return))
            .ok_or(ConfigurationError::TooSmall {
                name: "checks_per_policy",
                value: 0,
                min: 1,
            })?;

        let check = PerformanceCheck {
            learning_steps,
            learning_episode,
            num_features: self.agent.representation().num_features(),
            returns,
            mean_steps,
            terminated,
            mean_discounted_return,
        };
        tracing::info!(
            learning_steps,
            learning_episode,
            num_features = check.num_features,
            mean_return = check.returns.mean,
            mean_steps,
            terminated,
            "policy check"
        );
        Ok(check)
    }

    fn performance_run(&mut self) -> Result<PerformanceRun, AgentError> {
        let mut domain = self.domain.clone();
        let gamma = domain.discount_factor();
        let mut state = domain.reset(&mut self.performance_rng);
        let mut run = PerformanceRun {
            episode_return: 0.0,
            steps: 0,
            terminated: false,
            discounted_return: 0.0,
        };
        let mut discount = 1.0;
        while !state.terminal && run.steps < domain.episode_cap() {
            let action = self.agent.act(&state)?;
            let transition = domain.step(action, &mut self.performance_rng);
            run.episode_return += transition.reward;
            run.discounted_return += discount * transition.reward;
            discount *= gamma;
            run.steps += 1;
            state = transition.next;
        }
        run.terminated = state.terminal;
        Ok(run)
    }
}

/// Runs of one configuration over several seeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub runs: Vec<ExperimentReport>,
    /// Mean return per policy check across runs.
    pub curve: Vec<CurvePoint>,
}

/// Runs one experiment per seed, each on its own thread.
///
/// `make_representation` builds a fresh representation for a run; it gets
/// the run seed so that randomized representations stay reproducible.
pub fn run_sweep<D, R, F>(
    domain: &D,
    make_representation: F,
    agent_config: &AgentConfig,
    config: ExperimentConfig,
    seeds: &[RunSeed],
) -> Result<SweepReport, AgentError>
where
    D: Domain,
    R: Representation,
    F: Fn(RunSeed) -> Result<R, AgentError> + Sync,
{
    config.validate()?;
    let mut results = seeds.iter().map(|_| None).collect::<Vec<_>>();
    thread::scope(|s| {
        for (result, &seed) in iter::zip(&mut results, seeds) {
            let domain = domain.clone();
            let agent_config = agent_config.clone();
            let make_representation = &make_representation;
            s.spawn(move || {
                *result = Some(make_representation(seed).and_then(|representation| {
                    Experiment::new(domain, representation, agent_config, config, seed)?.run()
                }));
            });
        }
    });

    let runs = results
        .into_iter()
        .flatten()
        .collect::<Result<Vec<_>, _>>()?;
    let curves = runs
        .iter()
        .map(ExperimentReport::learning_curve)
        .collect::<Vec<_>>();
    Ok(SweepReport {
        curve: summarize_curves(&curves),
        runs,
    })
}
