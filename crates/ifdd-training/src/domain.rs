//! Episodic environments a learner interacts with.
//!
//! A [`Domain`] owns its current state and advances it one action at a time.
//! Randomness (transition noise) is drawn from the generator passed in by the
//! caller, so a domain carries no seed of its own and can be cloned freely to
//! obtain a separate evaluation copy.

use std::fmt;

use ifdd_core::{
    discretization::{DimensionSpec, DiscretizationGrid},
    error::ConfigurationError,
};
use rand::{Rng, seq::IndexedRandom as _};

/// What the learner sees after a reset or a step.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub state: Vec<f64>,
    pub terminal: bool,
    /// Actions allowed in `state`; never empty.
    pub actions: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub reward: f64,
    pub next: Observation,
}

pub trait Domain: fmt::Debug + Clone + Send {
    fn name(&self) -> &str;
    fn num_actions(&self) -> usize;
    /// Maximum number of steps per episode.
    fn episode_cap(&self) -> usize;
    fn discount_factor(&self) -> f64;
    /// Discretization matching the domain's state space.
    fn state_dimensions(&self) -> Vec<DimensionSpec>;
    fn grid(&self) -> Result<DiscretizationGrid, ConfigurationError> {
        DiscretizationGrid::new(self.state_dimensions())
    }
    fn reset<R>(&mut self, rng: &mut R) -> Observation
    where
        R: Rng + ?Sized;
    fn step<R>(&mut self, action: usize, rng: &mut R) -> Transition
    where
        R: Rng + ?Sized;
}

/// A chain `s0 <-> s1 <-> ... <-> s(n-1)`; the episode ends on reaching the
/// last state.
///
/// Action 0 moves left and action 1 moves right, both deterministic. Every
/// step costs `-1`; reaching the goal yields `0`.
#[derive(Debug, Clone)]
pub struct ChainMdp {
    size: usize,
    position: usize,
}

impl ChainMdp {
    const STEP_REWARD: f64 = -1.0;
    const GOAL_REWARD: f64 = 0.0;

    pub fn new(size: usize) -> Result<Self, ConfigurationError> {
        if size < 2 {
            return Err(ConfigurationError::TooSmall {
                name: "chain size",
                value: size,
                min: 2,
            });
        }
        Ok(Self { size, position: 0 })
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[expect(clippy::cast_precision_loss)]
    fn observe(&self) -> Observation {
        Observation {
            state: vec![self.position as f64],
            terminal: self.position == self.size - 1,
            actions: vec![0, 1],
        }
    }
}

impl Domain for ChainMdp {
    fn name(&self) -> &str {
        "chain_mdp"
    }

    fn num_actions(&self) -> usize {
        2
    }

    fn episode_cap(&self) -> usize {
        2 * self.size
    }

    fn discount_factor(&self) -> f64 {
        0.9
    }

    #[expect(clippy::cast_precision_loss)]
    fn state_dimensions(&self) -> Vec<DimensionSpec> {
        vec![DimensionSpec::new(-0.5, self.size as f64 - 0.5, self.size)]
    }

    fn reset<R>(&mut self, _rng: &mut R) -> Observation
    where
        R: Rng + ?Sized,
    {
        self.position = 0;
        self.observe()
    }

    fn step<R>(&mut self, action: usize, _rng: &mut R) -> Transition
    where
        R: Rng + ?Sized,
    {
        self.position = match action {
            0 => self.position.saturating_sub(1),
            _ => (self.position + 1).min(self.size - 1),
        };
        let next = self.observe();
        let reward = if next.terminal {
            Self::GOAL_REWARD
        } else {
            Self::STEP_REWARD
        };
        Transition { reward, next }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cell {
    Empty,
    Blocked,
    Start,
    Goal,
    Pit,
}

/// A grid maze with a goal, optional pits and noisy moves.
///
/// Actions are up, down, left and right. With probability `noise` the
/// chosen action is replaced by a uniformly random allowed one. Moves into a
/// wall or off the grid leave the agent in place.
#[derive(Debug, Clone)]
pub struct GridWorld {
    cells: Vec<Vec<Cell>>,
    start: (usize, usize),
    position: (usize, usize),
    noise: f64,
    episode_cap: usize,
}

impl GridWorld {
    const GOAL_REWARD: f64 = 1.0;
    const PIT_REWARD: f64 = -1.0;
    const STEP_REWARD: f64 = -0.001;
    const MOVES: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

    /// Parses a map with one row per line: `.` empty, `#` blocked, `S` start,
    /// `G` goal, `P` pit.
    ///
    /// # Example
    ///
    /// ```
    /// use ifdd_training::domain::{Domain as _, GridWorld};
    ///
    /// let world = GridWorld::from_map("S..\n.#.\n..G").unwrap();
    /// assert_eq!(world.num_actions(), 4);
    /// assert_eq!(world.episode_cap(), 1000);
    /// ```
    pub fn from_map(map: &str) -> Result<Self, ConfigurationError> {
        let cells = map
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.chars()
                    .map(|c| match c {
                        '#' => Cell::Blocked,
                        'S' => Cell::Start,
                        'G' => Cell::Goal,
                        'P' => Cell::Pit,
                        _ => Cell::Empty,
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let Some(width) = cells.first().map(Vec::len) else {
            return Err(ConfigurationError::TooSmall {
                name: "map rows",
                value: 0,
                min: 1,
            });
        };
        if let Some(row) = cells.iter().position(|row| row.len() != width) {
            return Err(ConfigurationError::DimensionMismatch {
                expected: width,
                actual: cells[row].len(),
            });
        }
        let start = cells
            .iter()
            .enumerate()
            .find_map(|(r, row)| row.iter().position(|c| *c == Cell::Start).map(|c| (r, c)))
            .unwrap_or((0, 0));
        Ok(Self {
            cells,
            start,
            position: start,
            noise: 0.1,
            episode_cap: 1000,
        })
    }

    pub fn with_noise(mut self, noise: f64) -> Result<Self, ConfigurationError> {
        if !(0.0..=1.0).contains(&noise) {
            return Err(ConfigurationError::OutOfRange {
                name: "noise",
                value: noise,
                min: 0.0,
                max: 1.0,
            });
        }
        self.noise = noise;
        Ok(self)
    }

    #[must_use]
    pub fn with_episode_cap(mut self, episode_cap: usize) -> Self {
        self.episode_cap = episode_cap;
        self
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.cells[0].len()
    }

    fn cell(&self, (r, c): (usize, usize)) -> Cell {
        self.cells[r][c]
    }

    fn target(&self, (r, c): (usize, usize), action: usize) -> Option<(usize, usize)> {
        let (dr, dc) = Self::MOVES[action];
        let r = r.checked_add_signed(dr).filter(|&r| r < self.rows())?;
        let c = c.checked_add_signed(dc).filter(|&c| c < self.cols())?;
        (self.cell((r, c)) != Cell::Blocked).then_some((r, c))
    }

    fn allowed_actions(&self) -> Vec<usize> {
        let actions = (0..Self::MOVES.len())
            .filter(|&a| self.target(self.position, a).is_some())
            .collect::<Vec<_>>();
        if actions.is_empty() {
            (0..Self::MOVES.len()).collect()
        } else {
            actions
        }
    }

    #[expect(clippy::cast_precision_loss)]
    fn observe(&self) -> Observation {
        let (r, c) = self.position;
        Observation {
            state: vec![r as f64, c as f64],
            terminal: matches!(self.cell(self.position), Cell::Goal | Cell::Pit),
            actions: self.allowed_actions(),
        }
    }
}

impl Domain for GridWorld {
    fn name(&self) -> &str {
        "grid_world"
    }

    fn num_actions(&self) -> usize {
        Self::MOVES.len()
    }

    fn episode_cap(&self) -> usize {
        self.episode_cap
    }

    fn discount_factor(&self) -> f64 {
        0.9
    }

    #[expect(clippy::cast_precision_loss)]
    fn state_dimensions(&self) -> Vec<DimensionSpec> {
        vec![
            DimensionSpec::new(-0.5, self.rows() as f64 - 0.5, self.rows()),
            DimensionSpec::new(-0.5, self.cols() as f64 - 0.5, self.cols()),
        ]
    }

    fn reset<R>(&mut self, _rng: &mut R) -> Observation
    where
        R: Rng + ?Sized,
    {
        self.position = self.start;
        self.observe()
    }

    fn step<R>(&mut self, action: usize, rng: &mut R) -> Transition
    where
        R: Rng + ?Sized,
    {
        let mut action = action;
        if rng.random_bool(self.noise)
            && let Some(&random) = self.allowed_actions().choose(rng)
        {
            action = random;
        }
        if let Some(target) = self.target(self.position, action % Self::MOVES.len()) {
            self.position = target;
        }
        let reward = match self.cell(self.position) {
            Cell::Goal => Self::GOAL_REWARD,
            Cell::Pit => Self::PIT_REWARD,
            Cell::Empty | Cell::Start | Cell::Blocked => Self::STEP_REWARD,
        };
        Transition {
            reward,
            next: self.observe(),
        }
    }
}
