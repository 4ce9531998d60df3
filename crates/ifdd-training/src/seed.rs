use std::fmt;

use rand::{
    Rng, SeedableRng as _,
    distr::{Distribution, StandardUniform},
};
use rand_pcg::Pcg32;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Child stream of a run's domain noise.
pub const DOMAIN_STREAM: u64 = 0;
/// Child stream of the learning agent's exploration.
pub const POLICY_STREAM: u64 = 1;
/// Child stream of the greedy evaluation episodes.
pub const PERFORMANCE_STREAM: u64 = 2;
/// Child stream reserved for the representation, see
/// [`RunSeed::representation_seed`].
pub const REPRESENTATION_STREAM: u64 = 3;

/// Seed of one learning run.
///
/// A run never touches a global generator: every random component (domain
/// noise, exploration, evaluation episodes) gets its own [`Pcg32`] derived
/// from the run seed, so a run is reproduced exactly by reusing its seed.
///
/// Serialized as a 32 character hex string.
///
/// # Example
///
/// ```
/// use ifdd_training::seed::RunSeed;
/// use rand::Rng as _;
///
/// let seed: RunSeed = rand::rng().random();
/// let mut a = seed.child(0).rng();
/// let mut b = seed.child(0).rng();
/// assert_eq!(a.random::<u64>(), b.random::<u64>());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunSeed([u8; 16]);

impl RunSeed {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Expands a small integer into a full seed.
    #[must_use]
    pub fn from_u64(seed: u64) -> Self {
        Pcg32::seed_from_u64(seed).random()
    }

    #[must_use]
    pub fn rng(self) -> Pcg32 {
        Pcg32::from_seed(self.0)
    }

    /// Derives an independent seed for the component numbered `index`.
    #[must_use]
    pub fn child(self, index: u64) -> Self {
        let (state, stream) = self.0.split_at(8);
        let state = u64::from_be_bytes(state.try_into().unwrap_or_default());
        let stream = u64::from_be_bytes(stream.try_into().unwrap_or_default());
        Pcg32::new(state, stream ^ index).random()
    }

    /// Seed for a representation's own randomness, e.g. `IfddConfig::seed`.
    #[must_use]
    pub fn representation_seed(self) -> u64 {
        self.child(REPRESENTATION_STREAM).as_u64()
    }

    /// Low 64 bits of the seed, for components seeded with a `u64`.
    #[expect(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn as_u64(self) -> u64 {
        u128::from_be_bytes(self.0) as u64
    }
}

impl fmt::Display for RunSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", u128::from_be_bytes(self.0))
    }
}

impl Serialize for RunSeed {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RunSeed {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex_str = String::deserialize(deserializer)?;
        if hex_str.len() != 32 {
            return Err(serde::de::Error::custom(format!(
                "invalid hex: expected 32 characters, got {}",
                hex_str.len()
            )));
        }
        let num = u128::from_str_radix(&hex_str, 16)
            .map_err(|e| serde::de::Error::custom(format!("invalid hex: {hex_str} ({e})")))?;
        Ok(Self(num.to_be_bytes()))
    }
}

impl Distribution<RunSeed> for StandardUniform {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> RunSeed {
        let mut seed = [0; 16];
        rng.fill(&mut seed);
        RunSeed(seed)
    }
}
