//! Fixed-width discretization of continuous state vectors.
//!
//! A [`DiscretizationGrid`] splits every state dimension into equally wide
//! bins and maps each bin to a base feature. Base feature ids are assigned
//! dimension by dimension: the bins of dimension 0 come first, then those of
//! dimension 1, and so on.
//!
//! A [`BinActivation::CompactBinary`] dimension activates nothing in its
//! lower bin, so a grid with such a dimension reserves one extra base
//! feature after all others. It is active exactly when no other base
//! feature is, which keeps every non-terminal state covered.
//!
//! # Example
//!
//! ```
//! use ifdd_core::{discretization::DiscretizationGrid, feature::FeatureId};
//!
//! // two dimensions on [0, 1] with two bins each: base ids 0..4
//! let grid = DiscretizationGrid::uniform(&[(0.0, 1.0), (0.0, 1.0)], 2).unwrap();
//! assert_eq!(grid.feature_count(), 4);
//!
//! let active = grid.active_features(&[0.2, 0.9]).unwrap();
//! assert_eq!(active, vec![FeatureId::new(0), FeatureId::new(3)]);
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigurationError, InvalidStateError, RepresentationError},
    feature::FeatureId,
};

/// How the bins of one dimension turn into base features.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinActivation {
    /// One base feature per bin, exactly one of them active.
    #[default]
    OneHot,
    /// A two-bin dimension with a single base feature that is active only in
    /// the upper bin. The lower bin activates nothing.
    CompactBinary,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub lower: f64,
    pub upper: f64,
    pub bins: usize,
    #[serde(default)]
    pub activation: BinActivation,
}

impl DimensionSpec {
    #[must_use]
    pub fn new(lower: f64, upper: f64, bins: usize) -> Self {
        Self {
            lower,
            upper,
            bins,
            activation: BinActivation::OneHot,
        }
    }

    #[must_use]
    pub fn compact_binary(lower: f64, upper: f64) -> Self {
        Self {
            lower,
            upper,
            bins: 2,
            activation: BinActivation::CompactBinary,
        }
    }

    fn feature_count(&self) -> usize {
        match self.activation {
            BinActivation::OneHot => self.bins,
            BinActivation::CompactBinary => 1,
        }
    }

    #[expect(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn bin_of(&self, value: f64) -> usize {
        let width = self.upper - self.lower;
        let scaled = ((value - self.lower) * self.bins as f64 / width).floor();
        if scaled <= 0.0 {
            0
        } else {
            (scaled as usize).min(self.bins - 1)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscretizationGrid {
    dimensions: Vec<DimensionSpec>,
    offsets: Vec<usize>,
    fallback: Option<FeatureId>,
    feature_count: usize,
}

impl DiscretizationGrid {
    pub fn new(dimensions: Vec<DimensionSpec>) -> Result<Self, ConfigurationError> {
        if dimensions.is_empty() {
            return Err(ConfigurationError::NoDimensions);
        }
        for (dimension, spec) in dimensions.iter().enumerate() {
            if spec.bins == 0 {
                return Err(ConfigurationError::ZeroBins { dimension });
            }
            if !spec.lower.is_finite() || !spec.upper.is_finite() || spec.lower >= spec.upper {
                return Err(ConfigurationError::InvalidRange {
                    dimension,
                    lower: spec.lower,
                    upper: spec.upper,
                });
            }
            if spec.activation == BinActivation::CompactBinary && spec.bins != 2 {
                return Err(ConfigurationError::CompactBinaryBins {
                    dimension,
                    bins: spec.bins,
                });
            }
        }

        let mut offsets = Vec::with_capacity(dimensions.len());
        let mut feature_count = 0_usize;
        for spec in &dimensions {
            offsets.push(feature_count);
            feature_count = feature_count
                .checked_add(spec.feature_count())
                .ok_or(ConfigurationError::StateSpaceOverflow)?;
        }
        let fallback = dimensions
            .iter()
            .any(|spec| spec.activation == BinActivation::CompactBinary)
            .then_some(FeatureId::new(feature_count));
        if fallback.is_some() {
            feature_count += 1;
        }

        Ok(Self {
            dimensions,
            offsets,
            fallback,
            feature_count,
        })
    }

    /// Builds a grid with the same bin count for every `(lower, upper)` range.
    pub fn uniform(limits: &[(f64, f64)], bins: usize) -> Result<Self, ConfigurationError> {
        Self::new(
            limits
                .iter()
                .map(|&(lower, upper)| DimensionSpec::new(lower, upper, bins))
                .collect(),
        )
    }

    #[must_use]
    pub fn dimensions(&self) -> &[DimensionSpec] {
        &self.dimensions
    }

    /// Number of base features the grid produces, including the reserved
    /// fallback feature if there is one.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    /// The base feature active when no bin feature is.
    #[must_use]
    pub fn fallback_feature(&self) -> Option<FeatureId> {
        self.fallback
    }

    /// Number of distinct cells (product of bins over all dimensions), or
    /// `None` if it does not fit in a `usize`.
    #[must_use]
    pub fn aggregate_state_count(&self) -> Option<usize> {
        self.dimensions
            .iter()
            .try_fold(1_usize, |count, d| count.checked_mul(d.bins))
    }

    /// Maps each state value to its bin index.
    ///
    /// Values outside `[lower, upper]` fall into the nearest edge bin.
    pub fn bin_state(&self, state: &[f64]) -> Result<Vec<usize>, RepresentationError> {
        if state.len() != self.dimensions.len() {
            return Err(ConfigurationError::DimensionMismatch {
                expected: self.dimensions.len(),
                actual: state.len(),
            }
            .into());
        }
        state
            .iter()
            .zip(&self.dimensions)
            .enumerate()
            .map(|(dimension, (&value, spec))| {
                if value.is_finite() {
                    Ok(spec.bin_of(value))
                } else {
                    Err(InvalidStateError { dimension, value }.into())
                }
            })
            .collect()
    }

    /// Returns the active base features for `state`, ascending.
    pub fn active_features(&self, state: &[f64]) -> Result<Vec<FeatureId>, RepresentationError> {
        let bins = self.bin_state(state)?;
        let mut active = bins
            .into_iter()
            .zip(self.dimensions.iter().zip(&self.offsets))
            .filter_map(|(bin, (spec, &offset))| match spec.activation {
                BinActivation::OneHot => Some(FeatureId::new(offset + bin)),
                BinActivation::CompactBinary => (bin == 1).then_some(FeatureId::new(offset)),
            })
            .collect::<Vec<_>>();
        if active.is_empty() {
            active.extend(self.fallback);
        }
        Ok(active)
    }

    /// Mixed-radix index of a bin vector, dimension 0 being the most
    /// significant digit. `None` if the index overflows.
    #[must_use]
    pub fn state_id(&self, bins: &[usize]) -> Option<usize> {
        debug_assert_eq!(bins.len(), self.dimensions.len());
        bins.iter()
            .zip(&self.dimensions)
            .try_fold(0_usize, |id, (&bin, spec)| {
                id.checked_mul(spec.bins)?.checked_add(bin)
            })
    }
}
