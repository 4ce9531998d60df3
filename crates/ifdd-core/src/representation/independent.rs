use crate::{
    discretization::DiscretizationGrid,
    error::RepresentationError,
    feature::FeatureId,
    representation::{BoxedRepresentation, Representation},
};

/// The grid's base features, one active bin per dimension, with no
/// conjunctions.
#[derive(Debug, Clone)]
pub struct IndependentDiscretization {
    grid: DiscretizationGrid,
}

impl IndependentDiscretization {
    #[must_use]
    pub fn new(grid: DiscretizationGrid) -> Self {
        Self { grid }
    }

    #[must_use]
    pub fn grid(&self) -> &DiscretizationGrid {
        &self.grid
    }
}

impl Representation for IndependentDiscretization {
    fn name(&self) -> &str {
        "independent_discretization"
    }

    fn num_features(&self) -> usize {
        self.grid.feature_count()
    }

    fn active_features(
        &mut self,
        state: &[f64],
        terminal: bool,
    ) -> Result<Vec<FeatureId>, RepresentationError> {
        if terminal {
            return Ok(vec![]);
        }
        self.grid.active_features(state)
    }

    fn clone_boxed(&self) -> BoxedRepresentation {
        Box::new(self.clone())
    }
}
