use crate::{
    discretization::DiscretizationGrid,
    error::{ConfigurationError, RepresentationError},
    feature::FeatureId,
    representation::{BoxedRepresentation, Representation},
};

/// One feature per grid cell; exactly one is active in a non-terminal state.
#[derive(Debug, Clone)]
pub struct Tabular {
    grid: DiscretizationGrid,
    num_states: usize,
}

impl Tabular {
    /// Fails if the grid has too many cells to number.
    pub fn new(grid: DiscretizationGrid) -> Result<Self, ConfigurationError> {
        let num_states = grid
            .aggregate_state_count()
            .ok_or(ConfigurationError::StateSpaceOverflow)?;
        Ok(Self { grid, num_states })
    }

    #[must_use]
    pub fn grid(&self) -> &DiscretizationGrid {
        &self.grid
    }
}

impl Representation for Tabular {
    fn name(&self) -> &str {
        "tabular"
    }

    fn num_features(&self) -> usize {
        self.num_states
    }

    fn active_features(
        &mut self,
        state: &[f64],
        terminal: bool,
    ) -> Result<Vec<FeatureId>, RepresentationError> {
        if terminal {
            return Ok(vec![]);
        }
        let bins = self.grid.bin_state(state)?;
        let id = self
            .grid
            .state_id(&bins)
            .ok_or(ConfigurationError::StateSpaceOverflow)?;
        Ok(vec![FeatureId::new(id)])
    }

    fn clone_boxed(&self) -> BoxedRepresentation {
        Box::new(self.clone())
    }
}
