//! Feature representations a learner can plug in.
//!
//! A [`Representation`] turns a continuous state into the ids of its active
//! binary features. Static representations ([`Tabular`],
//! [`IndependentDiscretization`]) have a fixed feature count; dynamic ones
//! ([`IfddEngine`]) grow new features from the TD errors fed back through
//! [`Representation::post_discover`].
//!
//! The learner owns the weights. After every call to `post_discover` it must
//! append one weight per returned [`NewFeature`], in order, so that weight
//! indices stay aligned with feature ids.

use std::fmt;

use crate::{
    error::RepresentationError,
    feature::FeatureId,
    ifdd::IfddEngine,
    snapshot::CatalogueSnapshot,
};

pub use self::{independent::IndependentDiscretization, tabular::Tabular};

mod independent;
mod tabular;

/// A feature created by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewFeature {
    pub id: FeatureId,
    pub parents: [FeatureId; 2],
}

pub trait Representation: fmt::Debug + Send {
    fn name(&self) -> &str;

    /// Number of features known so far; weight vectors must have this length.
    fn num_features(&self) -> usize;

    /// Active feature ids of `state`, ascending. Terminal states activate
    /// nothing.
    fn active_features(
        &mut self,
        state: &[f64],
        terminal: bool,
    ) -> Result<Vec<FeatureId>, RepresentationError>;

    fn is_dynamic(&self) -> bool {
        false
    }

    /// Feeds back the TD error observed with `active` and returns the
    /// features created as a result.
    fn post_discover(
        &mut self,
        active: &[FeatureId],
        td_error: f64,
    ) -> Result<Vec<NewFeature>, RepresentationError> {
        let _ = (active, td_error);
        Ok(vec![])
    }

    #[must_use]
    fn catalogue_snapshot(&self) -> CatalogueSnapshot {
        CatalogueSnapshot::base_only(self.num_features())
    }

    fn clone_boxed(&self) -> BoxedRepresentation;
}

pub type BoxedRepresentation = Box<dyn Representation>;

impl Clone for BoxedRepresentation {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

impl Representation for BoxedRepresentation {
    fn name(&self) -> &str {
        self.as_ref().name()
    }

    fn num_features(&self) -> usize {
        self.as_ref().num_features()
    }

    fn active_features(
        &mut self,
        state: &[f64],
        terminal: bool,
    ) -> Result<Vec<FeatureId>, RepresentationError> {
        self.as_mut().active_features(state, terminal)
    }

    fn is_dynamic(&self) -> bool {
        self.as_ref().is_dynamic()
    }

    fn post_discover(
        &mut self,
        active: &[FeatureId],
        td_error: f64,
    ) -> Result<Vec<NewFeature>, RepresentationError> {
        self.as_mut().post_discover(active, td_error)
    }

    fn catalogue_snapshot(&self) -> CatalogueSnapshot {
        self.as_ref().catalogue_snapshot()
    }

    fn clone_boxed(&self) -> BoxedRepresentation {
        self.as_ref().clone_boxed()
    }
}

impl Representation for IfddEngine {
    fn name(&self) -> &str {
        "ifdd"
    }

    fn num_features(&self) -> usize {
        IfddEngine::num_features(self)
    }

    fn active_features(
        &mut self,
        state: &[f64],
        terminal: bool,
    ) -> Result<Vec<FeatureId>, RepresentationError> {
        IfddEngine::active_features(self, state, terminal)
    }

    fn is_dynamic(&self) -> bool {
        true
    }

    fn post_discover(
        &mut self,
        active: &[FeatureId],
        td_error: f64,
    ) -> Result<Vec<NewFeature>, RepresentationError> {
        let created = self.discover(active, td_error)?;
        let mut features = Vec::with_capacity(created.len());
        for id in created {
            if let Some(parents) = self.feature(id)?.origin.parents() {
                features.push(NewFeature { id, parents });
            }
        }
        Ok(features)
    }

    fn catalogue_snapshot(&self) -> CatalogueSnapshot {
        self.snapshot()
    }

    fn clone_boxed(&self) -> BoxedRepresentation {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{discretization::DiscretizationGrid, ifdd::IfddConfig};

    fn representations() -> Vec<BoxedRepresentation> {
        let grid = DiscretizationGrid::uniform(&[(0.0, 1.0), (0.0, 1.0)], 2).unwrap();
        let config = IfddConfig {
            discovery_threshold: 0.5,
            ..IfddConfig::default()
        };
        vec![
            Box::new(Tabular::new(grid.clone()).unwrap()),
            Box::new(IndependentDiscretization::new(grid.clone())),
            Box::new(IfddEngine::new(grid, config).unwrap()),
        ]
    }

    #[test]
    fn test_terminal_states_activate_nothing() {
        for mut representation in representations() {
            let active = representation.active_features(&[0.3, 0.7], true).unwrap();
            assert!(active.is_empty(), "{}", representation.name());
        }
    }

    #[test]
    fn test_active_ids_are_known_and_ascending() {
        for mut representation in representations() {
            let active = representation.active_features(&[0.3, 0.7], false).unwrap();
            assert!(!active.is_empty());
            assert!(active.is_sorted());
            assert!(active.iter().all(|id| id.index() < representation.num_features()));
        }
    }

    #[test]
    fn test_only_ifdd_grows() {
        for mut representation in representations() {
            let before = representation.num_features();
            let active = representation.active_features(&[0.3, 0.7], false).unwrap();
            let created = representation.post_discover(&active, 1.0).unwrap();
            assert_eq!(representation.num_features(), before + created.len());
            assert_eq!(representation.is_dynamic(), !created.is_empty());
        }
    }

    #[test]
    fn test_ifdd_new_feature_reports_parents() {
        let mut representations = representations();
        let ifdd = &mut representations[2];
        let created = ifdd
            .post_discover(&[FeatureId::new(0), FeatureId::new(3)], 1.0)
            .unwrap();
        assert_eq!(
            created,
            vec![NewFeature {
                id: FeatureId::new(4),
                parents: [FeatureId::new(0), FeatureId::new(3)],
            }]
        );
        assert_eq!(ifdd.catalogue_snapshot().discovered.len(), 1);
    }

    #[test]
    fn test_boxed_clone_is_independent() {
        let representations = representations();
        let mut original = representations[2].clone();
        let copy = original.clone();
        original
            .post_discover(&[FeatureId::new(0), FeatureId::new(3)], 1.0)
            .unwrap();
        assert_eq!(original.num_features(), 5);
        assert_eq!(copy.num_features(), 4);
    }
}
