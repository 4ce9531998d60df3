//! Serializable state of a learned representation.
//!
//! A [`CatalogueSnapshot`] records the discovered features of a catalogue;
//! base features are implied by `base_feature_count`. A [`Snapshot`] adds the
//! per-action weight vectors so that a learned value function can be stored
//! and restored with identical outputs.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    error::SnapshotError,
    feature::{BaseSet, FeatureCatalogue, FeatureId, FeatureOrigin},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredFeatureRecord {
    pub id: FeatureId,
    pub base_ids: BaseSet,
    pub parents: [FeatureId; 2],
    pub discovered_at: u64,
    pub relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogueSnapshot {
    pub base_feature_count: usize,
    pub discovered: Vec<DiscoveredFeatureRecord>,
}

impl CatalogueSnapshot {
    /// A catalogue without discovered features.
    #[must_use]
    pub fn base_only(base_feature_count: usize) -> Self {
        Self {
            base_feature_count,
            discovered: vec![],
        }
    }

    #[must_use]
    pub fn from_catalogue(catalogue: &FeatureCatalogue) -> Self {
        let discovered = catalogue
            .discovered()
            .filter_map(|entry| match entry.origin {
                FeatureOrigin::Base => None,
                FeatureOrigin::Discovered {
                    parents,
                    discovered_at,
                    relevance,
                } => Some(DiscoveredFeatureRecord {
                    id: entry.id,
                    base_ids: entry.base_set.clone(),
                    parents,
                    discovered_at,
                    relevance,
                }),
            })
            .collect();
        Self {
            base_feature_count: catalogue.base_count(),
            discovered,
        }
    }

    /// Total number of features described.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.base_feature_count + self.discovered.len()
    }

    /// Checks that ids are sequential, base sets are well formed and unique,
    /// and parents precede their child.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let mut seen = HashSet::new();
        for (offset, record) in self.discovered.iter().enumerate() {
            let expected = FeatureId::new(self.base_feature_count + offset);
            if record.id != expected {
                return Err(SnapshotError::NonSequentialId {
                    expected,
                    actual: record.id,
                });
            }
            let base_ids = &record.base_ids;
            let well_formed = base_ids.len() >= 2
                && base_ids.is_canonical()
                && base_ids
                    .iter()
                    .all(|id| id.index() < self.base_feature_count)
                && record.parents.iter().all(|p| *p < record.id);
            if !well_formed {
                return Err(SnapshotError::InvalidBaseSet { id: record.id });
            }
            if !seen.insert(base_ids) {
                return Err(SnapshotError::DuplicateBaseSet { id: record.id });
            }
        }
        Ok(())
    }
}

/// A catalogue together with one weight vector per action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub catalogue: CatalogueSnapshot,
    pub weights: Vec<Vec<f64>>,
}

impl Snapshot {
    pub fn validate(&self) -> Result<(), SnapshotError> {
        self.catalogue.validate()?;
        if self.weights.is_empty() {
            return Err(SnapshotError::NoWeights);
        }
        let expected = self.catalogue.feature_count();
        for (action, weights) in self.weights.iter().enumerate() {
            if weights.len() != expected {
                return Err(SnapshotError::WeightLengthMismatch {
                    action,
                    expected,
                    actual: weights.len(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: usize, base: &[usize], parents: [usize; 2]) -> DiscoveredFeatureRecord {
        DiscoveredFeatureRecord {
            id: FeatureId::new(id),
            base_ids: BaseSet::from_ids(base.iter().copied().map(FeatureId::new)),
            parents: parents.map(FeatureId::new),
            discovered_at: 1,
            relevance: 2.0,
        }
    }

    #[test]
    fn test_from_catalogue() {
        let mut catalogue = FeatureCatalogue::new(4);
        catalogue.insert_discovered(
            BaseSet::from_ids([FeatureId::new(0), FeatureId::new(2)]),
            [FeatureId::new(0), FeatureId::new(2)],
            6,
            6.0,
        );
        let snapshot = CatalogueSnapshot::from_catalogue(&catalogue);
        assert_eq!(snapshot.base_feature_count, 4);
        assert_eq!(snapshot.discovered.len(), 1);
        assert_eq!(snapshot.discovered[0].id, FeatureId::new(4));
        assert_eq!(snapshot.discovered[0].discovered_at, 6);
        snapshot.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_gaps_and_duplicates() {
        let snapshot = CatalogueSnapshot {
            base_feature_count: 4,
            discovered: vec![record(5, &[0, 2], [0, 2])],
        };
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::NonSequentialId { .. })
        ));

        let snapshot = CatalogueSnapshot {
            base_feature_count: 4,
            discovered: vec![record(4, &[0, 2], [0, 2]), record(5, &[0, 2], [2, 0])],
        };
        assert_eq!(
            snapshot.validate(),
            Err(SnapshotError::DuplicateBaseSet {
                id: FeatureId::new(5)
            })
        );

        let snapshot = CatalogueSnapshot {
            base_feature_count: 4,
            discovered: vec![record(4, &[0, 9], [0, 2])],
        };
        assert_eq!(
            snapshot.validate(),
            Err(SnapshotError::InvalidBaseSet {
                id: FeatureId::new(4)
            })
        );
    }

    #[test]
    fn test_unsorted_base_ids_from_json_are_rejected() {
        let json = r#"{
            "base_feature_count": 4,
            "discovered": [
                {"id": 4, "base_ids": [2, 0], "parents": [0, 2], "discovered_at": 1, "relevance": 1.5}
            ]
        }"#;
        let snapshot: CatalogueSnapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_weight_lengths_are_checked() {
        let snapshot = Snapshot {
            catalogue: CatalogueSnapshot {
                base_feature_count: 2,
                discovered: vec![record(2, &[0, 1], [0, 1])],
            },
            weights: vec![vec![0.0; 3], vec![0.0; 2]],
        };
        assert_eq!(
            snapshot.validate(),
            Err(SnapshotError::WeightLengthMismatch {
                action: 1,
                expected: 3,
                actual: 2
            })
        );

        let snapshot = Snapshot {
            catalogue: CatalogueSnapshot::base_only(2),
            weights: vec![],
        };
        assert_eq!(snapshot.validate(), Err(SnapshotError::NoWeights));
    }
}
