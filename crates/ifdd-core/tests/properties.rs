use std::{collections::HashSet, num::NonZeroUsize};

use ifdd_core::{
    discretization::DiscretizationGrid,
    feature::{BaseSet, FeatureId},
    ifdd::{IfddConfig, IfddEngine, RelevanceMode},
    relevance::RelevanceTracker,
    value_function::ActionValueFunction,
};
use proptest::prelude::*;

fn grid() -> DiscretizationGrid {
    DiscretizationGrid::uniform(&[(0.0, 1.0), (0.0, 1.0), (-1.0, 1.0)], 3).unwrap()
}

fn engine(config: IfddConfig) -> IfddEngine {
    IfddEngine::new(grid(), config).unwrap()
}

fn samples() -> impl Strategy<Value = Vec<([f64; 3], f64)>> {
    proptest::collection::vec(
        (
            (0.0f64..1.0, 0.0f64..1.0, -1.0f64..1.0).prop_map(|(x, y, z)| [x, y, z]),
            -2.0f64..2.0,
        ),
        1..60,
    )
}

fn threshold() -> impl Strategy<Value = f64> {
    0.5f64..4.0
}

proptest! {
    #[test]
    fn feature_count_never_decreases(samples in samples(), threshold in threshold(), sparsify: bool) {
        let mut engine = engine(IfddConfig {
            discovery_threshold: threshold,
            sparsify,
            ..IfddConfig::default()
        });
        let mut previous = engine.num_features();
        for (state, td_error) in &samples {
            let active = engine.active_features(state, false).unwrap();
            let created = engine.discover(&active, *td_error).unwrap();
            for (offset, id) in created.iter().enumerate() {
                prop_assert_eq!(id.index(), previous + offset);
            }
            prop_assert_eq!(engine.num_features(), previous + created.len());
            previous = engine.num_features();
        }
    }

    #[test]
    fn base_sets_are_promoted_once(samples in samples(), threshold in threshold()) {
        let mut engine = engine(IfddConfig {
            discovery_threshold: threshold,
            ..IfddConfig::default()
        });
        for (state, td_error) in &samples {
            let active = engine.active_features(state, false).unwrap();
            engine.discover(&active, *td_error).unwrap();
        }
        let mut seen = HashSet::new();
        for entry in engine.catalogue().entries() {
            prop_assert!(seen.insert(entry.base_set.clone()));
        }
    }

    #[test]
    fn active_features_cover_the_initial_set(samples in samples(), threshold in threshold(), sparsify: bool) {
        let mut engine = engine(IfddConfig {
            discovery_threshold: threshold,
            sparsify,
            ..IfddConfig::default()
        });
        for (state, td_error) in &samples {
            let active = engine.active_features(state, false).unwrap();
            engine.discover(&active, *td_error).unwrap();
        }
        for (state, _) in &samples {
            let initial = grid().active_features(state).unwrap();
            let active = engine.active_features(state, false).unwrap();
            prop_assert!(!active.is_empty());
            prop_assert!(active.windows(2).all(|w| w[0] < w[1]));

            let mut covered = BaseSet::from_ids([]);
            let mut total = 0;
            for &id in &active {
                let base_set = engine.catalogue().base_set(id).unwrap();
                total += base_set.len();
                covered = covered.union(base_set);
            }
            prop_assert_eq!(covered.as_slice(), initial.as_slice());
            if sparsify {
                // activated base sets are disjoint
                prop_assert_eq!(total, initial.len());
            }
        }
    }

    #[test]
    fn growing_weights_preserves_existing_ones(samples in samples(), threshold in threshold()) {
        let mut engine = engine(IfddConfig {
            discovery_threshold: threshold,
            ..IfddConfig::default()
        });
        let mut q = ActionValueFunction::new(2, engine.num_features(), 0.1).unwrap();
        for (step, (state, td_error)) in samples.iter().enumerate() {
            let active = engine.active_features(state, false).unwrap();
            q.update(&active, step % 2, *td_error).unwrap();
            let before = q.weights();
            let created = engine.discover(&active, *td_error).unwrap();
            q.grow(&created).unwrap();
            for (old, new) in before.iter().zip(q.weights()) {
                prop_assert_eq!(old.as_slice(), &new[..old.len()]);
                prop_assert!(new[old.len()..].iter().all(|w| *w == 0.0));
            }
            prop_assert_eq!(q.num_features(), engine.num_features());
        }
    }

    #[test]
    fn identical_inputs_give_identical_catalogues(
        samples in samples(),
        threshold in threshold(),
        probability in 0.0f64..=1.0,
        seed: u64,
    ) {
        let config = IfddConfig {
            discovery_threshold: threshold,
            relevance: RelevanceMode::Plus { probability },
            seed,
            ..IfddConfig::default()
        };
        let mut a = engine(config.clone());
        let mut b = engine(config);
        for (state, td_error) in &samples {
            let active_a = a.active_features(state, false).unwrap();
            let active_b = b.active_features(state, false).unwrap();
            prop_assert_eq!(&active_a, &active_b);
            prop_assert_eq!(
                a.discover(&active_a, *td_error).unwrap(),
                b.discover(&active_b, *td_error).unwrap()
            );
        }
        prop_assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn cache_does_not_change_activation(samples in samples(), threshold in threshold(), sparsify: bool) {
        let config = IfddConfig {
            discovery_threshold: threshold,
            sparsify,
            ..IfddConfig::default()
        };
        let mut cached = engine(config.clone());
        let mut uncached = engine(IfddConfig {
            use_cache: false,
            ..config
        });
        for (state, td_error) in &samples {
            let a = cached.active_features(state, false).unwrap();
            let b = uncached.active_features(state, false).unwrap();
            prop_assert_eq!(&a, &b);
            cached.discover(&a, *td_error).unwrap();
            uncached.discover(&b, *td_error).unwrap();
        }
        for (state, _) in &samples {
            prop_assert_eq!(
                cached.active_features(state, false).unwrap(),
                uncached.active_features(state, false).unwrap()
            );
        }
    }

    #[test]
    fn batch_discover_matches_repeated_discover(samples in samples(), threshold in threshold()) {
        let config = IfddConfig {
            discovery_threshold: threshold,
            ..IfddConfig::default()
        };
        let mut reference = engine(config.clone());
        let batch_input = samples
            .iter()
            .map(|(state, td_error)| (reference.active_features(state, false).unwrap(), *td_error))
            .collect::<Vec<_>>();

        let mut batch = engine(config.clone());
        let mut single = engine(config);
        let created = batch.batch_discover(batch_input.clone()).unwrap();
        let mut expected = vec![];
        for (active, td_error) in &batch_input {
            expected.extend(single.discover(active, *td_error).unwrap());
        }
        prop_assert_eq!(created, expected);
        prop_assert_eq!(batch.snapshot(), single.snapshot());
    }

    #[test]
    fn snapshot_json_round_trip_restores_activation(samples in samples(), threshold in threshold()) {
        let config = IfddConfig {
            discovery_threshold: threshold,
            ..IfddConfig::default()
        };
        let mut original = engine(config.clone());
        for (state, td_error) in &samples {
            let active = original.active_features(state, false).unwrap();
            original.discover(&active, *td_error).unwrap();
        }
        let json = serde_json::to_string(&original.snapshot()).unwrap();
        let snapshot = serde_json::from_str(&json).unwrap();
        let mut restored = IfddEngine::restore(grid(), config, &snapshot).unwrap();
        prop_assert_eq!(restored.num_features(), original.num_features());
        for (state, _) in &samples {
            prop_assert_eq!(
                restored.active_features(state, false).unwrap(),
                original.active_features(state, false).unwrap()
            );
        }
    }

    #[test]
    fn tracker_respects_capacity(
        bumps in proptest::collection::vec((0usize..8, 0usize..8, -1.0f64..1.0), 1..200),
        capacity in 1usize..10,
    ) {
        let mut tracker = RelevanceTracker::new()
            .with_capacity_limit(NonZeroUsize::new(capacity).unwrap());
        for (a, b, td_error) in bumps {
            let key = BaseSet::from_ids([FeatureId::new(a), FeatureId::new(b)]);
            tracker.bump(&key, [FeatureId::new(a), FeatureId::new(b)], td_error);
            prop_assert!(tracker.len() <= capacity);
        }
    }
}
