//! Linear value functions over sparse binary features.
//!
//! A [`LinearValueFunction`] holds one weight per known feature. The value
//! of a state is the sum of the weights of its active features, and learning
//! adds `step_size * delta` to each active weight.
//!
//! Feature discovery only ever appends features, so the weight vector only
//! ever grows: [`LinearValueFunction::grow`] appends zero weights at the end
//! and leaves every existing weight at its index.
//!
//! [`ActionValueFunction`] keeps one linear function per action, giving
//! `Q(s, a)` for discrete action spaces.
//!
//! # Example
//!
//! ```
//! use ifdd_core::{feature::FeatureId, value_function::LinearValueFunction};
//!
//! let active = [FeatureId::new(0), FeatureId::new(2)];
//! let mut v = LinearValueFunction::new(3, 0.5);
//! v.update(&active, 2.0).unwrap();
//! assert_eq!(v.value(&active).unwrap(), 2.0);
//!
//! v.grow(&[FeatureId::new(3)]).unwrap();
//! assert_eq!(v.len(), 4);
//! assert_eq!(v.value(&active).unwrap(), 2.0);
//! ```

use crate::{
    error::{
        ConfigurationError, RepresentationError, SnapshotError, UnknownActionError,
        UnknownFeatureError, WeightGrowthError,
    },
    feature::FeatureId,
};

#[derive(Debug, Clone, PartialEq)]
pub struct LinearValueFunction {
    weights: Vec<f64>,
    step_size: f64,
}

impl LinearValueFunction {
    /// Creates a value function with `len` zero weights.
    #[must_use]
    pub fn new(len: usize, step_size: f64) -> Self {
        Self::from_weights(vec![0.0; len], step_size)
    }

    #[must_use]
    pub fn from_weights(weights: Vec<f64>, step_size: f64) -> Self {
        Self { weights, step_size }
    }

    /// Number of weights, equal to the number of features known to the
    /// owning representation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    #[must_use]
    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    pub fn set_step_size(&mut self, step_size: f64) {
        self.step_size = step_size;
    }

    pub fn weight(&self, id: FeatureId) -> Result<f64, UnknownFeatureError> {
        self.weights
            .get(id.index())
            .copied()
            .ok_or(self.unknown(id))
    }

    pub fn set_weight(&mut self, id: FeatureId, weight: f64) -> Result<(), UnknownFeatureError> {
        let unknown = self.unknown(id);
        let slot = self.weights.get_mut(id.index()).ok_or(unknown)?;
        *slot = weight;
        Ok(())
    }

    /// Sum of the weights of `active`; `0.0` for an empty set.
    pub fn value(&self, active: &[FeatureId]) -> Result<f64, UnknownFeatureError> {
        active.iter().map(|&id| self.weight(id)).sum()
    }

    /// Adds `step_size * delta` to the weight of every active feature.
    ///
    /// All ids are checked before any weight changes.
    pub fn update(&mut self, active: &[FeatureId], delta: f64) -> Result<(), UnknownFeatureError> {
        self.check(active)?;
        let step = self.step_size * delta;
        for id in active {
            self.weights[id.index()] += step;
        }
        Ok(())
    }

    /// Adds `step_size * delta * trace[i]` to every weight `i` covered by
    /// `trace`.
    pub fn update_with_trace(&mut self, trace: &[f64], delta: f64) -> Result<(), UnknownFeatureError> {
        if trace.len() > self.weights.len() {
            return Err(self.unknown(FeatureId::new(trace.len() - 1)));
        }
        let step = self.step_size * delta;
        for (w, e) in self.weights.iter_mut().zip(trace) {
            *w += step * e;
        }
        Ok(())
    }

    /// Appends a zero weight for every id in `new_features`.
    ///
    /// The ids must continue the index sequence (`len`, `len + 1`, ...).
    /// Existing weights keep their values and indices.
    pub fn grow(&mut self, new_features: &[FeatureId]) -> Result<(), WeightGrowthError> {
        for &id in new_features {
            self.push_weight(id, 0.0)?;
        }
        Ok(())
    }

    /// Appends a single weight with the given initial value.
    pub fn push_weight(&mut self, id: FeatureId, initial: f64) -> Result<(), WeightGrowthError> {
        let expected = FeatureId::new(self.weights.len());
        if id != expected {
            return Err(WeightGrowthError {
                expected,
                actual: id,
            });
        }
        self.weights.push(initial);
        Ok(())
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.weights.iter().all(|w| w.is_finite())
    }

    fn check(&self, active: &[FeatureId]) -> Result<(), UnknownFeatureError> {
        match active.iter().find(|id| id.index() >= self.weights.len()) {
            Some(&id) => Err(self.unknown(id)),
            None => Ok(()),
        }
    }

    fn unknown(&self, id: FeatureId) -> UnknownFeatureError {
        UnknownFeatureError {
            id,
            known: self.weights.len(),
        }
    }
}

/// One [`LinearValueFunction`] per discrete action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionValueFunction {
    actions: Vec<LinearValueFunction>,
}

impl ActionValueFunction {
    pub fn new(
        num_actions: usize,
        num_features: usize,
        step_size: f64,
    ) -> Result<Self, ConfigurationError> {
        if num_actions == 0 {
            return Err(ConfigurationError::NoActions);
        }
        Ok(Self {
            actions: (0..num_actions)
                .map(|_| LinearValueFunction::new(num_features, step_size))
                .collect(),
        })
    }

    /// Rebuilds the function from per-action weight vectors of equal length.
    pub fn from_weights(weights: Vec<Vec<f64>>, step_size: f64) -> Result<Self, RepresentationError> {
        let Some(expected) = weights.first().map(Vec::len) else {
            return Err(ConfigurationError::NoActions.into());
        };
        if let Some((action, w)) = weights.iter().enumerate().find(|(_, w)| w.len() != expected) {
            return Err(SnapshotError::WeightLengthMismatch {
                action,
                expected,
                actual: w.len(),
            }
            .into());
        }
        Ok(Self {
            actions: weights
                .into_iter()
                .map(|w| LinearValueFunction::from_weights(w, step_size))
                .collect(),
        })
    }

    #[must_use]
    pub fn num_actions(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn num_features(&self) -> usize {
        self.actions.first().map_or(0, LinearValueFunction::len)
    }

    pub fn action(&self, action: usize) -> Result<&LinearValueFunction, UnknownActionError> {
        let num_actions = self.actions.len();
        self.actions.get(action).ok_or(UnknownActionError {
            action,
            num_actions,
        })
    }

    pub fn action_mut(
        &mut self,
        action: usize,
    ) -> Result<&mut LinearValueFunction, UnknownActionError> {
        let num_actions = self.actions.len();
        self.actions.get_mut(action).ok_or(UnknownActionError {
            action,
            num_actions,
        })
    }

    pub fn set_step_size(&mut self, step_size: f64) {
        for f in &mut self.actions {
            f.set_step_size(step_size);
        }
    }

    /// `Q(s, a)` for the active features of `s`.
    pub fn q(&self, active: &[FeatureId], action: usize) -> Result<f64, RepresentationError> {
        Ok(self.action(action)?.value(active)?)
    }

    /// `Q(s, a)` for every action.
    pub fn qs(&self, active: &[FeatureId]) -> Result<Vec<f64>, UnknownFeatureError> {
        self.actions.iter().map(|f| f.value(active)).collect()
    }

    /// The actions in `allowed` with the highest value, in `allowed` order.
    pub fn best_actions(
        &self,
        active: &[FeatureId],
        allowed: &[usize],
    ) -> Result<Vec<usize>, RepresentationError> {
        let mut best = vec![];
        let mut best_value = f64::NEG_INFINITY;
        for &action in allowed {
            let value = self.q(active, action)?;
            if value > best_value {
                best_value = value;
                best.clear();
                best.push(action);
            } else if value.total_cmp(&best_value).is_eq() {
                best.push(action);
            }
        }
        Ok(best)
    }

    pub fn update(
        &mut self,
        active: &[FeatureId],
        action: usize,
        delta: f64,
    ) -> Result<(), RepresentationError> {
        Ok(self.action_mut(action)?.update(active, delta)?)
    }

    /// Appends zero weights for `new_features` to every action.
    pub fn grow(&mut self, new_features: &[FeatureId]) -> Result<(), WeightGrowthError> {
        for f in &mut self.actions {
            f.grow(new_features)?;
        }
        Ok(())
    }

    /// Appends a weight for the conjunction `id` initialized, per action, to
    /// the sum of its parents' weights. States where both parents were active
    /// keep their value when the conjunction replaces them.
    pub fn inherit_from_parents(
        &mut self,
        id: FeatureId,
        parents: [FeatureId; 2],
    ) -> Result<(), RepresentationError> {
        for f in &mut self.actions {
            let initial = f.weight(parents[0])? + f.weight(parents[1])?;
            f.push_weight(id, initial)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn weights(&self) -> Vec<Vec<f64>> {
        self.actions.iter().map(|f| f.weights().to_vec()).collect()
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.actions.iter().all(LinearValueFunction::is_finite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[usize]) -> Vec<FeatureId> {
        raw.iter().copied().map(FeatureId::new).collect()
    }

    #[test]
    fn test_empty_active_set_has_zero_value() {
        let v = LinearValueFunction::from_weights(vec![1.0, 2.0], 0.1);
        assert!(v.value(&[]).unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn test_value_is_sum_of_active_weights() {
        let v = LinearValueFunction::from_weights(vec![1.0, 2.0, 4.0], 0.1);
        assert!((v.value(&ids(&[0, 2])).unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_update_applies_step_size() {
        let mut v = LinearValueFunction::new(3, 0.1);
        v.update(&ids(&[1, 2]), 5.0).unwrap();
        assert_eq!(v.weights(), &[0.0, 0.5, 0.5]);
    }

    #[test]
    fn test_unknown_feature_leaves_weights_untouched() {
        let mut v = LinearValueFunction::new(2, 1.0);
        let err = v.update(&ids(&[0, 5]), 1.0).unwrap_err();
        assert_eq!(err.id, FeatureId::new(5));
        assert_eq!(err.known, 2);
        assert_eq!(v.weights(), &[0.0, 0.0]);
        assert!(v.value(&ids(&[2])).is_err());
    }

    #[test]
    fn test_grow_preserves_existing_weights() {
        let mut v = LinearValueFunction::from_weights(vec![0.25, -1.0], 0.1);
        v.grow(&ids(&[2, 3])).unwrap();
        assert_eq!(v.weights(), &[0.25, -1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_grow_rejects_gaps() {
        let mut v = LinearValueFunction::new(2, 0.1);
        let err = v.grow(&ids(&[3])).unwrap_err();
        assert_eq!(
            err,
            WeightGrowthError {
                expected: FeatureId::new(2),
                actual: FeatureId::new(3)
            }
        );
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn test_update_with_trace() {
        let mut v = LinearValueFunction::new(3, 0.5);
        v.update_with_trace(&[1.0, 0.0, 0.5], 2.0).unwrap();
        assert_eq!(v.weights(), &[1.0, 0.0, 0.5]);
        assert!(v.update_with_trace(&[0.0; 4], 1.0).is_err());
    }

    #[test]
    fn test_action_values() {
        let mut q = ActionValueFunction::new(3, 2, 1.0).unwrap();
        q.update(&ids(&[0]), 1, 2.0).unwrap();
        q.update(&ids(&[1]), 2, 2.0).unwrap();
        assert_eq!(q.qs(&ids(&[0, 1])).unwrap(), vec![0.0, 2.0, 2.0]);
        assert_eq!(q.best_actions(&ids(&[0, 1]), &[0, 1, 2]).unwrap(), vec![1, 2]);
        assert_eq!(q.best_actions(&ids(&[0]), &[0, 2]).unwrap(), vec![0, 2]);
        assert_eq!(q.best_actions(&ids(&[0]), &[2, 1]).unwrap(), vec![1]);
    }

    #[test]
    fn test_out_of_range_action_is_an_error() {
        let mut q = ActionValueFunction::new(2, 1, 1.0).unwrap();
        let unknown = UnknownActionError {
            action: 5,
            num_actions: 2,
        };
        assert!(matches!(
            q.best_actions(&ids(&[0]), &[0, 5]),
            Err(RepresentationError::UnknownAction(e)) if e == unknown
        ));
        assert!(matches!(
            q.q(&ids(&[0]), 2),
            Err(RepresentationError::UnknownAction(_))
        ));
        assert!(q.update(&ids(&[0]), 5, 1.0).is_err());
        assert_eq!(q.action_mut(5).unwrap_err(), unknown);
        assert!(q.action(1).is_ok());
        assert_eq!(q.weights(), vec![vec![0.0], vec![0.0]]);
    }

    #[test]
    fn test_inherit_from_parents() {
        let mut q = ActionValueFunction::from_weights(
            vec![vec![1.0, 2.0, 3.0], vec![-1.0, 0.5, 0.0]],
            0.1,
        )
        .unwrap();
        q.inherit_from_parents(FeatureId::new(3), [FeatureId::new(0), FeatureId::new(2)])
            .unwrap();
        assert_eq!(q.weights(), vec![vec![1.0, 2.0, 3.0, 4.0], vec![-1.0, 0.5, 0.0, -1.0]]);
    }

    #[test]
    fn test_from_weights_rejects_ragged_tables() {
        let err = ActionValueFunction::from_weights(vec![vec![0.0; 2], vec![0.0; 3]], 0.1)
            .unwrap_err();
        assert!(matches!(err, RepresentationError::Snapshot(_)));
        assert!(ActionValueFunction::new(0, 2, 0.1).is_err());
    }
}
