use serde::{Deserialize, Serialize};

use crate::descriptive::DescriptiveStats;

/// One point of a learning curve averaged over runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Learning step at which the runs were evaluated.
    pub step: u64,
    pub stats: DescriptiveStats,
}

/// Pointwise statistics of several learning curves.
///
/// Each run is a list of `(step, value)` checkpoints. Curves are aligned by
/// position; checkpoints beyond the shortest run are dropped.
///
/// # Examples
///
/// ```
/// use ifdd_stats::curve::summarize_curves;
///
/// let runs = vec![
///     vec![(0, -10.0), (100, -4.0)],
///     vec![(0, -12.0), (100, -2.0)],
/// ];
/// let curve = summarize_curves(&runs);
/// assert_eq!(curve.len(), 2);
/// assert_eq!(curve[1].step, 100);
/// assert_eq!(curve[1].stats.mean, -3.0);
/// ```
#[must_use]
pub fn summarize_curves(runs: &[Vec<(u64, f64)>]) -> Vec<CurvePoint> {
    let Some(len) = runs.iter().map(Vec::len).min() else {
        return vec![];
    };
    (0..len)
        .filter_map(|i| {
            let step = runs[0][i].0;
            let stats = DescriptiveStats::new(runs.iter().map(|run| run[i].1))?;
            Some(CurvePoint { step, stats })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_runs() {
        assert!(summarize_curves(&[]).is_empty());
    }

    #[test]
    fn test_truncates_to_shortest_run() {
        let runs = vec![
            vec![(0, 1.0), (10, 2.0), (20, 3.0)],
            vec![(0, 3.0), (10, 4.0)],
        ];
        let curve = summarize_curves(&runs);
        assert_eq!(curve.len(), 2);
        assert_eq!(curve[0].step, 0);
        assert!((curve[0].stats.mean - 2.0).abs() < 1e-12);
        assert_eq!(curve[1].stats.count, 2);
    }
}
