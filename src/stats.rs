//! Summary statistics over a materialized subset.
//!
//! Missing values (NaN after CF decoding) are skipped. The standard deviation
//! is the population one.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewerError};

/// Result of the `ShowStats` action
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsResult {
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    pub median: f64,
    pub stddev: f64,
}

/// Compute max/min/mean/median/stddev over the finite values of `data`
pub fn compute_stats(data: &ArrayD<f32>) -> Result<StatsResult> {
    let mut values: Vec<f64> = data
        .iter()
        .filter(|v| !v.is_nan())
        .map(|&v| v as f64)
        .collect();

    if values.is_empty() {
        return Err(ViewerError::subset(format!(
            "Selected data of shape {:?} contains no valid values",
            data.shape()
        )));
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    let mid = values.len() / 2;
    let median = if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    };

    Ok(StatsResult {
        max: values[values.len() - 1],
        min: values[0],
        mean,
        median,
        stddev: variance.sqrt(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_stats_skip_missing() {
        let data = ArrayD::from_shape_vec(
            IxDyn(&[2, 3]),
            vec![1.0, 2.0, f32::NAN, 4.0, 3.0, f32::NAN],
        )
        .unwrap();
        let stats = compute_stats(&data).unwrap();

        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.min, 1.0);
        assert!(approx(stats.mean, 2.5));
        assert!(approx(stats.median, 2.5));
        assert!(approx(stats.stddev, 1.25f64.sqrt()));
    }

    #[test]
    fn test_odd_count_median() {
        let data = ArrayD::from_shape_vec(IxDyn(&[5]), vec![9.0, -1.0, 3.0, 7.0, 5.0]).unwrap();
        let stats = compute_stats(&data).unwrap();
        assert_eq!(stats.median, 5.0);
        assert_eq!(stats.min, -1.0);
        assert_eq!(stats.max, 9.0);
    }

    #[test]
    fn test_scalar_subset() {
        let data = ArrayD::from_elem(IxDyn(&[]), 42.0f32);
        let stats = compute_stats(&data).unwrap();
        assert_eq!(stats.mean, 42.0);
        assert_eq!(stats.stddev, 0.0);
    }

    #[test]
    fn test_all_missing_is_an_error() {
        let data = ArrayD::from_elem(IxDyn(&[2, 2]), f32::NAN);
        let err = compute_stats(&data).unwrap_err();
        assert_eq!(err.kind(), "SubsetResolutionFailure");
    }
}
