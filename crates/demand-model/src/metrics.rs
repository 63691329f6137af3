//! Forecast accuracy metrics.

use serde::{Deserialize, Serialize};

/// Error metrics of predictions against observations.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetrics {
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Mean absolute percentage error, in percent.
    pub mape: f64,
}

impl ErrorMetrics {
    /// Metrics reported when no valid pair exists.
    pub const UNDEFINED: Self = Self {
        rmse: f64::INFINITY,
        mae: f64::INFINITY,
        mape: f64::INFINITY,
    };
}

/// Computes RMSE, MAE and MAPE over the pairs of `actual` and `predicted`.
///
/// Pairs where either side is non-finite are dropped; extra elements of the
/// longer slice are ignored. With no remaining pair every metric is `+inf`.
/// MAPE divides by 1 wherever the actual value is exactly zero.
#[must_use]
pub fn evaluate(actual: &[f64], predicted: &[f64]) -> ErrorMetrics {
    let pairs: Vec<(f64, f64)> = actual
        .iter()
        .zip(predicted)
        .filter(|(a, p)| a.is_finite() && p.is_finite())
        .map(|(a, p)| (*a, *p))
        .collect();

    if pairs.is_empty() {
        return ErrorMetrics::UNDEFINED;
    }

    let n = pairs.len() as f64;
    let mut squared = 0.0;
    let mut absolute = 0.0;
    let mut percentage = 0.0;
    for (a, p) in &pairs {
        let err = a - p;
        squared += err * err;
        absolute += err.abs();
        let denominator = if *a == 0.0 { 1.0 } else { *a };
        percentage += (err / denominator).abs();
    }

    ErrorMetrics {
        rmse: (squared / n).sqrt(),
        mae: absolute / n,
        mape: percentage / n * 100.0,
    }
}
