//! KPSS level-stationarity test and differencing order estimation.

use crate::arima::difference;
use crate::stats::mean;

/// 5% critical value of the KPSS level-stationarity statistic.
pub const KPSS_CRITICAL_5PCT: f64 = 0.463;

/// KPSS statistic for level stationarity with a Bartlett-kernel long-run
/// variance and `trunc(3 * sqrt(n) / 13)` lags.
///
/// Returns `None` for fewer than three observations. A series with zero
/// long-run variance (constant) scores `0.0`.
#[must_use]
pub fn kpss_statistic(series: &[f64]) -> Option<f64> {
    let n = series.len();
    if n < 3 {
        return None;
    }

    let m = mean(series);
    let residuals: Vec<f64> = series.iter().map(|v| v - m).collect();

    let mut partial = 0.0;
    let mut eta = 0.0;
    for e in &residuals {
        partial += e;
        eta += partial * partial;
    }
    let nf = n as f64;
    eta /= nf * nf;

    let lags = (3.0 * nf.sqrt() / 13.0) as usize;
    let mut long_run = residuals.iter().map(|e| e * e).sum::<f64>() / nf;
    for lag in 1..=lags.min(n - 1) {
        let weight = 1.0 - lag as f64 / (lags as f64 + 1.0);
        let autocov: f64 = (lag..n).map(|t| residuals[t] * residuals[t - lag]).sum();
        long_run += 2.0 * weight * autocov / nf;
    }

    if long_run <= f64::EPSILON {
        return Some(0.0);
    }
    Some(eta / long_run)
}

/// Number of differences needed for the KPSS test to accept stationarity at 5%.
///
/// Never exceeds `max_d`.
#[must_use]
pub fn ndiffs(series: &[f64], max_d: usize) -> usize {
    let mut current = series.to_vec();
    let mut d = 0;
    while d < max_d {
        match kpss_statistic(&current) {
            Some(stat) if stat > KPSS_CRITICAL_5PCT => {
                current = difference(&current);
                d += 1;
            }
            _ => break,
        }
    }
    d
}
