//! Sample autocorrelation and partial autocorrelation.

use serde::{Deserialize, Serialize};

use crate::stats::mean;

/// Number of lags computed by default.
pub const DEFAULT_LAGS: usize = 20;

/// Sample autocorrelations for lags `0..=nlags`, with the `n` denominator.
///
/// Lags beyond `n - 1` are dropped. Returns an empty vector for fewer than
/// two observations or a series with zero variance.
#[must_use]
pub fn acf(series: &[f64], nlags: usize) -> Vec<f64> {
    let n = series.len();
    if n < 2 {
        return Vec::new();
    }
    let m = mean(series);
    let centered: Vec<f64> = series.iter().map(|v| v - m).collect();
    let c0: f64 = centered.iter().map(|e| e * e).sum();
    if !(c0.is_finite() && c0 > 0.0) {
        return Vec::new();
    }

    (0..=nlags.min(n - 1))
        .map(|lag| (lag..n).map(|t| centered[t] * centered[t - lag]).sum::<f64>() / c0)
        .collect()
}

/// Partial autocorrelations for lags `0..=nlags` by the Durbin-Levinson
/// recursion on [`acf`].
///
/// At most `n / 2 - 1` lags are returned. Empty whenever [`acf`] is.
#[must_use]
pub fn pacf(series: &[f64], nlags: usize) -> Vec<f64> {
    let nlags = nlags.min((series.len() / 2).saturating_sub(1));
    let r = acf(series, nlags);
    if r.is_empty() {
        return r;
    }

    let mut out = vec![1.0];
    let mut phi: Vec<f64> = Vec::new();
    for k in 1..r.len() {
        let num = r[k] - phi.iter().enumerate().map(|(j, p)| p * r[k - 1 - j]).sum::<f64>();
        let den = 1.0 - phi.iter().enumerate().map(|(j, p)| p * r[j + 1]).sum::<f64>();
        let kk = if den.abs() > f64::EPSILON { num / den } else { 0.0 };

        let prev = phi.clone();
        for (j, p) in phi.iter_mut().enumerate() {
            *p -= kk * prev[prev.len() - 1 - j];
        }
        phi.push(kk);
        out.push(kk);
    }
    out
}

/// ACF and PACF of one series.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Correlogram {
    /// Autocorrelations, lag 0 first.
    pub acf: Vec<f64>,
    /// Partial autocorrelations, lag 0 first.
    pub pacf: Vec<f64>,
}

impl Correlogram {
    /// Computes both functions up to `nlags`.
    #[must_use]
    pub fn compute(series: &[f64], nlags: usize) -> Self {
        Self {
            acf: acf(series, nlags),
            pacf: pacf(series, nlags),
        }
    }

    /// Lag-1 autocorrelation, if computed.
    #[must_use]
    pub fn lag1(&self) -> Option<f64> {
        self.acf.get(1).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alternating(n: usize) -> Vec<f64> {
        (0..n).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect()
    }

    #[test]
    fn test_acf_alternating() {
        let r = acf(&alternating(10), 20);
        assert_eq!(r.len(), 10);
        assert!((r[0] - 1.0).abs() < 1e-12);
        assert!((r[1] + 0.9).abs() < 1e-12);
        assert!((r[2] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_pacf_durbin_levinson() {
        let p = pacf(&alternating(10), 20);
        // capped at n / 2 - 1 lags
        assert_eq!(p.len(), 5);
        assert!((p[1] + 0.9).abs() < 1e-12);
        // (0.8 - 0.81) / (1 - 0.81)
        assert!((p[2] + 0.01 / 0.19).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_series() {
        assert!(acf(&[5.0; 8], 4).is_empty());
        assert!(pacf(&[5.0; 8], 4).is_empty());
        assert!(acf(&[1.0], 4).is_empty());

        let c = Correlogram::compute(&[5.0; 8], DEFAULT_LAGS);
        assert_eq!(c, Correlogram::default());
        assert_eq!(c.lag1(), None);
    }
}
