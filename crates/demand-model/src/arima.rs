//! Non-seasonal ARIMA(p, d, q) estimation and forecasting.
//!
//! The series is differenced `d` times and an ARMA(p, q) model is fitted to
//! the result by minimising the conditional sum of squares (CSS). A mean is
//! estimated only when `d == 0`. AR and MA coefficients are searched through
//! partial-autocorrelation space (`tanh` + Durbin-Levinson), so every
//! candidate is stationary and invertible and the optimiser never needs
//! explicit constraints.
//!
//! Information criteria use the conditional Gaussian log-likelihood with
//! `p + q + 1` parameters, plus one when a mean is estimated.

use demand_core::{ArimaOrder, ForecastError, Result};
use tracing::{debug, warn};

use crate::optimize::NelderMead;
use crate::stats::{mean, sample_std, two_sided_critical_value};

/// Floor applied to the innovation variance so perfectly fitted series keep
/// finite likelihoods.
const MIN_SIGMA2: f64 = 1e-8;

/// Differences `series` once.
#[must_use]
pub fn difference(series: &[f64]) -> Vec<f64> {
    series.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Differences `series` `d` times.
#[must_use]
pub fn difference_n(series: &[f64], d: usize) -> Vec<f64> {
    let mut out = series.to_vec();
    for _ in 0..d {
        out = difference(&out);
    }
    out
}

/// Maps partial autocorrelations in `(-1, 1)` to the coefficients of a
/// stationary AR polynomial `1 - c1 B - ... - ck B^k`.
fn pacf_to_coefficients(partials: &[f64]) -> Vec<f64> {
    let mut coeffs: Vec<f64> = Vec::with_capacity(partials.len());
    for (k, &r) in partials.iter().enumerate() {
        let previous = coeffs.clone();
        coeffs = (0..k).map(|j| previous[j] - r * previous[k - 1 - j]).collect();
        coeffs.push(r);
    }
    coeffs
}

/// Computes CSS residuals of the demeaned series `z` into `residuals`.
///
/// The first `p` residuals are conditioned to zero.
fn css(z: &[f64], ar: &[f64], ma: &[f64], residuals: &mut [f64]) -> f64 {
    let p = ar.len();
    let mut sum = 0.0;
    for t in 0..z.len() {
        if t < p {
            residuals[t] = 0.0;
            continue;
        }
        let mut prediction = 0.0;
        for (i, phi) in ar.iter().enumerate() {
            prediction += phi * z[t - 1 - i];
        }
        for (j, theta) in ma.iter().enumerate() {
            if let Some(lag) = t.checked_sub(j + 1) {
                prediction += theta * residuals[lag];
            }
        }
        let e = z[t] - prediction;
        residuals[t] = e;
        sum += e * e;
    }
    sum
}

/// Position of each parameter group in the optimiser's vector.
#[derive(Clone, Copy, Debug)]
struct Layout {
    p: usize,
    q: usize,
    has_mean: bool,
    /// Starting mean and scale used to standardise the mean parameter.
    mean0: f64,
    scale: f64,
}

impl Layout {
    fn len(&self) -> usize {
        usize::from(self.has_mean) + self.p + self.q
    }

    fn unpack(&self, theta: &[f64]) -> (f64, Vec<f64>, Vec<f64>) {
        let offset = usize::from(self.has_mean);
        let mu = if self.has_mean {
            self.mean0 + self.scale * theta[0]
        } else {
            0.0
        };
        let ar_partials: Vec<f64> = theta[offset..offset + self.p]
            .iter()
            .map(|u| u.tanh())
            .collect();
        let ma_partials: Vec<f64> = theta[offset + self.p..offset + self.p + self.q]
            .iter()
            .map(|u| u.tanh())
            .collect();
        let ar = pacf_to_coefficients(&ar_partials);
        let ma = pacf_to_coefficients(&ma_partials)
            .into_iter()
            .map(|c| -c)
            .collect();
        (mu, ar, ma)
    }
}

/// Specification of an ARIMA model prior to fitting.
#[derive(Clone, Copy, Debug)]
pub struct ArimaModel {
    order: ArimaOrder,
    optimizer: NelderMead,
}

impl ArimaModel {
    /// Creates a model of the given order.
    #[must_use]
    pub fn new(order: ArimaOrder) -> Self {
        Self {
            order,
            optimizer: NelderMead::default(),
        }
    }

    /// Replaces the optimiser used for estimation.
    #[must_use]
    pub const fn with_optimizer(mut self, optimizer: NelderMead) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Fits the model to `series`.
    ///
    /// # Errors
    /// Returns [`ForecastError::ModelFit`] when the series contains
    /// non-finite values, is too short for the order, or the objective
    /// cannot be evaluated at any point the optimiser visits.
    pub fn fit(&self, series: &[f64]) -> Result<FittedArima> {
        let ArimaOrder { p, d, q } = self.order;

        if series.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::ModelFit(
                "series contains non-finite values".to_string(),
            ));
        }
        if series.len() <= d {
            return Err(ForecastError::ModelFit(format!(
                "{} observations cannot be differenced {d} times",
                series.len()
            )));
        }

        let w = difference_n(series, d);
        let has_mean = d == 0;
        let n_params = p + q + usize::from(has_mean) + 1;
        let n_eff = w.len().saturating_sub(p);
        if n_eff <= n_params {
            return Err(ForecastError::ModelFit(format!(
                "{} usable observations are too few for {}",
                n_eff, self.order
            )));
        }

        let mean0 = if has_mean { mean(&w) } else { 0.0 };
        let scale = match sample_std(&w) {
            s if s.is_finite() && s > 0.0 => s,
            _ => 1.0,
        };
        let layout = Layout {
            p,
            q,
            has_mean,
            mean0,
            scale,
        };

        let mut residuals = vec![0.0; w.len()];
        let mut z = vec![0.0; w.len()];
        let objective = |theta: &[f64]| {
            let (mu, ar, ma) = layout.unpack(theta);
            for (zt, wt) in z.iter_mut().zip(&w) {
                *zt = wt - mu;
            }
            css(&z, &ar, &ma, &mut residuals)
        };

        let minimum = self.optimizer.minimize(objective, &vec![0.0; layout.len()]);
        if !minimum.value.is_finite() {
            return Err(ForecastError::ModelFit(format!(
                "conditional sum of squares did not converge for {}",
                self.order
            )));
        }
        if !minimum.converged {
            warn!(
                order = %self.order,
                iterations = minimum.iterations,
                "ARIMA optimiser hit the iteration cap"
            );
        }

        let (mu, ar, ma) = layout.unpack(&minimum.point);
        let z: Vec<f64> = w.iter().map(|v| v - mu).collect();
        let mut residuals = vec![0.0; w.len()];
        let sum_sq = css(&z, &ar, &ma, &mut residuals);

        let n = n_eff as f64;
        let sigma2 = (sum_sq / n).max(MIN_SIGMA2);
        let log_likelihood = -0.5 * n * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0);
        let k = n_params as f64;
        let aic = -2.0 * log_likelihood + 2.0 * k;
        let bic = -2.0 * log_likelihood + k * n.ln();

        if !aic.is_finite() || !bic.is_finite() {
            return Err(ForecastError::ModelFit(format!(
                "information criteria are not finite for {}",
                self.order
            )));
        }

        debug!(order = %self.order, aic, bic, sigma2, "Fitted ARIMA model");

        Ok(FittedArima {
            order: self.order,
            ar,
            ma,
            mean: mu,
            sigma2,
            log_likelihood,
            aic,
            bic,
            nobs: n_eff,
            converged: minimum.converged,
            series: series.to_vec(),
            residuals,
        })
    }
}

/// Point forecasts with interval bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct ArimaForecast {
    /// Point forecasts.
    pub values: Vec<f64>,
    /// Lower interval bounds.
    pub lower: Vec<f64>,
    /// Upper interval bounds.
    pub upper: Vec<f64>,
}

/// A fitted ARIMA model.
#[derive(Clone, Debug)]
pub struct FittedArima {
    order: ArimaOrder,
    ar: Vec<f64>,
    ma: Vec<f64>,
    mean: f64,
    sigma2: f64,
    log_likelihood: f64,
    aic: f64,
    bic: f64,
    nobs: usize,
    converged: bool,
    series: Vec<f64>,
    residuals: Vec<f64>,
}

impl FittedArima {
    /// Order of the model.
    #[must_use]
    pub const fn order(&self) -> ArimaOrder {
        self.order
    }

    /// AR coefficients `phi_1..phi_p`.
    #[must_use]
    pub fn ar(&self) -> &[f64] {
        &self.ar
    }

    /// MA coefficients `theta_1..theta_q`.
    #[must_use]
    pub fn ma(&self) -> &[f64] {
        &self.ma
    }

    /// Estimated mean of the differenced series (zero when `d > 0`).
    #[must_use]
    pub const fn mean(&self) -> f64 {
        self.mean
    }

    /// Innovation variance.
    #[must_use]
    pub const fn sigma2(&self) -> f64 {
        self.sigma2
    }

    /// Conditional log-likelihood.
    #[must_use]
    pub const fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// Akaike information criterion.
    #[must_use]
    pub const fn aic(&self) -> f64 {
        self.aic
    }

    /// Bayesian information criterion.
    #[must_use]
    pub const fn bic(&self) -> f64 {
        self.bic
    }

    /// Number of observations entering the likelihood.
    #[must_use]
    pub const fn nobs(&self) -> usize {
        self.nobs
    }

    /// True if the optimiser converged before its iteration cap.
    #[must_use]
    pub const fn converged(&self) -> bool {
        self.converged
    }

    /// Index of the first original observation that has a fitted value.
    #[must_use]
    pub const fn fitted_offset(&self) -> usize {
        self.order.d + self.order.p
    }

    /// Observations paired with [`fitted_values`](Self::fitted_values).
    #[must_use]
    pub fn fitted_actuals(&self) -> &[f64] {
        &self.series[self.fitted_offset().min(self.series.len())..]
    }

    /// One-step-ahead in-sample predictions on the original scale.
    #[must_use]
    pub fn fitted_values(&self) -> Vec<f64> {
        let d = self.order.d;
        (self.order.p..self.residuals.len())
            .map(|t| self.series[t + d] - self.residuals[t])
            .collect()
    }

    /// Forecasts `horizon` steps with two-sided intervals at `confidence_percent`.
    ///
    /// Values are returned as computed; non-finite entries are left to the caller.
    #[must_use]
    pub fn forecast(&self, horizon: usize, confidence_percent: f64) -> ArimaForecast {
        let d = self.order.d;

        // ARMA recursion on the demeaned, differenced series
        let w = difference_n(&self.series, d);
        let mut z: Vec<f64> = w.iter().map(|v| v - self.mean).collect();
        let mut e = self.residuals.clone();
        let n = z.len();
        for h in 0..horizon {
            let t = n + h;
            let mut prediction = 0.0;
            for (i, phi) in self.ar.iter().enumerate() {
                prediction += phi * z[t - 1 - i];
            }
            for (j, theta) in self.ma.iter().enumerate() {
                if let Some(lag) = t.checked_sub(j + 1) {
                    prediction += theta * e[lag];
                }
            }
            z.push(prediction);
            e.push(0.0);
        }
        let mut values: Vec<f64> = z[n..].iter().map(|v| v + self.mean).collect();

        // Undo differencing, innermost level first
        let mut levels = Vec::with_capacity(d);
        let mut current = self.series.clone();
        for _ in 0..d {
            let next = difference(&current);
            levels.push(current);
            current = next;
        }
        for level in levels.iter().rev() {
            let mut acc = level.last().copied().unwrap_or(0.0);
            values = values
                .into_iter()
                .map(|v| {
                    acc += v;
                    acc
                })
                .collect();
        }

        let psi = self.psi_weights(horizon);
        let critical = two_sided_critical_value(confidence_percent);
        let mut cumulative = 0.0;
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);
        for (h, value) in values.iter().enumerate() {
            cumulative += psi[h] * psi[h];
            let se = (self.sigma2 * cumulative).sqrt();
            lower.push(value - critical * se);
            upper.push(value + critical * se);
        }

        ArimaForecast {
            values,
            lower,
            upper,
        }
    }

    /// MA(inf) weights of the integrated model, `psi_0 = 1`.
    fn psi_weights(&self, count: usize) -> Vec<f64> {
        // (1 - sum phi_i B^i)(1 - B)^d as polynomial coefficients
        let mut poly: Vec<f64> = std::iter::once(1.0)
            .chain(self.ar.iter().map(|phi| -phi))
            .collect();
        for _ in 0..self.order.d {
            let mut next = vec![0.0; poly.len() + 1];
            for (i, c) in poly.iter().enumerate() {
                next[i] += c;
                next[i + 1] -= c;
            }
            poly = next;
        }
        let phi_star: Vec<f64> = poly[1..].iter().map(|c| -c).collect();

        let mut psi = Vec::with_capacity(count);
        for j in 0..count {
            if j == 0 {
                psi.push(1.0);
                continue;
            }
            let mut value = self.ma.get(j - 1).copied().unwrap_or(0.0);
            for (i, phi) in phi_star.iter().enumerate().take(j) {
                value += phi * psi[j - 1 - i];
            }
            psi.push(value);
        }
        psi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random noise in [-0.5, 0.5).
    fn noise(len: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                ((state >> 11) as f64 / (1u64 << 53) as f64) - 0.5
            })
            .collect()
    }

    #[test]
    fn test_difference() {
        assert_eq!(difference(&[1.0, 4.0, 9.0, 16.0]), vec![3.0, 5.0, 7.0]);
        assert_eq!(difference_n(&[1.0, 4.0, 9.0, 16.0], 2), vec![2.0, 2.0]);
    }

    #[test]
    fn test_pacf_transform_order_two() {
        let coeffs = pacf_to_coefficients(&[0.5, 0.2]);
        // phi1 = r1 - r2 * r1, phi2 = r2
        assert!((coeffs[0] - 0.4).abs() < 1e-12);
        assert!((coeffs[1] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_constant_series_forecasts_constant() {
        let series = vec![10.0; 52];
        let fitted = ArimaModel::new(ArimaOrder::new(0, 0, 0)).fit(&series).unwrap();
        let forecast = fitted.forecast(4, 95.0);
        for ((v, lo), hi) in forecast.values.iter().zip(&forecast.lower).zip(&forecast.upper) {
            assert!((v - 10.0).abs() < 1e-6);
            assert!(hi - lo < 1e-2);
            assert!(lo <= hi);
        }
        assert!(fitted.fitted_values().iter().all(|v| (v - 10.0).abs() < 1e-6));
    }

    #[test]
    fn test_recovers_ar1_coefficient() {
        let shocks = noise(400, 7);
        let mut series = Vec::with_capacity(shocks.len());
        let mut prev = 0.0;
        for s in shocks {
            prev = 0.7 * prev + s;
            series.push(prev + 20.0);
        }
        let fitted = ArimaModel::new(ArimaOrder::new(1, 0, 0)).fit(&series).unwrap();
        assert!((fitted.ar()[0] - 0.7).abs() < 0.1, "phi = {}", fitted.ar()[0]);
        assert!((fitted.mean() - 20.0).abs() < 0.5);
    }

    #[test]
    fn test_random_walk_forecast_intervals_widen() {
        let steps = noise(60, 3);
        let mut level = 50.0;
        let series: Vec<f64> = steps
            .iter()
            .map(|s| {
                level += s;
                level
            })
            .collect();
        let fitted = ArimaModel::new(ArimaOrder::new(0, 1, 0)).fit(&series).unwrap();
        let forecast = fitted.forecast(6, 95.0);
        let last = *series.last().unwrap();
        for v in &forecast.values {
            assert!((v - last).abs() < 1e-9);
        }
        let widths: Vec<f64> = forecast
            .lower
            .iter()
            .zip(&forecast.upper)
            .map(|(lo, hi)| hi - lo)
            .collect();
        assert!(widths.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_fitted_values_align_with_actuals() {
        let series: Vec<f64> = noise(40, 11).iter().map(|v| v + 5.0).collect();
        let fitted = ArimaModel::new(ArimaOrder::new(2, 1, 1)).fit(&series).unwrap();
        assert_eq!(fitted.fitted_values().len(), fitted.fitted_actuals().len());
        assert_eq!(fitted.fitted_offset(), 3);
    }

    #[test]
    fn test_rejects_short_and_non_finite_series() {
        let model = ArimaModel::new(ArimaOrder::new(2, 1, 2));
        assert!(matches!(
            model.fit(&[1.0, 2.0, 3.0]),
            Err(ForecastError::ModelFit(_))
        ));
        assert!(matches!(
            ArimaModel::new(ArimaOrder::new(0, 0, 0)).fit(&[1.0, f64::NAN, 3.0, 4.0]),
            Err(ForecastError::ModelFit(_))
        ));
    }

    #[test]
    fn test_information_criteria_penalise_complexity() {
        let series: Vec<f64> = noise(80, 5).iter().map(|v| v + 3.0).collect();
        let simple = ArimaModel::new(ArimaOrder::new(0, 0, 0)).fit(&series).unwrap();
        let complex = ArimaModel::new(ArimaOrder::new(3, 0, 3)).fit(&series).unwrap();
        assert!(simple.bic() < complex.bic());
    }
}
