#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/demand/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! ARIMA modelling for demand series.
//!
//! - [`ArimaModel`] / [`FittedArima`] - CSS estimation and forecasting
//! - [`ModelSelector`] / [`StepwiseSelector`] - automatic order search
//! - [`evaluate`] - RMSE, MAE and MAPE
//! - [`Correlogram`] - ACF and PACF

/// ARIMA estimation and forecasting.
pub mod arima;
/// Autocorrelation functions.
pub mod correlation;
/// Forecast accuracy metrics.
pub mod metrics;
/// Derivative-free minimisation.
pub mod optimize;
/// Automatic order selection.
pub mod selector;
/// KPSS test and differencing order.
pub mod stationarity;
/// Descriptive statistics and normal quantiles.
pub mod stats;

pub use arima::{ArimaForecast, ArimaModel, FittedArima};
pub use correlation::{Correlogram, DEFAULT_LAGS, acf, pacf};
pub use metrics::{ErrorMetrics, evaluate};
pub use optimize::{Minimum, NelderMead};
pub use selector::{ModelSelector, OrderSelection, StepwiseSelector};
pub use stationarity::{kpss_statistic, ndiffs};
pub use stats::{inverse_normal_cdf, mean, population_std, sample_std, two_sided_critical_value};
