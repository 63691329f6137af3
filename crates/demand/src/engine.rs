//! Model fitting, forecasting and evaluation.

use std::sync::Arc;

use demand_core::{
    ArimaOrder, ConfidenceIntervals, EngineConfig, ForecastError, ForecastMetrics, ItemId,
    MaxHorizon, MinDataPoints, NewForecast, PeriodType, Result, TimeSeriesPoint, TrainingWindow,
};
use demand_model::{
    ArimaForecast, ArimaModel, Correlogram, DEFAULT_LAGS, ErrorMetrics, FittedArima,
    ModelSelector, StepwiseSelector, evaluate,
};
use tracing::{debug, warn};

use crate::aggregator::cap_outliers;

/// Replaces every non-finite entry with `0.0`.
fn guard_non_finite(values: &mut [f64]) -> usize {
    let mut replaced = 0;
    for v in values.iter_mut().filter(|v| !v.is_finite()) {
        *v = 0.0;
        replaced += 1;
    }
    replaced
}

/// Fits ARIMA models and turns them into forecast drafts.
///
/// All methods are synchronous and CPU-bound; async callers run them on the
/// blocking pool.
#[derive(Debug, Clone)]
pub struct ForecastEngine {
    selector: Arc<dyn ModelSelector>,
    min_data_points: MinDataPoints,
    max_horizon: MaxHorizon,
    confidence_level: f64,
}

impl ForecastEngine {
    /// Creates an engine with the stepwise selector.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            selector: Arc::new(StepwiseSelector::new()),
            min_data_points: config.min_data_points,
            max_horizon: config.max_horizon,
            confidence_level: config.confidence_level,
        }
    }

    /// Replaces the order selection strategy.
    #[must_use]
    pub fn with_selector(mut self, selector: Arc<dyn ModelSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Fits an ARIMA model of `order` to `series`.
    ///
    /// # Errors
    /// Returns [`ForecastError::ModelFit`] if estimation fails. There is no
    /// fallback order at this stage.
    pub fn fit(&self, series: &[f64], order: ArimaOrder) -> Result<FittedArima> {
        ArimaModel::new(order).fit(series)
    }

    /// Forecasts `horizon` periods ahead.
    ///
    /// Non-finite values and bounds are replaced with `0.0`, and each pair
    /// of bounds is ordered so that `lower <= upper`.
    #[must_use]
    pub fn forecast(&self, model: &FittedArima, horizon: usize) -> ArimaForecast {
        let mut forecast = model.forecast(horizon, self.confidence_level);
        let replaced = guard_non_finite(&mut forecast.values)
            + guard_non_finite(&mut forecast.lower)
            + guard_non_finite(&mut forecast.upper);
        if replaced > 0 {
            warn!(order = %model.order(), replaced, "Replaced non-finite forecast values with 0");
        }
        for (lo, hi) in forecast.lower.iter_mut().zip(forecast.upper.iter_mut()) {
            if *lo > *hi {
                std::mem::swap(lo, hi);
            }
        }
        forecast
    }

    /// RMSE, MAE and MAPE of `predicted` against `actual`.
    #[must_use]
    pub fn evaluate(&self, actual: &[f64], predicted: &[f64]) -> ErrorMetrics {
        evaluate(actual, predicted)
    }

    /// ACF and PACF of `series` up to the default lag count.
    #[must_use]
    pub fn correlogram(&self, series: &[f64]) -> Correlogram {
        Correlogram::compute(series, DEFAULT_LAGS)
    }

    /// Caps outliers in `series`, selects an order, fits and forecasts, and
    /// assembles the record to persist.
    ///
    /// # Errors
    /// Returns [`ForecastError::InvalidParameter`] for a zero horizon or one
    /// above the cap for `period`,
    /// [`ForecastError::InsufficientData`] when the series is shorter than
    /// the minimum for `period`, and [`ForecastError::ModelFit`] when the
    /// selected order cannot be fitted.
    pub fn build(
        &self,
        item: ItemId,
        period: PeriodType,
        horizon: u32,
        series: &[TimeSeriesPoint],
    ) -> Result<NewForecast> {
        if horizon == 0 {
            return Err(ForecastError::InvalidParameter(
                "horizon must be at least 1".to_string(),
            ));
        }
        let max_horizon = self.max_horizon.for_period(period);
        if horizon > max_horizon {
            return Err(ForecastError::InvalidParameter(format!(
                "Maximum horizon for {period} forecasts is {max_horizon} periods, got {horizon}"
            )));
        }

        let required = self.min_data_points.for_period(period);
        let insufficient = || ForecastError::InsufficientData {
            period,
            required,
            actual: series.len(),
        };
        if series.len() < required {
            return Err(insufficient());
        }
        let (Some(first), Some(last)) = (series.first(), series.last()) else {
            return Err(insufficient());
        };

        let values: Vec<f64> = cap_outliers(series.to_vec())
            .iter()
            .map(|p| p.quantity)
            .collect();
        let correlogram = self.correlogram(&values);
        debug!(item = %item, lag1 = ?correlogram.lag1(), "Computed autocorrelations");

        let selection = self.selector.select_order(&values);
        if selection.degraded {
            warn!(item = %item, order = %selection.order, "Order search failed, using fallback order");
        }

        let fitted = self.fit(&values, selection.order)?;
        let forecast = self.forecast(&fitted, horizon as usize);
        let errors = self.evaluate(fitted.fitted_actuals(), &fitted.fitted_values());

        debug!(
            item = %item,
            order = %selection.order,
            aic = fitted.aic(),
            mape = errors.mape,
            "Fitted forecast model"
        );

        Ok(NewForecast {
            item_id: item,
            period,
            horizon,
            order: selection.order,
            metrics: ForecastMetrics {
                aic: fitted.aic(),
                bic: fitted.bic(),
                rmse: errors.rmse,
                mae: errors.mae,
                mape: errors.mape,
            },
            forecasted_values: forecast.values,
            confidence_intervals: ConfidenceIntervals {
                lower: forecast.lower,
                upper: forecast.upper,
            },
            training: TrainingWindow {
                start_date: first.period_start,
                end_date: last.period_start,
                point_count: series.len(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, NaiveDate};
    use demand_model::OrderSelection;

    fn weekly(values: &[f64]) -> Vec<TimeSeriesPoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| TimeSeriesPoint::new(start + Days::new(7 * i as u64), *v))
            .collect()
    }

    fn engine() -> ForecastEngine {
        ForecastEngine::new(&EngineConfig::default())
    }

    /// Selector that always reports a fixed order.
    #[derive(Debug)]
    struct FixedSelector(ArimaOrder);

    impl ModelSelector for FixedSelector {
        fn select_order(&self, _series: &[f64]) -> OrderSelection {
            OrderSelection {
                order: self.0,
                aic: None,
                degraded: false,
            }
        }
    }

    #[test]
    fn test_constant_weekly_series() {
        let series = weekly(&[10.0; 52]);
        let draft = engine()
            .build(ItemId(1), PeriodType::Weekly, 4, &series)
            .unwrap();

        assert_eq!(draft.forecasted_values.len(), 4);
        for ((v, lo), hi) in draft
            .forecasted_values
            .iter()
            .zip(&draft.confidence_intervals.lower)
            .zip(&draft.confidence_intervals.upper)
        {
            assert!((v - 10.0).abs() < 1e-3, "forecast {v}");
            assert!(lo <= hi);
            assert!(hi - lo < 0.1, "interval width {}", hi - lo);
        }
        assert!(draft.metrics.mape < 1e-3);
        assert_eq!(draft.training.point_count, 52);
        assert_eq!(draft.training.start_date, series[0].period_start);
        assert_eq!(draft.training.end_date, series[51].period_start);
    }

    #[test]
    fn test_minimum_length_boundary() {
        let values: Vec<f64> = (0..12).map(|i| 10.0 + f64::from(i % 3)).collect();
        let series = weekly(&values);
        assert!(engine().build(ItemId(1), PeriodType::Weekly, 4, &series).is_ok());

        let err = engine()
            .build(ItemId(1), PeriodType::Weekly, 4, &series[..11])
            .unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientData {
                period: PeriodType::Weekly,
                required: 12,
                actual: 11,
            }
        ));
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let series = weekly(&[5.0; 20]);
        assert!(matches!(
            engine().build(ItemId(1), PeriodType::Weekly, 0, &series),
            Err(ForecastError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_horizon_above_cap_rejected() {
        let series = weekly(&[5.0, 6.0, 7.0, 6.0].repeat(5));
        assert!(!matches!(
            engine().build(ItemId(1), PeriodType::Weekly, 52, &series),
            Err(ForecastError::InvalidParameter(_))
        ));
        assert!(matches!(
            engine().build(ItemId(1), PeriodType::Weekly, 53, &series),
            Err(ForecastError::InvalidParameter(_))
        ));
        assert!(matches!(
            engine().build(ItemId(1), PeriodType::Weekly, u32::MAX, &series),
            Err(ForecastError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_correlogram_of_alternating_series() {
        let values: Vec<f64> = (0..24).map(|i| if i % 2 == 0 { 4.0 } else { 8.0 }).collect();
        let correlogram = engine().correlogram(&values);
        assert_eq!(correlogram.acf.len(), DEFAULT_LAGS + 1);
        assert!(correlogram.lag1().unwrap() < -0.9);
        assert_eq!(correlogram.pacf.len(), 12);
    }

    #[test]
    fn test_bounds_ordered_for_trending_series() {
        let values: Vec<f64> = (0..30)
            .map(|i| 20.0 + 1.5 * f64::from(i) + f64::from(i % 4))
            .collect();
        let draft = engine()
            .build(ItemId(2), PeriodType::Weekly, 8, &weekly(&values))
            .unwrap();
        let bounds = &draft.confidence_intervals;
        assert_eq!(bounds.lower.len(), 8);
        assert!(bounds.lower.iter().zip(&bounds.upper).all(|(lo, hi)| lo <= hi));
        assert!(draft.forecasted_values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_unfittable_order_is_model_fit_error() {
        let engine = engine().with_selector(Arc::new(FixedSelector(ArimaOrder::new(5, 2, 5))));
        let series = weekly(&[1.0, 3.0, 2.0, 5.0, 4.0, 6.0, 5.0, 7.0, 6.0, 8.0, 7.0, 9.0]);
        assert!(matches!(
            engine.build(ItemId(3), PeriodType::Weekly, 2, &series),
            Err(ForecastError::ModelFit(_))
        ));
    }

    #[test]
    fn test_guard_replaces_non_finite() {
        let mut values = vec![1.0, f64::NAN, f64::INFINITY, -2.0, f64::NEG_INFINITY];
        assert_eq!(guard_non_finite(&mut values), 3);
        assert_eq!(values, vec![1.0, 0.0, 0.0, -2.0, 0.0]);
    }

    #[test]
    fn test_evaluate_matches_metric_rules() {
        let metrics = engine().evaluate(&[0.0, 10.0, f64::NAN], &[2.0, 8.0, 1.0]);
        assert!((metrics.mae - 2.0).abs() < 1e-12);
        assert!((metrics.mape - (200.0 + 20.0) / 2.0).abs() < 1e-9);
        assert!(engine().evaluate(&[], &[]).rmse.is_infinite());
    }
}
