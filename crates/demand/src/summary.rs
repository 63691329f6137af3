//! Aggregate accuracy of stored forecasts.

use std::collections::BTreeMap;

use demand_core::{ForecastRecord, PeriodType};
use serde::{Deserialize, Serialize};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn average(records: &[&ForecastRecord], metric: impl Fn(&ForecastRecord) -> f64) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    round2(records.iter().map(|r| metric(r)).sum::<f64>() / records.len() as f64)
}

/// Forecast count and mean error for one granularity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodPerformance {
    /// Number of forecasts.
    pub count: usize,
    /// Mean MAPE, rounded to two decimals.
    pub avg_mape: f64,
    /// Mean RMSE, rounded to two decimals.
    pub avg_rmse: f64,
}

/// Averages and quality distribution over a set of forecasts.
///
/// Averages are rounded to two decimals and are `0.0` for an empty set.
/// Quality buckets follow [`ForecastRecord::model_quality`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    /// Number of forecasts summarised.
    pub total_forecasts: usize,
    /// Mean MAPE.
    pub avg_mape: f64,
    /// Mean RMSE.
    pub avg_rmse: f64,
    /// Mean MAE.
    pub avg_mae: f64,
    /// Mean AIC.
    pub avg_aic: f64,
    /// Mean BIC.
    pub avg_bic: f64,
    /// Forecasts with MAPE below 10.
    pub excellent_models: usize,
    /// Forecasts with MAPE in [10, 20).
    pub good_models: usize,
    /// Forecasts with MAPE in [20, 30).
    pub fair_models: usize,
    /// Everything else.
    pub poor_models: usize,
    /// Breakdown by granularity; periods without forecasts are absent.
    pub period_performance: BTreeMap<PeriodType, PeriodPerformance>,
}

impl PerformanceSummary {
    /// Summarises `records`.
    #[must_use]
    pub fn from_records(records: &[ForecastRecord]) -> Self {
        let all: Vec<&ForecastRecord> = records.iter().collect();
        let mut summary = Self {
            total_forecasts: all.len(),
            avg_mape: average(&all, |r| r.metrics.mape),
            avg_rmse: average(&all, |r| r.metrics.rmse),
            avg_mae: average(&all, |r| r.metrics.mae),
            avg_aic: average(&all, |r| r.metrics.aic),
            avg_bic: average(&all, |r| r.metrics.bic),
            ..Self::default()
        };

        for record in records {
            match record.model_quality() {
                "Excellent" => summary.excellent_models += 1,
                "Good" => summary.good_models += 1,
                "Fair" => summary.fair_models += 1,
                _ => summary.poor_models += 1,
            }
        }

        for period in [PeriodType::Daily, PeriodType::Weekly, PeriodType::Monthly] {
            let subset: Vec<&ForecastRecord> =
                records.iter().filter(|r| r.period == period).collect();
            if subset.is_empty() {
                continue;
            }
            summary.period_performance.insert(
                period,
                PeriodPerformance {
                    count: subset.len(),
                    avg_mape: average(&subset, |r| r.metrics.mape),
                    avg_rmse: average(&subset, |r| r.metrics.rmse),
                },
            );
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use demand_core::{
        ArimaOrder, ConfidenceIntervals, ForecastMetrics, ItemId, NewForecast, TrainingWindow,
    };

    fn record(id: i64, period: PeriodType, mape: f64, rmse: f64) -> ForecastRecord {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        ForecastRecord::from_new(
            id,
            Utc::now(),
            NewForecast {
                item_id: ItemId(1),
                period,
                horizon: 1,
                order: ArimaOrder::new(1, 0, 0),
                metrics: ForecastMetrics {
                    aic: 100.0,
                    bic: 110.0,
                    rmse,
                    mae: rmse / 2.0,
                    mape,
                },
                forecasted_values: vec![1.0],
                confidence_intervals: ConfidenceIntervals {
                    lower: vec![0.0],
                    upper: vec![2.0],
                },
                training: TrainingWindow {
                    start_date: day,
                    end_date: day,
                    point_count: 30,
                },
            },
        )
    }

    #[test]
    fn test_summary_counts_and_averages() {
        let summary = PerformanceSummary::from_records(&[
            record(1, PeriodType::Weekly, 5.0, 2.0),
            record(2, PeriodType::Weekly, 10.0, 4.0),
            record(3, PeriodType::Monthly, 25.0, 1.0),
            record(4, PeriodType::Monthly, 40.0, 1.0),
        ]);

        assert_eq!(summary.total_forecasts, 4);
        assert_eq!(summary.avg_mape, 20.0);
        assert_eq!(summary.avg_rmse, 2.0);
        assert_eq!(summary.avg_aic, 100.0);
        assert_eq!(
            (
                summary.excellent_models,
                summary.good_models,
                summary.fair_models,
                summary.poor_models
            ),
            (1, 1, 1, 1)
        );

        let weekly = summary.period_performance[&PeriodType::Weekly];
        assert_eq!(weekly.count, 2);
        assert_eq!(weekly.avg_mape, 7.5);
        assert_eq!(weekly.avg_rmse, 3.0);
        assert!(!summary.period_performance.contains_key(&PeriodType::Daily));
    }

    #[test]
    fn test_empty_summary() {
        let summary = PerformanceSummary::from_records(&[]);
        assert_eq!(summary, PerformanceSummary::default());
        assert_eq!(summary.avg_mape, 0.0);
    }

    #[test]
    fn test_averages_rounded() {
        let summary = PerformanceSummary::from_records(&[
            record(1, PeriodType::Daily, 1.0, 1.0),
            record(2, PeriodType::Daily, 2.0, 1.0),
            record(3, PeriodType::Daily, 2.0, 1.0),
        ]);
        assert_eq!(summary.avg_mape, 1.67);
    }
}
