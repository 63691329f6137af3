//! Raw order lines to clean periodic demand series.

use std::sync::Arc;

use demand_core::{
    DateRange, ForecastError, ItemId, LineItem, PeriodType, Result, SalesSource, StatusFilter,
    TimeSeriesPoint,
};
use demand_model::{mean, sample_std};
use polars::prelude::{Column, DataFrame, IntoLazy, PolarsError, col};
use tracing::{debug, instrument, warn};

fn aggregation_error(e: PolarsError) -> ForecastError {
    ForecastError::Aggregation(e.to_string())
}

/// Builds periodic demand series from the sales feed.
///
/// Only periods with at least one order line are emitted; gaps are never
/// zero-filled. Totals are not outlier-capped here; the forecast path applies
/// [`cap_outliers`] before fitting.
#[derive(Debug, Clone)]
pub struct SalesDataAggregator {
    source: Arc<dyn SalesSource>,
}

impl SalesDataAggregator {
    /// Creates an aggregator reading from `source`.
    #[must_use]
    pub fn new(source: Arc<dyn SalesSource>) -> Self {
        Self { source }
    }

    /// Returns the per-period sales totals of `item` at `period` granularity.
    ///
    /// Non-finite and negative totals become `0.0`.
    /// Fulfilled orders within `range` are tried first. When none exist the
    /// date range is dropped, then the status filter.
    ///
    /// # Errors
    /// Returns [`ForecastError::Data`] when the item has no order lines at all.
    #[instrument(skip(self), fields(item = %item, period = %period))]
    pub async fn aggregate(
        &self,
        item: ItemId,
        period: PeriodType,
        range: Option<DateRange>,
    ) -> Result<Vec<TimeSeriesPoint>> {
        let lines = self.fetch_with_relaxation(item, range).await?;
        let series = clip_negative(bucket(&lines, period)?);
        debug!(
            lines = lines.len(),
            points = series.len(),
            "Aggregated sales series"
        );
        Ok(series)
    }

    async fn fetch_with_relaxation(
        &self,
        item: ItemId,
        range: Option<DateRange>,
    ) -> Result<Vec<LineItem>> {
        let lines = self
            .source
            .line_items(item, StatusFilter::Fulfilled, range)
            .await?;
        if !lines.is_empty() {
            return Ok(lines);
        }

        if range.is_some() {
            warn!(item = %item, "No fulfilled sales in date range, retrying without range");
            let lines = self
                .source
                .line_items(item, StatusFilter::Fulfilled, None)
                .await?;
            if !lines.is_empty() {
                return Ok(lines);
            }
        }

        warn!(item = %item, "No fulfilled sales, retrying with every order status");
        let lines = self.source.line_items(item, StatusFilter::Any, None).await?;
        if lines.is_empty() {
            return Err(ForecastError::Data { item });
        }
        Ok(lines)
    }
}

/// Sums order quantities per period, in order of first appearance.
fn bucket(lines: &[LineItem], period: PeriodType) -> Result<Vec<TimeSeriesPoint>> {
    let periods: Vec<String> = lines
        .iter()
        .map(|line| period.period_start(line.occurred_at.date_naive()).to_string())
        .collect();
    let quantities: Vec<f64> = lines
        .iter()
        .map(|line| {
            if line.quantity.is_finite() {
                line.quantity
            } else {
                0.0
            }
        })
        .collect();

    let df = DataFrame::new(vec![
        Column::new("period".into(), periods),
        Column::new("quantity".into(), quantities),
    ])
    .map_err(aggregation_error)?;

    let grouped = df
        .lazy()
        .group_by_stable([col("period")])
        .agg([col("quantity").sum()])
        .collect()
        .map_err(aggregation_error)?;

    let periods = grouped
        .column("period")
        .map_err(aggregation_error)?
        .str()
        .map_err(aggregation_error)?;
    let quantities = grouped
        .column("quantity")
        .map_err(aggregation_error)?
        .f64()
        .map_err(aggregation_error)?;

    let mut series = Vec::with_capacity(grouped.height());
    for (start, quantity) in periods.into_iter().zip(quantities) {
        let start = start
            .ok_or_else(|| ForecastError::Aggregation("Missing period".to_string()))?
            .parse()
            .map_err(|e| ForecastError::Parse(format!("Invalid period start: {e}")))?;
        series.push(TimeSeriesPoint::new(start, quantity.unwrap_or(0.0)));
    }
    series.sort_by_key(|point| point.period_start);
    Ok(series)
}

/// Zeroes non-finite and negative quantities.
fn clip_negative(mut series: Vec<TimeSeriesPoint>) -> Vec<TimeSeriesPoint> {
    for point in &mut series {
        if !point.quantity.is_finite() || point.quantity < 0.0 {
            point.quantity = 0.0;
        }
    }
    series
}

/// Caps quantities at `mean + 3 * sample_std` when the deviation is positive.
#[must_use]
pub fn cap_outliers(mut series: Vec<TimeSeriesPoint>) -> Vec<TimeSeriesPoint> {
    let values: Vec<f64> = series.iter().map(|p| p.quantity).collect();
    let std = sample_std(&values);
    if std.is_finite() && std > 0.0 {
        let cap = mean(&values) + 3.0 * std;
        for point in &mut series {
            point.quantity = point.quantity.min(cap);
        }
    }
    series
}
