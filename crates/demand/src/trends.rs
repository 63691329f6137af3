//! Per-period sales trends with growth indicators.

use std::sync::Arc;

use demand_core::{ItemId, PeriodType, Result, TrendDirection, TrendPoint, TrendRecord};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tracing::{debug, instrument};

use crate::pipeline::ForecastPipeline;

/// Percentage change from `previous` to `current`, if `previous` is positive.
#[must_use]
pub fn growth_rate(previous: f64, current: f64) -> Option<f64> {
    (previous > 0.0).then(|| (current - previous) / previous * 100.0)
}

/// Maintains the sales trend table.
#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    pipeline: Arc<ForecastPipeline>,
}

impl TrendAnalyzer {
    /// Creates an analyzer sharing the pipeline's source, store and retry policy.
    #[must_use]
    pub fn new(pipeline: Arc<ForecastPipeline>) -> Self {
        Self { pipeline }
    }

    /// Upserts one trend row per observed period of `item`, then refreshes
    /// growth rates and directions.
    ///
    /// Revenue is quantity times the current unit price. Rows whose previous
    /// period sold nothing keep their existing indicators.
    ///
    /// # Errors
    /// Returns the first aggregation, lookup or storage error.
    #[instrument(skip(self), fields(item = %item, period = %period))]
    pub async fn update(&self, item: ItemId, period: PeriodType) -> Result<Vec<TrendRecord>> {
        let series = self
            .pipeline
            .aggregator()
            .aggregate(item, period, None)
            .await?;
        let unit_price = self.pipeline.source().unit_price(item).await?;
        let store = self.pipeline.store();
        let retry = self.pipeline.retry();

        for point in &series {
            let quantity = Decimal::from_f64(point.quantity).unwrap_or(Decimal::ZERO);
            let trend = TrendPoint {
                item_id: item,
                period,
                period_date: point.period_start,
                quantity_sold: point.quantity,
                revenue: (quantity * unit_price).round_dp(2),
                average_price: unit_price,
            };
            retry.execute(|| store.upsert_trend(&trend)).await?;
        }

        let mut rows = store.trends(item, period).await?;
        for i in 1..rows.len() {
            let Some(rate) = growth_rate(rows[i - 1].quantity_sold, rows[i].quantity_sold) else {
                continue;
            };
            let direction = TrendDirection::from_growth_rate(rate);
            let id = rows[i].id;
            retry
                .execute(|| store.set_trend_indicators(id, Some(rate), Some(direction)))
                .await?;
            rows[i].growth_rate = Some(rate);
            rows[i].trend_direction = Some(direction);
        }

        debug!(rows = rows.len(), "Updated sales trends");
        Ok(rows)
    }
}
