//! Persistence trait for forecast outputs.
//!
//! This module defines the [`ForecastStore`] trait implemented by the SQLite
//! and in-memory backends. Each write runs in its own transaction; callers
//! wrap writes in a retry policy because the backing store may be shared and
//! temporarily locked.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    error::Result,
    period::PeriodType,
    types::{
        ForecastRecord, ItemId, NewForecast, NewOptimization, OptimizationRecord, TrendDirection,
        TrendPoint, TrendRecord,
    },
};

/// Storage for forecasts, optimizations and sales trends.
#[async_trait]
pub trait ForecastStore: Send + Sync + Debug {
    /// Persists a new forecast and returns the stored record.
    async fn create_forecast(&self, forecast: &NewForecast) -> Result<ForecastRecord>;

    /// Loads a forecast by id, active or not.
    ///
    /// Returns `Ok(None)` if no such forecast exists.
    async fn load_forecast(&self, id: i64) -> Result<Option<ForecastRecord>>;

    /// Returns the most recently created active forecast for `item`.
    async fn latest_forecast(&self, item: ItemId) -> Result<Option<ForecastRecord>>;

    /// Returns every active forecast across all items, ordered by id ascending.
    async fn active_forecasts(&self) -> Result<Vec<ForecastRecord>>;

    /// Sets the soft-delete flag of a forecast.
    ///
    /// Returns [`ForecastError::NotFound`](crate::ForecastError::NotFound) for unknown ids.
    async fn set_forecast_active(&self, id: i64, active: bool) -> Result<()>;

    /// Persists the optimization derived from a forecast.
    ///
    /// Fails if the forecast already has an optimization.
    async fn create_optimization(&self, optimization: &NewOptimization)
    -> Result<OptimizationRecord>;

    /// Returns the optimization of the latest active forecast for `item`.
    async fn latest_optimization(&self, item: ItemId) -> Result<Option<OptimizationRecord>>;

    /// Inserts or overwrites the trend row keyed by (item, period, period_date).
    ///
    /// Overwrites quantity, revenue and price; growth indicators are kept.
    async fn upsert_trend(&self, point: &TrendPoint) -> Result<TrendRecord>;

    /// Returns trend rows for `item` at `period`, ordered by period date ascending.
    async fn trends(&self, item: ItemId, period: PeriodType) -> Result<Vec<TrendRecord>>;

    /// Sets the growth indicators of a trend row.
    async fn set_trend_indicators(
        &self,
        id: i64,
        growth_rate: Option<f64>,
        direction: Option<TrendDirection>,
    ) -> Result<()>;
}
