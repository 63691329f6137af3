//! Per-item forecast and optimization pipeline.

use std::sync::Arc;

use demand_core::{
    EngineConfig, ForecastError, ForecastRecord, ForecastStore, ItemId, OptimizationRecord,
    OptimizerConfig, PeriodType, Result, SalesSource, TimeSeriesPoint,
};
use demand_model::{ModelSelector, mean};
use tracing::{info, instrument};

use crate::aggregator::SalesDataAggregator;
use crate::engine::ForecastEngine;
use crate::optimizer::InventoryOptimizer;
use crate::retry::RetryingPersistence;

/// A persisted forecast together with the history it was trained on.
#[derive(Clone, Debug, PartialEq)]
pub struct ForecastOutcome {
    /// The stored forecast.
    pub record: ForecastRecord,
    /// Mean quantity of the training series before outlier capping.
    pub history_mean: f64,
}

/// Runs aggregation, fitting and persistence for one item at a time.
#[derive(Debug)]
pub struct ForecastPipeline {
    source: Arc<dyn SalesSource>,
    store: Arc<dyn ForecastStore>,
    aggregator: SalesDataAggregator,
    engine: ForecastEngine,
    optimizer: InventoryOptimizer,
    retry: RetryingPersistence,
}

impl ForecastPipeline {
    /// Creates a pipeline over `source` and `store`.
    #[must_use]
    pub fn new(
        source: Arc<dyn SalesSource>,
        store: Arc<dyn ForecastStore>,
        config: &EngineConfig,
        selector: Arc<dyn ModelSelector>,
    ) -> Self {
        Self {
            aggregator: SalesDataAggregator::new(Arc::clone(&source)),
            engine: ForecastEngine::new(config).with_selector(selector),
            optimizer: InventoryOptimizer::new(config.ordering_costs),
            retry: RetryingPersistence::new(config.retry),
            source,
            store,
        }
    }

    /// The aggregator used for history.
    #[must_use]
    pub const fn aggregator(&self) -> &SalesDataAggregator {
        &self.aggregator
    }

    /// The fitting engine.
    #[must_use]
    pub const fn engine(&self) -> &ForecastEngine {
        &self.engine
    }

    /// The retrier wrapping every write.
    #[must_use]
    pub const fn retry(&self) -> &RetryingPersistence {
        &self.retry
    }

    /// The forecast store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ForecastStore> {
        &self.store
    }

    /// The sales feed.
    #[must_use]
    pub fn source(&self) -> &Arc<dyn SalesSource> {
        &self.source
    }

    /// Aggregates history, fits a model off the async runtime and persists
    /// the forecast.
    ///
    /// # Errors
    /// Returns the first error of any stage unchanged.
    #[instrument(skip(self), fields(item = %item, period = %period))]
    pub async fn forecast(
        &self,
        item: ItemId,
        period: PeriodType,
        horizon: u32,
    ) -> Result<ForecastOutcome> {
        let series = self.history(item, period).await?;
        self.forecast_history(item, period, horizon, series).await
    }

    /// Per-period sales totals of `item`, as fed to [`Self::forecast_history`].
    ///
    /// # Errors
    /// Returns [`ForecastError::Data`] when the item has no sales.
    pub async fn history(&self, item: ItemId, period: PeriodType) -> Result<Vec<TimeSeriesPoint>> {
        self.aggregator.aggregate(item, period, None).await
    }

    /// Fits `series` off the async runtime and persists the forecast.
    ///
    /// # Errors
    /// Returns the first fitting or storage error unchanged.
    pub async fn forecast_history(
        &self,
        item: ItemId,
        period: PeriodType,
        horizon: u32,
        series: Vec<TimeSeriesPoint>,
    ) -> Result<ForecastOutcome> {
        let quantities: Vec<f64> = series.iter().map(|p| p.quantity).collect();
        let history_mean = mean(&quantities);

        let engine = self.engine.clone();
        let draft = tokio::task::spawn_blocking(move || {
            engine.build(item, period, horizon, &series)
        })
        .await
        .map_err(|e| ForecastError::Other(format!("Forecast task failed: {e}")))??;

        let record = self
            .retry
            .execute(|| self.store.create_forecast(&draft))
            .await?;

        info!(
            id = record.id,
            order = %record.order,
            mape = record.metrics.mape,
            quality = record.model_quality(),
            "Created forecast"
        );
        Ok(ForecastOutcome {
            record,
            history_mean,
        })
    }

    /// Computes and persists inventory levels for `forecast`.
    ///
    /// # Errors
    /// Returns an error if the item lookups or the write fail.
    #[instrument(skip(self, forecast, config), fields(item = %forecast.item_id, forecast = forecast.id))]
    pub async fn optimize(
        &self,
        forecast: &ForecastRecord,
        config: &OptimizerConfig,
    ) -> Result<OptimizationRecord> {
        let unit_price = self.source.unit_price(forecast.item_id).await?;
        let category = self.source.category_class(forecast.item_id).await?;
        let draft = self
            .optimizer
            .optimize(forecast, config, unit_price, category);

        let record = self
            .retry
            .execute(|| self.store.create_optimization(&draft))
            .await?;

        info!(
            id = record.id,
            reorder_point = record.reorder_point,
            order_quantity = record.optimal_order_quantity,
            "Created inventory optimization"
        );
        Ok(record)
    }
}
