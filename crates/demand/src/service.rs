//! Public entry point tying the pipeline, batch orchestration and
//! maintenance jobs together.

use std::collections::BTreeMap;
use std::sync::Arc;

use demand_core::{
    EngineConfig, ForecastRecord, ForecastStore, ItemId, OptimizationRecord, OptimizerConfig,
    PeriodType, Result, SalesSource, TrendRecord,
};
use demand_core::ForecastError;
use demand_model::{Correlogram, ModelSelector, StepwiseSelector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::aggregator::cap_outliers;
use crate::alerts::{ReorderAlert, reorder_alerts};
use crate::bulk::{BatchOutcome, BulkOrchestrator, ForecastCandidate, ScoredCandidate};
use crate::pipeline::ForecastPipeline;
use crate::summary::PerformanceSummary;
use crate::trends::TrendAnalyzer;

/// Period used by [`DemandService::optimize_supply_chain`].
pub const SUPPLY_CHAIN_PERIOD: PeriodType = PeriodType::Weekly;

/// Horizon used by [`DemandService::optimize_supply_chain`].
pub const SUPPLY_CHAIN_HORIZON: u32 = 4;

/// A re-forecast with a longer horizon and its inventory levels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtendedForecast {
    /// The new forecast.
    pub forecast: ForecastRecord,
    /// Levels optimized from the new forecast.
    pub optimization: OptimizationRecord,
}

/// Demand forecasting and inventory optimization over one sales feed and
/// one forecast store.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use demand::{DemandService, ItemId, PeriodType, SqliteStore};
///
/// let store = Arc::new(SqliteStore::new("demand.db")?);
/// let service = DemandService::from_store(store);
///
/// let forecast = service.generate_forecast(ItemId(7), PeriodType::Weekly, 12).await?;
/// let levels = service.optimize_inventory(&forecast, None).await?;
/// println!("reorder at {}", levels.reorder_point);
/// ```
pub struct DemandService {
    config: EngineConfig,
    source: Arc<dyn SalesSource>,
    store: Arc<dyn ForecastStore>,
    selector: Arc<dyn ModelSelector>,
    pipeline: Arc<ForecastPipeline>,
    bulk: BulkOrchestrator,
}

impl std::fmt::Debug for DemandService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemandService")
            .field("source", &self.source)
            .field("store", &self.store)
            .field("selector", &self.selector)
            .field("worker_limit", &self.config.worker_limit())
            .finish()
    }
}

impl DemandService {
    /// Creates a service with the default configuration.
    #[must_use]
    pub fn new(source: Arc<dyn SalesSource>, store: Arc<dyn ForecastStore>) -> Self {
        Self::assemble(
            source,
            store,
            EngineConfig::default(),
            Arc::new(StepwiseSelector::new()),
        )
    }

    /// Creates a service over a backend that is both the sales feed and the
    /// forecast store.
    #[must_use]
    pub fn from_store<S>(backend: Arc<S>) -> Self
    where
        S: SalesSource + ForecastStore + 'static,
    {
        let source: Arc<dyn SalesSource> = Arc::clone(&backend) as Arc<dyn SalesSource>;
        let store: Arc<dyn ForecastStore> = backend;
        Self::new(source, store)
    }

    /// Replaces the configuration.
    ///
    /// # Errors
    /// Returns [`ForecastError::InvalidParameter`](demand_core::ForecastError::InvalidParameter)
    /// if `config` fails validation.
    pub fn with_config(self, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(self.source, self.store, config, self.selector))
    }

    /// Replaces the order selection strategy.
    #[must_use]
    pub fn with_selector(self, selector: Arc<dyn ModelSelector>) -> Self {
        Self::assemble(self.source, self.store, self.config, selector)
    }

    fn assemble(
        source: Arc<dyn SalesSource>,
        store: Arc<dyn ForecastStore>,
        config: EngineConfig,
        selector: Arc<dyn ModelSelector>,
    ) -> Self {
        let pipeline = Arc::new(ForecastPipeline::new(
            Arc::clone(&source),
            Arc::clone(&store),
            &config,
            Arc::clone(&selector),
        ));
        let bulk = BulkOrchestrator::new(Arc::clone(&pipeline), &config);
        debug!(worker_limit = config.worker_limit(), "Assembled demand service");
        Self {
            config,
            source,
            store,
            selector,
            pipeline,
            bulk,
        }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Aggregates history, fits a model and stores a forecast for `item`.
    ///
    /// # Errors
    /// Returns [`ForecastError::Data`](demand_core::ForecastError::Data) when
    /// the item has no sales, [`ForecastError::InsufficientData`](demand_core::ForecastError::InsufficientData)
    /// for short series, [`ForecastError::ModelFit`](demand_core::ForecastError::ModelFit)
    /// on solver failure and [`ForecastError::StorageContention`](demand_core::ForecastError::StorageContention)
    /// when the store stays locked.
    pub async fn generate_forecast(
        &self,
        item: ItemId,
        period: PeriodType,
        horizon: u32,
    ) -> Result<ForecastRecord> {
        Ok(self.pipeline.forecast(item, period, horizon).await?.record)
    }

    /// Computes and stores inventory levels for `forecast`.
    ///
    /// `None` uses the configured optimizer defaults.
    ///
    /// # Errors
    /// Returns an error if the item lookups or the write fail.
    pub async fn optimize_inventory(
        &self,
        forecast: &ForecastRecord,
        config: Option<OptimizerConfig>,
    ) -> Result<OptimizationRecord> {
        let config = config.unwrap_or(self.config.optimizer);
        self.pipeline.optimize(forecast, &config).await
    }

    /// Forecasts every item in `items`, isolating per-item failures.
    pub async fn generate_bulk_forecasts(
        &self,
        items: &[ItemId],
        period: PeriodType,
        horizon: u32,
    ) -> BatchOutcome {
        self.bulk.run(items, period, horizon).await
    }

    /// Searches item and configuration combinations for the lowest composite score.
    ///
    /// `None` for `item` searches every active item; `None` for `candidates`
    /// uses [`ForecastCandidate::DEFAULT_GRID`].
    ///
    /// # Errors
    /// Returns [`ForecastError::NoViableCandidate`](demand_core::ForecastError::NoViableCandidate)
    /// when no combination produced a forecast, or an error if the active
    /// items cannot be listed.
    #[instrument(skip(self, candidates))]
    pub async fn find_best_forecast(
        &self,
        item: Option<ItemId>,
        candidates: Option<&[ForecastCandidate]>,
    ) -> Result<ScoredCandidate> {
        let items = match item {
            Some(item) => vec![item],
            None => self.source.active_items().await?,
        };
        let candidates = candidates.unwrap_or(&ForecastCandidate::DEFAULT_GRID);
        let best = self.bulk.find_best(&items, candidates).await?;
        info!(
            item = %best.item_id,
            period = %best.candidate.period,
            horizon = best.candidate.horizon,
            score = best.score,
            "Selected best forecast"
        );
        Ok(best)
    }

    /// Rebuilds the sales trend rows of `item` at `period`.
    ///
    /// # Errors
    /// Returns the first aggregation, lookup or storage error.
    pub async fn update_sales_trends(
        &self,
        item: ItemId,
        period: PeriodType,
    ) -> Result<Vec<TrendRecord>> {
        TrendAnalyzer::new(Arc::clone(&self.pipeline))
            .update(item, period)
            .await
    }

    /// Alerts for active items at or below their reorder point.
    ///
    /// # Errors
    /// Returns an error if the stock levels cannot be read.
    pub async fn reorder_alerts(&self) -> Result<Vec<ReorderAlert>> {
        reorder_alerts(self.source.as_ref(), self.store.as_ref()).await
    }

    /// Forecasts and optimizes each item with a weekly, four-period horizon.
    ///
    /// Failing items are logged and left out of the result.
    pub async fn optimize_supply_chain(
        &self,
        items: &[ItemId],
    ) -> BTreeMap<ItemId, OptimizationRecord> {
        self.bulk
            .optimize(
                items,
                SUPPLY_CHAIN_PERIOD,
                SUPPLY_CHAIN_HORIZON,
                &self.config.optimizer,
            )
            .await
    }

    /// Re-forecasts the item of forecast `id` over its horizon plus
    /// `extension` periods of `period`, then optimizes the new forecast.
    ///
    /// The existing forecast is left untouched.
    ///
    /// # Errors
    /// Returns [`ForecastError::InvalidParameter`] for a zero extension or a
    /// resulting horizon above the cap for `period`, [`ForecastError::NotFound`]
    /// for an unknown id, and any pipeline error unchanged.
    #[instrument(skip(self))]
    pub async fn extend_forecast(
        &self,
        id: i64,
        extension: u32,
        period: PeriodType,
    ) -> Result<ExtendedForecast> {
        let max_horizon = self.config.max_horizon.for_period(period);
        if extension == 0 || extension > max_horizon {
            return Err(ForecastError::InvalidParameter(format!(
                "Extension for {period} forecasts must be between 1 and {max_horizon} periods, got {extension}"
            )));
        }
        let existing = self
            .store
            .load_forecast(id)
            .await?
            .ok_or_else(|| ForecastError::NotFound(format!("forecast {id}")))?;

        let horizon = existing.horizon.saturating_add(extension);
        let forecast = self
            .generate_forecast(existing.item_id, period, horizon)
            .await?;
        let optimization = self.optimize_inventory(&forecast, None).await?;
        info!(from = id, to = forecast.id, horizon, "Extended forecast");
        Ok(ExtendedForecast {
            forecast,
            optimization,
        })
    }

    /// Averages and quality distribution over every active forecast.
    ///
    /// # Errors
    /// Returns an error if the forecasts cannot be read.
    pub async fn performance_summary(&self) -> Result<PerformanceSummary> {
        let forecasts = self.store.active_forecasts().await?;
        Ok(PerformanceSummary::from_records(&forecasts))
    }

    /// ACF and PACF of the outlier-capped history of `item` at `period`.
    ///
    /// # Errors
    /// Returns [`ForecastError::Data`] when the item has no sales.
    pub async fn correlogram(&self, item: ItemId, period: PeriodType) -> Result<Correlogram> {
        let series = cap_outliers(self.pipeline.history(item, period).await?);
        let values: Vec<f64> = series.iter().map(|p| p.quantity).collect();
        Ok(self.pipeline.engine().correlogram(&values))
    }

    /// Soft-deletes a forecast so it no longer counts as the latest.
    ///
    /// # Errors
    /// Returns [`ForecastError::NotFound`](demand_core::ForecastError::NotFound)
    /// for an unknown id, or a storage error.
    #[instrument(skip(self))]
    pub async fn deactivate_forecast(&self, id: i64) -> Result<()> {
        self.pipeline
            .retry()
            .execute(|| self.store.set_forecast_active(id, false))
            .await?;
        info!(id, "Deactivated forecast");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertPriority;
    use async_trait::async_trait;
    use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
    use demand_core::{
        CategoryClass, ForecastError, LineItem, NewForecast, NewOptimization, OrderStatus,
        RetryPolicy, TrendDirection, TrendPoint,
    };
    use demand_store::{CatalogItem, InMemoryStore};
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn monday(week: u64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Days::new(7 * week)
    }

    fn sale(item: i64, at: DateTime<Utc>, quantity: f64) -> LineItem {
        LineItem {
            item_id: ItemId(item),
            occurred_at: at,
            quantity,
            unit_price: Decimal::from(4),
            status: OrderStatus::Delivered,
        }
    }

    fn weekly_sales(item: i64, weeks: u64) -> Vec<LineItem> {
        (0..weeks)
            .map(|w| sale(item, monday(w), 10.0 + (w % 4) as f64))
            .collect()
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                delay_ms: 1,
            },
            max_workers: Some(2),
            ..EngineConfig::default()
        }
    }

    async fn seeded_store(items: &[(i64, u64)]) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for &(id, weeks) in items {
            store
                .add_item(
                    CatalogItem::new(ItemId(id), Decimal::from(4), CategoryClass::General)
                        .with_stock(50, 10),
                )
                .await;
            store.record_sales(weekly_sales(id, weeks)).await;
        }
        store
    }

    fn service(store: Arc<InMemoryStore>) -> DemandService {
        DemandService::from_store(store)
            .with_config(fast_config())
            .unwrap()
    }

    #[tokio::test]
    async fn test_constant_demand_forecast() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add_item(CatalogItem::new(ItemId(1), Decimal::from(10), CategoryClass::General))
            .await;
        store
            .record_sales((0..52).map(|w| sale(1, monday(w), 10.0)))
            .await;
        let service = service(Arc::clone(&store));

        let forecast = service
            .generate_forecast(ItemId(1), PeriodType::Weekly, 4)
            .await
            .unwrap();

        assert_eq!(forecast.forecasted_values.len(), 4);
        assert!(forecast.forecasted_values.iter().all(|v| (v - 10.0).abs() < 1e-3));
        assert!(forecast.metrics.mape < 1e-3);
        assert_eq!(forecast.model_quality(), "Excellent");
        assert_eq!(
            store.latest_forecast(ItemId(1)).await.unwrap().unwrap().id,
            forecast.id
        );
    }

    #[tokio::test]
    async fn test_unknown_item_has_no_data() {
        let service = service(seeded_store(&[(1, 20)]).await);
        let err = service
            .generate_forecast(ItemId(99), PeriodType::Weekly, 4)
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::Data { item: ItemId(99) }));
    }

    #[tokio::test]
    async fn test_out_of_stock_alert_is_urgent_and_critical() {
        let store = seeded_store(&[(1, 20)]).await;
        store.set_stock(ItemId(1), 0).await.unwrap();
        let service = service(Arc::clone(&store));

        let forecast = service
            .generate_forecast(ItemId(1), PeriodType::Weekly, 4)
            .await
            .unwrap();
        let optimization = service.optimize_inventory(&forecast, None).await.unwrap();
        assert!(optimization.reorder_point >= 1);

        let alerts = service.reorder_alerts().await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].priority, AlertPriority::Urgent);
        assert!(alerts[0].is_critical);
        assert_eq!(alerts[0].suggested_quantity, optimization.optimal_order_quantity);
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let store = seeded_store(&[(1, 20), (2, 5), (3, 20), (4, 5), (5, 20)]).await;
        let service = service(store);
        let items: Vec<ItemId> = (1..=5).map(ItemId).collect();

        let outcome = service
            .generate_bulk_forecasts(&items, PeriodType::Weekly, 4)
            .await;

        assert_eq!(outcome.failed_count, 2);
        let ids: Vec<ItemId> = outcome.succeeded.iter().map(|r| r.item_id).collect();
        assert_eq!(ids, vec![ItemId(1), ItemId(3), ItemId(5)]);
    }

    #[tokio::test]
    async fn test_best_forecast_without_viable_candidate() {
        let service = service(seeded_store(&[(1, 5), (2, 5)]).await);
        let err = service.find_best_forecast(None, None).await.unwrap_err();
        assert!(matches!(err, ForecastError::NoViableCandidate(_)));
    }

    #[tokio::test]
    async fn test_best_forecast_skips_short_history() {
        let store = seeded_store(&[(1, 15)]).await;
        let service = service(Arc::clone(&store));

        // 15 weekly points satisfy the weekly minimum but not the candidate minimum
        let err = service
            .find_best_forecast(Some(ItemId(1)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::NoViableCandidate(_)));
        assert!(store.active_forecasts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_best_forecast_skips_short_configurations() {
        let store = seeded_store(&[(1, 40)]).await;
        let service = service(Arc::clone(&store));
        let candidates = [
            ForecastCandidate::new(PeriodType::Monthly, 6),
            ForecastCandidate::new(PeriodType::Weekly, 4),
        ];

        let best = service
            .find_best_forecast(Some(ItemId(1)), Some(&candidates))
            .await
            .unwrap();

        // 40 weeks give only ten monthly points
        assert_eq!(best.candidate, candidates[1]);
        assert!(best.score.is_finite());
        assert_eq!(best.metrics().mape, best.record.metrics.mape);
    }

    #[tokio::test]
    async fn test_supply_chain_skips_failing_items() {
        let service = service(seeded_store(&[(1, 20), (2, 3)]).await);
        let result = service
            .optimize_supply_chain(&[ItemId(1), ItemId(2), ItemId(3)])
            .await;

        assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![ItemId(1)]);
        assert_eq!(result[&ItemId(1)].lead_time_days, 7);
    }

    #[tokio::test]
    async fn test_deactivated_forecast_is_not_latest() {
        let store = seeded_store(&[(1, 20)]).await;
        let service = service(Arc::clone(&store));
        let forecast = service
            .generate_forecast(ItemId(1), PeriodType::Weekly, 4)
            .await
            .unwrap();

        service.deactivate_forecast(forecast.id).await.unwrap();

        assert!(store.latest_forecast(ItemId(1)).await.unwrap().is_none());
        assert!(store.load_forecast(forecast.id).await.unwrap().is_some());
        assert!(matches!(
            service.deactivate_forecast(999).await,
            Err(ForecastError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_monthly_trends() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add_item(CatalogItem::new(ItemId(8), Decimal::new(250, 2), CategoryClass::Supplement))
            .await;
        let month = |m: u32| Utc.with_ymd_and_hms(2024, m, 10, 9, 0, 0).unwrap();
        store
            .record_sales(vec![
                sale(8, month(1), 10.0),
                sale(8, month(2), 20.0),
                sale(8, month(3), 20.0),
            ])
            .await;
        let service = service(store);

        let rows = service
            .update_sales_trends(ItemId(8), PeriodType::Monthly)
            .await
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].period_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(rows[0].revenue, Decimal::new(2500, 2));
        assert_eq!(rows[1].revenue, Decimal::new(5000, 2));
        assert_eq!(rows[0].growth_rate, None);
        assert_eq!(rows[1].growth_rate, Some(100.0));
        assert_eq!(rows[1].trend_direction, Some(TrendDirection::Up));
        assert_eq!(rows[2].growth_rate, Some(0.0));
        assert_eq!(rows[2].trend_direction, Some(TrendDirection::Stable));

        // Re-running updates the same rows in place
        let again = service
            .update_sales_trends(ItemId(8), PeriodType::Monthly)
            .await
            .unwrap();
        assert_eq!(
            again.iter().map(|r| r.id).collect::<Vec<_>>(),
            rows.iter().map(|r| r.id).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_trends_keep_spike_uncapped() {
        let store = Arc::new(InMemoryStore::new());
        store
            .add_item(CatalogItem::new(ItemId(5), Decimal::from(10), CategoryClass::General))
            .await;
        let day = |d: u32| Utc.with_ymd_and_hms(2024, 3, d, 8, 0, 0).unwrap();
        let mut lines: Vec<LineItem> = (1..=20).map(|d| sale(5, day(d), 1.0)).collect();
        lines.push(sale(5, day(21), 100.0));
        store.record_sales(lines).await;
        let service = service(store);

        let rows = service
            .update_sales_trends(ItemId(5), PeriodType::Daily)
            .await
            .unwrap();

        assert_eq!(rows.len(), 21);
        assert_eq!(rows[20].quantity_sold, 100.0);
        assert_eq!(rows[20].revenue, Decimal::from(1000));
        assert_eq!(rows[20].growth_rate, Some(9900.0));
    }

    #[tokio::test]
    async fn test_horizon_above_cap_rejected() {
        let service = service(seeded_store(&[(1, 20)]).await);
        for horizon in [53, u32::MAX] {
            assert!(matches!(
                service
                    .generate_forecast(ItemId(1), PeriodType::Weekly, horizon)
                    .await,
                Err(ForecastError::InvalidParameter(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_extend_forecast() {
        let store = seeded_store(&[(1, 20)]).await;
        let service = service(Arc::clone(&store));
        let original = service
            .generate_forecast(ItemId(1), PeriodType::Weekly, 4)
            .await
            .unwrap();

        let extended = service
            .extend_forecast(original.id, 8, PeriodType::Weekly)
            .await
            .unwrap();

        assert_eq!(extended.forecast.horizon, 12);
        assert_eq!(extended.forecast.forecasted_values.len(), 12);
        assert_eq!(extended.optimization.forecast_id, extended.forecast.id);
        assert_eq!(
            store.latest_forecast(ItemId(1)).await.unwrap().unwrap().id,
            extended.forecast.id
        );
        assert!(store.load_forecast(original.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_extend_forecast_rejects_bad_requests() {
        let store = seeded_store(&[(1, 20)]).await;
        let service = service(Arc::clone(&store));
        let long = service
            .generate_forecast(ItemId(1), PeriodType::Weekly, 50)
            .await
            .unwrap();

        for extension in [0, 53] {
            assert!(matches!(
                service.extend_forecast(long.id, extension, PeriodType::Weekly).await,
                Err(ForecastError::InvalidParameter(_))
            ));
        }
        // 50 + 3 exceeds the weekly cap
        assert!(matches!(
            service.extend_forecast(long.id, 3, PeriodType::Weekly).await,
            Err(ForecastError::InvalidParameter(_))
        ));
        assert!(matches!(
            service.extend_forecast(999, 2, PeriodType::Weekly).await,
            Err(ForecastError::NotFound(_))
        ));
        assert_eq!(store.active_forecasts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_performance_summary_over_active_forecasts() {
        let store = seeded_store(&[(1, 20), (2, 20)]).await;
        let service = service(Arc::clone(&store));
        let first = service
            .generate_forecast(ItemId(1), PeriodType::Weekly, 4)
            .await
            .unwrap();
        let second = service
            .generate_forecast(ItemId(2), PeriodType::Weekly, 4)
            .await
            .unwrap();
        service.deactivate_forecast(first.id).await.unwrap();

        let summary = service.performance_summary().await.unwrap();
        assert_eq!(summary.total_forecasts, 1);
        assert_eq!(summary.period_performance[&PeriodType::Weekly].count, 1);
        assert_eq!(
            summary.excellent_models
                + summary.good_models
                + summary.fair_models
                + summary.poor_models,
            1
        );
        assert_eq!(
            summary.avg_mape,
            (second.metrics.mape * 100.0).round() / 100.0
        );
    }

    #[tokio::test]
    async fn test_correlogram_of_history() {
        let service = service(seeded_store(&[(1, 20)]).await);
        let correlogram = service
            .correlogram(ItemId(1), PeriodType::Weekly)
            .await
            .unwrap();
        // 20 points: lags 0..=19 and 0..=9
        assert_eq!(correlogram.acf.len(), 20);
        assert_eq!(correlogram.pacf.len(), 10);
        assert!((correlogram.acf[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let service = DemandService::from_store(Arc::new(InMemoryStore::new()));
        let config = EngineConfig {
            max_workers: Some(0),
            ..EngineConfig::default()
        };
        assert!(matches!(
            service.with_config(config),
            Err(ForecastError::InvalidParameter(_))
        ));
    }

    /// Store whose forecast writes report a locked database a fixed number of times.
    #[derive(Debug)]
    struct BusyStore {
        inner: InMemoryStore,
        busy_writes: AtomicU32,
    }

    #[async_trait]
    impl ForecastStore for BusyStore {
        async fn create_forecast(&self, forecast: &NewForecast) -> Result<ForecastRecord> {
            let remaining = self.busy_writes.load(Ordering::SeqCst);
            if remaining > 0 {
                self.busy_writes.store(remaining - 1, Ordering::SeqCst);
                return Err(ForecastError::StoreBusy("database is locked".into()));
            }
            self.inner.create_forecast(forecast).await
        }

        async fn load_forecast(&self, id: i64) -> Result<Option<ForecastRecord>> {
            self.inner.load_forecast(id).await
        }

        async fn latest_forecast(&self, item: ItemId) -> Result<Option<ForecastRecord>> {
            self.inner.latest_forecast(item).await
        }

        async fn active_forecasts(&self) -> Result<Vec<ForecastRecord>> {
            self.inner.active_forecasts().await
        }

        async fn set_forecast_active(&self, id: i64, active: bool) -> Result<()> {
            self.inner.set_forecast_active(id, active).await
        }

        async fn create_optimization(
            &self,
            optimization: &NewOptimization,
        ) -> Result<OptimizationRecord> {
            self.inner.create_optimization(optimization).await
        }

        async fn latest_optimization(&self, item: ItemId) -> Result<Option<OptimizationRecord>> {
            self.inner.latest_optimization(item).await
        }

        async fn upsert_trend(&self, point: &TrendPoint) -> Result<TrendRecord> {
            self.inner.upsert_trend(point).await
        }

        async fn trends(&self, item: ItemId, period: PeriodType) -> Result<Vec<TrendRecord>> {
            self.inner.trends(item, period).await
        }

        async fn set_trend_indicators(
            &self,
            id: i64,
            growth_rate: Option<f64>,
            direction: Option<TrendDirection>,
        ) -> Result<()> {
            self.inner.set_trend_indicators(id, growth_rate, direction).await
        }
    }

    async fn busy_service(busy_writes: u32) -> DemandService {
        let source = seeded_store(&[(1, 20)]).await;
        let store = Arc::new(BusyStore {
            inner: InMemoryStore::new(),
            busy_writes: AtomicU32::new(busy_writes),
        });
        DemandService::new(source, store)
            .with_config(fast_config())
            .unwrap()
    }

    #[tokio::test]
    async fn test_forecast_write_retried_while_busy() {
        let service = busy_service(2).await;
        let forecast = service
            .generate_forecast(ItemId(1), PeriodType::Weekly, 4)
            .await
            .unwrap();
        assert_eq!(forecast.id, 1);
    }

    #[tokio::test]
    async fn test_forecast_write_gives_up_after_max_attempts() {
        let service = busy_service(5).await;
        let err = service
            .generate_forecast(ItemId(1), PeriodType::Weekly, 4)
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::StorageContention { attempts: 3, .. }));
    }
}
