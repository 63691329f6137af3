//! In-memory store implementation.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use demand_core::{
    CategoryClass, DateRange, ForecastError, ForecastRecord, ForecastStore, ItemId, LineItem,
    NewForecast, NewOptimization, OptimizationRecord, PeriodType, Result, SalesSource,
    StatusFilter, StockLevel, TrendDirection, TrendPoint, TrendRecord,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::CatalogItem;

/// Key for trend rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TrendKey {
    item: ItemId,
    period: PeriodType,
    period_date: NaiveDate,
}

/// Simple in-memory store for testing and development.
///
/// Data is stored in `RwLock`-protected collections and is lost when the
/// store is dropped. Identifiers are assigned sequentially from 1.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: RwLock<BTreeMap<ItemId, CatalogItem>>,
    sales: RwLock<Vec<LineItem>>,
    forecasts: RwLock<Vec<ForecastRecord>>,
    optimizations: RwLock<Vec<OptimizationRecord>>,
    trends: RwLock<HashMap<TrendKey, TrendRecord>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a catalogue item.
    pub async fn add_item(&self, item: CatalogItem) {
        self.items.write().await.insert(item.id, item);
    }

    /// Updates the stock position of an existing item.
    ///
    /// # Errors
    /// Returns [`ForecastError::NotFound`] for unknown items.
    pub async fn set_stock(&self, item: ItemId, current_stock: i64) -> Result<()> {
        let mut items = self.items.write().await;
        let entry = items
            .get_mut(&item)
            .ok_or_else(|| ForecastError::NotFound(format!("item {item}")))?;
        entry.current_stock = current_stock;
        Ok(())
    }

    /// Appends order lines to the sales feed.
    pub async fn record_sales(&self, lines: impl IntoIterator<Item = LineItem>) {
        let mut sales = self.sales.write().await;
        let before = sales.len();
        sales.extend(lines);
        debug!("Recorded {} order lines", sales.len() - before);
    }

    async fn item(&self, item: ItemId) -> Result<CatalogItem> {
        self.items
            .read()
            .await
            .get(&item)
            .cloned()
            .ok_or_else(|| ForecastError::NotFound(format!("item {item}")))
    }
}

#[async_trait]
impl SalesSource for InMemoryStore {
    #[instrument(skip(self), fields(item = %item))]
    async fn line_items(
        &self,
        item: ItemId,
        status: StatusFilter,
        range: Option<DateRange>,
    ) -> Result<Vec<LineItem>> {
        let sales = self.sales.read().await;
        let mut lines: Vec<LineItem> = sales
            .iter()
            .filter(|line| line.item_id == item && status.accepts(line.status))
            .filter(|line| range.is_none_or(|r| r.contains(line.occurred_at)))
            .cloned()
            .collect();
        lines.sort_by_key(|line| line.occurred_at);
        debug!("Found {} order lines", lines.len());
        Ok(lines)
    }

    async fn unit_price(&self, item: ItemId) -> Result<Decimal> {
        Ok(self.item(item).await?.unit_price)
    }

    async fn category_class(&self, item: ItemId) -> Result<CategoryClass> {
        Ok(self.item(item).await?.category)
    }

    async fn active_items(&self) -> Result<Vec<ItemId>> {
        Ok(self
            .items
            .read()
            .await
            .values()
            .filter(|item| item.is_active)
            .map(|item| item.id)
            .collect())
    }

    async fn stock_levels(&self) -> Result<Vec<StockLevel>> {
        Ok(self
            .items
            .read()
            .await
            .values()
            .filter(|item| item.is_active)
            .map(CatalogItem::stock_level)
            .collect())
    }
}

#[async_trait]
impl ForecastStore for InMemoryStore {
    #[instrument(skip(self, forecast), fields(item = %forecast.item_id))]
    async fn create_forecast(&self, forecast: &NewForecast) -> Result<ForecastRecord> {
        let mut forecasts = self.forecasts.write().await;
        let id = forecasts.len() as i64 + 1;
        let record = ForecastRecord::from_new(id, Utc::now(), forecast.clone());
        forecasts.push(record.clone());
        debug!(id, "Stored forecast");
        Ok(record)
    }

    async fn load_forecast(&self, id: i64) -> Result<Option<ForecastRecord>> {
        Ok(self
            .forecasts
            .read()
            .await
            .iter()
            .find(|f| f.id == id)
            .cloned())
    }

    #[instrument(skip(self), fields(item = %item))]
    async fn latest_forecast(&self, item: ItemId) -> Result<Option<ForecastRecord>> {
        Ok(self
            .forecasts
            .read()
            .await
            .iter()
            .rev()
            .find(|f| f.item_id == item && f.is_active)
            .cloned())
    }

    async fn active_forecasts(&self) -> Result<Vec<ForecastRecord>> {
        Ok(self
            .forecasts
            .read()
            .await
            .iter()
            .filter(|f| f.is_active)
            .cloned()
            .collect())
    }

    #[instrument(skip(self))]
    async fn set_forecast_active(&self, id: i64, active: bool) -> Result<()> {
        let mut forecasts = self.forecasts.write().await;
        let record = forecasts
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| ForecastError::NotFound(format!("forecast {id}")))?;
        record.is_active = active;
        Ok(())
    }

    #[instrument(skip(self, optimization), fields(forecast = optimization.forecast_id))]
    async fn create_optimization(
        &self,
        optimization: &NewOptimization,
    ) -> Result<OptimizationRecord> {
        let mut optimizations = self.optimizations.write().await;
        if optimizations
            .iter()
            .any(|o| o.forecast_id == optimization.forecast_id)
        {
            return Err(ForecastError::Storage(format!(
                "forecast {} already has an optimization",
                optimization.forecast_id
            )));
        }
        let id = optimizations.len() as i64 + 1;
        let record = OptimizationRecord::from_new(id, Utc::now(), optimization.clone());
        optimizations.push(record.clone());
        Ok(record)
    }

    #[instrument(skip(self), fields(item = %item))]
    async fn latest_optimization(&self, item: ItemId) -> Result<Option<OptimizationRecord>> {
        let Some(forecast) = self.latest_forecast(item).await? else {
            return Ok(None);
        };
        Ok(self
            .optimizations
            .read()
            .await
            .iter()
            .find(|o| o.forecast_id == forecast.id)
            .cloned())
    }

    #[instrument(skip(self, point), fields(item = %point.item_id, period = %point.period))]
    async fn upsert_trend(&self, point: &TrendPoint) -> Result<TrendRecord> {
        let key = TrendKey {
            item: point.item_id,
            period: point.period,
            period_date: point.period_date,
        };
        let mut trends = self.trends.write().await;
        let next_id = trends.len() as i64 + 1;
        let record = trends.entry(key).or_insert_with(|| TrendRecord {
            id: next_id,
            item_id: point.item_id,
            period: point.period,
            period_date: point.period_date,
            quantity_sold: 0.0,
            revenue: Decimal::ZERO,
            average_price: Decimal::ZERO,
            growth_rate: None,
            trend_direction: None,
        });
        record.quantity_sold = point.quantity_sold;
        record.revenue = point.revenue;
        record.average_price = point.average_price;
        Ok(record.clone())
    }

    async fn trends(&self, item: ItemId, period: PeriodType) -> Result<Vec<TrendRecord>> {
        let mut rows: Vec<TrendRecord> = self
            .trends
            .read()
            .await
            .values()
            .filter(|t| t.item_id == item && t.period == period)
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.period_date);
        Ok(rows)
    }

    async fn set_trend_indicators(
        &self,
        id: i64,
        growth_rate: Option<f64>,
        direction: Option<TrendDirection>,
    ) -> Result<()> {
        let mut trends = self.trends.write().await;
        let record = trends
            .values_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ForecastError::NotFound(format!("trend {id}")))?;
        record.growth_rate = growth_rate;
        record.trend_direction = direction;
        Ok(())
    }
}
