//! SQLite-based store implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use demand_core::{
    ArimaOrder, CategoryClass, ConfidenceIntervals, DateRange, ForecastError, ForecastMetrics,
    ForecastRecord, ForecastStore, ItemId, LineItem, NewForecast, NewOptimization,
    OptimizationRecord, OrderStatus, PeriodType, Result, SalesSource, StatusFilter, StockLevel,
    TrainingWindow, TrendDirection, TrendPoint, TrendRecord,
};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::CatalogItem;

const FORECAST_COLUMNS: &str = "id, item_id, period_type, horizon, p, d, q, aic, bic, rmse, mae, \
     mape, forecasted_values, lower_bounds, upper_bounds, training_start, training_end, \
     point_count, created_at, is_active";

const OPTIMIZATION_COLUMNS: &str = "id, forecast_id, item_id, service_level, lead_time_days, \
     holding_cost_percentage, safety_stock, reorder_point, optimal_order_quantity, \
     optimal_maximum_stock, expected_holding_cost, expected_stockout_cost, total_expected_cost, \
     calculated_at";

const TREND_COLUMNS: &str = "id, item_id, period_type, period_date, quantity_sold, revenue, \
     average_price, growth_rate, trend_direction";

/// Maps a rusqlite error, classifying lock contention as transient.
fn storage_error(e: rusqlite::Error) -> ForecastError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            ForecastError::StoreBusy(e.to_string())
        }
        _ => ForecastError::Storage(e.to_string()),
    }
}

fn parse_error(e: impl std::fmt::Display) -> ForecastError {
    ForecastError::Parse(e.to_string())
}

fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(parse_error)
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    s.parse::<NaiveDate>().map_err(parse_error)
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s).map_err(parse_error)
}

fn to_json(values: &[f64]) -> Result<String> {
    serde_json::to_string(values).map_err(parse_error)
}

fn from_json(s: &str) -> Result<Vec<f64>> {
    serde_json::from_str(s).map_err(parse_error)
}

/// SQLite stores NaN as NULL.
fn real(value: Option<f64>) -> f64 {
    value.unwrap_or(f64::NAN)
}

/// Raw forecast row before text columns are parsed.
struct ForecastRow {
    id: i64,
    item_id: i64,
    period: String,
    horizon: u32,
    order: (usize, usize, usize),
    metrics: [Option<f64>; 5],
    values: String,
    lower: String,
    upper: String,
    training_start: String,
    training_end: String,
    point_count: usize,
    created_at: String,
    is_active: bool,
}

impl ForecastRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            item_id: row.get(1)?,
            period: row.get(2)?,
            horizon: row.get(3)?,
            order: (row.get(4)?, row.get(5)?, row.get(6)?),
            metrics: [
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
                row.get(11)?,
            ],
            values: row.get(12)?,
            lower: row.get(13)?,
            upper: row.get(14)?,
            training_start: row.get(15)?,
            training_end: row.get(16)?,
            point_count: row.get(17)?,
            created_at: row.get(18)?,
            is_active: row.get(19)?,
        })
    }

    fn into_record(self) -> Result<ForecastRecord> {
        let [aic, bic, rmse, mae, mape] = self.metrics.map(real);
        Ok(ForecastRecord {
            id: self.id,
            item_id: ItemId(self.item_id),
            period: self.period.parse()?,
            horizon: self.horizon,
            order: ArimaOrder::new(self.order.0, self.order.1, self.order.2),
            metrics: ForecastMetrics {
                aic,
                bic,
                rmse,
                mae,
                mape,
            },
            forecasted_values: from_json(&self.values)?,
            confidence_intervals: ConfidenceIntervals {
                lower: from_json(&self.lower)?,
                upper: from_json(&self.upper)?,
            },
            training: TrainingWindow {
                start_date: parse_date(&self.training_start)?,
                end_date: parse_date(&self.training_end)?,
                point_count: self.point_count,
            },
            created_at: parse_timestamp(&self.created_at)?,
            is_active: self.is_active,
        })
    }
}

/// Raw optimization row before text columns are parsed.
struct OptimizationRow {
    id: i64,
    forecast_id: i64,
    item_id: i64,
    service_level: f64,
    lead_time_days: u32,
    holding_cost_percentage: f64,
    levels: [u64; 4],
    costs: [String; 3],
    calculated_at: String,
}

impl OptimizationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            forecast_id: row.get(1)?,
            item_id: row.get(2)?,
            service_level: row.get(3)?,
            lead_time_days: row.get(4)?,
            holding_cost_percentage: row.get(5)?,
            levels: [row.get(6)?, row.get(7)?, row.get(8)?, row.get(9)?],
            costs: [row.get(10)?, row.get(11)?, row.get(12)?],
            calculated_at: row.get(13)?,
        })
    }

    fn into_record(self) -> Result<OptimizationRecord> {
        let [safety_stock, reorder_point, optimal_order_quantity, optimal_maximum_stock] =
            self.levels;
        let [holding, stockout, total] = &self.costs;
        Ok(OptimizationRecord {
            id: self.id,
            forecast_id: self.forecast_id,
            item_id: ItemId(self.item_id),
            service_level: self.service_level,
            lead_time_days: self.lead_time_days,
            holding_cost_percentage: self.holding_cost_percentage,
            safety_stock,
            reorder_point,
            optimal_order_quantity,
            optimal_maximum_stock,
            expected_holding_cost: parse_decimal(holding)?,
            expected_stockout_cost: parse_decimal(stockout)?,
            total_expected_cost: parse_decimal(total)?,
            calculated_at: parse_timestamp(&self.calculated_at)?,
        })
    }
}

/// Raw trend row before text columns are parsed.
struct TrendRow {
    id: i64,
    item_id: i64,
    period: String,
    period_date: String,
    quantity_sold: Option<f64>,
    revenue: String,
    average_price: String,
    growth_rate: Option<f64>,
    trend_direction: Option<String>,
}

impl TrendRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            item_id: row.get(1)?,
            period: row.get(2)?,
            period_date: row.get(3)?,
            quantity_sold: row.get(4)?,
            revenue: row.get(5)?,
            average_price: row.get(6)?,
            growth_rate: row.get(7)?,
            trend_direction: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<TrendRecord> {
        Ok(TrendRecord {
            id: self.id,
            item_id: ItemId(self.item_id),
            period: self.period.parse()?,
            period_date: parse_date(&self.period_date)?,
            quantity_sold: real(self.quantity_sold),
            revenue: parse_decimal(&self.revenue)?,
            average_price: parse_decimal(&self.average_price)?,
            growth_rate: self.growth_rate,
            trend_direction: self
                .trend_direction
                .as_deref()
                .map(TrendDirection::from_str)
                .transpose()?,
        })
    }
}

/// SQLite-backed store for the sales feed and forecast outputs.
///
/// This store keeps everything in a single SQLite database file. Every write
/// runs in its own transaction; when another connection holds the database
/// lock the write fails with the retryable [`ForecastError::StoreBusy`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a new SQLite store at the given path.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(storage_error)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite store.
    ///
    /// Useful for testing; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_error)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Sets how long SQLite waits on a locked database before reporting busy.
    ///
    /// # Errors
    /// Returns an error if the timeout cannot be applied.
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.lock()?.busy_timeout(timeout).map_err(storage_error)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ForecastError::Storage(e.to_string()))
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY,
                unit_price TEXT NOT NULL,
                category TEXT NOT NULL,
                current_stock INTEGER NOT NULL DEFAULT 0,
                reorder_point INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS sale_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id INTEGER NOT NULL,
                occurred_at TEXT NOT NULL,
                quantity REAL,
                unit_price TEXT NOT NULL,
                status TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sale_events_item_time
            ON sale_events(item_id, occurred_at);

            CREATE TABLE IF NOT EXISTS forecasts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id INTEGER NOT NULL,
                period_type TEXT NOT NULL,
                horizon INTEGER NOT NULL,
                p INTEGER NOT NULL,
                d INTEGER NOT NULL,
                q INTEGER NOT NULL,
                aic REAL,
                bic REAL,
                rmse REAL,
                mae REAL,
                mape REAL,
                forecasted_values TEXT NOT NULL,
                lower_bounds TEXT NOT NULL,
                upper_bounds TEXT NOT NULL,
                training_start TEXT NOT NULL,
                training_end TEXT NOT NULL,
                point_count INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_forecasts_item_active
            ON forecasts(item_id, is_active);

            CREATE TABLE IF NOT EXISTS optimizations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                forecast_id INTEGER NOT NULL UNIQUE REFERENCES forecasts(id),
                item_id INTEGER NOT NULL,
                service_level REAL NOT NULL,
                lead_time_days INTEGER NOT NULL,
                holding_cost_percentage REAL NOT NULL,
                safety_stock INTEGER NOT NULL,
                reorder_point INTEGER NOT NULL,
                optimal_order_quantity INTEGER NOT NULL,
                optimal_maximum_stock INTEGER NOT NULL,
                expected_holding_cost TEXT NOT NULL,
                expected_stockout_cost TEXT NOT NULL,
                total_expected_cost TEXT NOT NULL,
                calculated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sales_trends (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id INTEGER NOT NULL,
                period_type TEXT NOT NULL,
                period_date TEXT NOT NULL,
                quantity_sold REAL,
                revenue TEXT NOT NULL,
                average_price TEXT NOT NULL,
                growth_rate REAL,
                trend_direction TEXT,
                UNIQUE (item_id, period_type, period_date)
            );",
        )
        .map_err(storage_error)?;

        debug!("SQLite store schema initialized");
        Ok(())
    }

    /// Inserts or replaces a catalogue item.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn add_item(&self, item: &CatalogItem) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO items
             (id, unit_price, category, current_stock, reorder_point, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.id.get(),
                item.unit_price.to_string(),
                item.category.as_str(),
                item.current_stock,
                item.reorder_point,
                item.is_active
            ],
        )
        .map_err(storage_error)?;
        Ok(())
    }

    /// Appends order lines to the sales feed in one transaction.
    ///
    /// # Errors
    /// Returns an error if any insert fails; nothing is written in that case.
    pub fn record_sales(&self, lines: &[LineItem]) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(storage_error)?;
        for line in lines {
            tx.execute(
                "INSERT INTO sale_events (item_id, occurred_at, quantity, unit_price, status)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    line.item_id.get(),
                    timestamp(line.occurred_at),
                    line.quantity,
                    line.unit_price.to_string(),
                    line.status.as_str()
                ],
            )
            .map_err(storage_error)?;
        }
        tx.commit().map_err(storage_error)?;
        debug!("Recorded {} order lines", lines.len());
        Ok(())
    }

    fn item_column(&self, item: ItemId, column: &str) -> Result<String> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {column} FROM items WHERE id = ?1"),
            params![item.get()],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(storage_error)?
        .ok_or_else(|| ForecastError::NotFound(format!("item {item}")))
    }

    fn load_forecast_where(
        conn: &Connection,
        clause: &str,
        param: i64,
    ) -> Result<Option<ForecastRecord>> {
        conn.query_row(
            &format!("SELECT {FORECAST_COLUMNS} FROM forecasts WHERE {clause}"),
            params![param],
            ForecastRow::from_row,
        )
        .optional()
        .map_err(storage_error)?
        .map(ForecastRow::into_record)
        .transpose()
    }
}

#[async_trait]
impl SalesSource for SqliteStore {
    #[instrument(skip(self), fields(item = %item))]
    async fn line_items(
        &self,
        item: ItemId,
        status: StatusFilter,
        range: Option<DateRange>,
    ) -> Result<Vec<LineItem>> {
        let (start, end) = match range {
            Some(r) => (timestamp(r.start), timestamp(r.end)),
            None => (String::new(), "~".to_string()),
        };

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT occurred_at, quantity, unit_price, status
                 FROM sale_events
                 WHERE item_id = ?1 AND occurred_at >= ?2 AND occurred_at <= ?3
                 ORDER BY occurred_at ASC, id ASC",
            )
            .map_err(storage_error)?;

        let rows = stmt
            .query_map(params![item.get(), start, end], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(storage_error)?;

        let mut lines = Vec::new();
        for row in rows {
            let (occurred_at, quantity, unit_price, order_status) = row.map_err(storage_error)?;
            let order_status: OrderStatus = order_status.parse()?;
            if !status.accepts(order_status) {
                continue;
            }
            lines.push(LineItem {
                item_id: item,
                occurred_at: parse_timestamp(&occurred_at)?,
                quantity: real(quantity),
                unit_price: parse_decimal(&unit_price)?,
                status: order_status,
            });
        }

        debug!("Found {} order lines", lines.len());
        Ok(lines)
    }

    async fn unit_price(&self, item: ItemId) -> Result<Decimal> {
        parse_decimal(&self.item_column(item, "unit_price")?)
    }

    async fn category_class(&self, item: ItemId) -> Result<CategoryClass> {
        self.item_column(item, "category")?.parse()
    }

    async fn active_items(&self) -> Result<Vec<ItemId>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id FROM items WHERE is_active = 1 ORDER BY id ASC")
            .map_err(storage_error)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .map_err(storage_error)?
            .map(|id| id.map(ItemId).map_err(storage_error))
            .collect::<Result<Vec<_>>>()?;
        Ok(ids)
    }

    async fn stock_levels(&self) -> Result<Vec<StockLevel>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, current_stock, reorder_point FROM items
                 WHERE is_active = 1 ORDER BY id ASC",
            )
            .map_err(storage_error)?;
        let levels = stmt
            .query_map([], |row| {
                Ok(StockLevel {
                    item_id: ItemId(row.get(0)?),
                    current_stock: row.get(1)?,
                    reorder_point: row.get(2)?,
                })
            })
            .map_err(storage_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_error)?;
        Ok(levels)
    }
}

#[async_trait]
impl ForecastStore for SqliteStore {
    #[instrument(skip(self, forecast), fields(item = %forecast.item_id))]
    async fn create_forecast(&self, forecast: &NewForecast) -> Result<ForecastRecord> {
        let created_at = Utc::now();
        let values = to_json(&forecast.forecasted_values)?;
        let lower = to_json(&forecast.confidence_intervals.lower)?;
        let upper = to_json(&forecast.confidence_intervals.upper)?;

        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(storage_error)?;
        tx.execute(
            "INSERT INTO forecasts
             (item_id, period_type, horizon, p, d, q, aic, bic, rmse, mae, mape,
              forecasted_values, lower_bounds, upper_bounds, training_start, training_end,
              point_count, created_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, 1)",
            params![
                forecast.item_id.get(),
                forecast.period.as_str(),
                forecast.horizon,
                forecast.order.p,
                forecast.order.d,
                forecast.order.q,
                forecast.metrics.aic,
                forecast.metrics.bic,
                forecast.metrics.rmse,
                forecast.metrics.mae,
                forecast.metrics.mape,
                values,
                lower,
                upper,
                forecast.training.start_date.to_string(),
                forecast.training.end_date.to_string(),
                forecast.training.point_count,
                timestamp(created_at),
            ],
        )
        .map_err(storage_error)?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(storage_error)?;

        debug!(id, "Stored forecast");
        // Match the stored timestamp precision
        let created_at = parse_timestamp(&timestamp(created_at))?;
        Ok(ForecastRecord::from_new(id, created_at, forecast.clone()))
    }

    async fn load_forecast(&self, id: i64) -> Result<Option<ForecastRecord>> {
        let conn = self.lock()?;
        Self::load_forecast_where(&conn, "id = ?1", id)
    }

    #[instrument(skip(self), fields(item = %item))]
    async fn latest_forecast(&self, item: ItemId) -> Result<Option<ForecastRecord>> {
        let conn = self.lock()?;
        Self::load_forecast_where(
            &conn,
            "item_id = ?1 AND is_active = 1 ORDER BY id DESC LIMIT 1",
            item.get(),
        )
    }

    #[instrument(skip(self))]
    async fn active_forecasts(&self) -> Result<Vec<ForecastRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {FORECAST_COLUMNS} FROM forecasts WHERE is_active = 1 ORDER BY id"
            ))
            .map_err(storage_error)?;
        let rows = stmt
            .query_map([], ForecastRow::from_row)
            .map_err(storage_error)?;

        let mut forecasts = Vec::new();
        for row in rows {
            forecasts.push(row.map_err(storage_error)?.into_record()?);
        }
        Ok(forecasts)
    }

    #[instrument(skip(self))]
    async fn set_forecast_active(&self, id: i64, active: bool) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(storage_error)?;
        let changed = tx
            .execute(
                "UPDATE forecasts SET is_active = ?1 WHERE id = ?2",
                params![active, id],
            )
            .map_err(storage_error)?;
        if changed == 0 {
            return Err(ForecastError::NotFound(format!("forecast {id}")));
        }
        tx.commit().map_err(storage_error)
    }

    #[instrument(skip(self, optimization), fields(forecast = optimization.forecast_id))]
    async fn create_optimization(
        &self,
        optimization: &NewOptimization,
    ) -> Result<OptimizationRecord> {
        let calculated_at = Utc::now();
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(storage_error)?;
        tx.execute(
            "INSERT INTO optimizations
             (forecast_id, item_id, service_level, lead_time_days, holding_cost_percentage,
              safety_stock, reorder_point, optimal_order_quantity, optimal_maximum_stock,
              expected_holding_cost, expected_stockout_cost, total_expected_cost, calculated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                optimization.forecast_id,
                optimization.item_id.get(),
                optimization.service_level,
                optimization.lead_time_days,
                optimization.holding_cost_percentage,
                optimization.safety_stock,
                optimization.reorder_point,
                optimization.optimal_order_quantity,
                optimization.optimal_maximum_stock,
                optimization.expected_holding_cost.to_string(),
                optimization.expected_stockout_cost.to_string(),
                optimization.total_expected_cost.to_string(),
                timestamp(calculated_at),
            ],
        )
        .map_err(storage_error)?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(storage_error)?;

        let calculated_at = parse_timestamp(&timestamp(calculated_at))?;
        Ok(OptimizationRecord::from_new(
            id,
            calculated_at,
            optimization.clone(),
        ))
    }

    #[instrument(skip(self), fields(item = %item))]
    async fn latest_optimization(&self, item: ItemId) -> Result<Option<OptimizationRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {OPTIMIZATION_COLUMNS} FROM optimizations
                 WHERE forecast_id = (
                     SELECT id FROM forecasts
                     WHERE item_id = ?1 AND is_active = 1
                     ORDER BY id DESC LIMIT 1
                 )"
            ),
            params![item.get()],
            OptimizationRow::from_row,
        )
        .optional()
        .map_err(storage_error)?
        .map(OptimizationRow::into_record)
        .transpose()
    }

    #[instrument(skip(self, point), fields(item = %point.item_id, period = %point.period))]
    async fn upsert_trend(&self, point: &TrendPoint) -> Result<TrendRecord> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(storage_error)?;
        tx.execute(
            "INSERT INTO sales_trends
             (item_id, period_type, period_date, quantity_sold, revenue, average_price)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (item_id, period_type, period_date) DO UPDATE SET
                 quantity_sold = excluded.quantity_sold,
                 revenue = excluded.revenue,
                 average_price = excluded.average_price",
            params![
                point.item_id.get(),
                point.period.as_str(),
                point.period_date.to_string(),
                point.quantity_sold,
                point.revenue.to_string(),
                point.average_price.to_string(),
            ],
        )
        .map_err(storage_error)?;
        let row = tx
            .query_row(
                &format!(
                    "SELECT {TREND_COLUMNS} FROM sales_trends
                     WHERE item_id = ?1 AND period_type = ?2 AND period_date = ?3"
                ),
                params![
                    point.item_id.get(),
                    point.period.as_str(),
                    point.period_date.to_string()
                ],
                TrendRow::from_row,
            )
            .map_err(storage_error)?;
        tx.commit().map_err(storage_error)?;
        row.into_record()
    }

    async fn trends(&self, item: ItemId, period: PeriodType) -> Result<Vec<TrendRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TREND_COLUMNS} FROM sales_trends
                 WHERE item_id = ?1 AND period_type = ?2
                 ORDER BY period_date ASC"
            ))
            .map_err(storage_error)?;
        let rows = stmt
            .query_map(params![item.get(), period.as_str()], TrendRow::from_row)
            .map_err(storage_error)?;

        let mut trends = Vec::new();
        for row in rows {
            trends.push(row.map_err(storage_error)?.into_record()?);
        }
        Ok(trends)
    }

    async fn set_trend_indicators(
        &self,
        id: i64,
        growth_rate: Option<f64>,
        direction: Option<TrendDirection>,
    ) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(storage_error)?;
        let changed = tx
            .execute(
                "UPDATE sales_trends SET growth_rate = ?1, trend_direction = ?2 WHERE id = ?3",
                params![growth_rate, direction.map(|d| d.as_str()), id],
            )
            .map_err(storage_error)?;
        if changed == 0 {
            return Err(ForecastError::NotFound(format!("trend {id}")));
        }
        tx.commit().map_err(storage_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn draft() -> NewForecast {
        NewForecast {
            item_id: ItemId(42),
            period: PeriodType::Weekly,
            horizon: 3,
            order: ArimaOrder::new(2, 1, 1),
            metrics: ForecastMetrics {
                aic: 123.456,
                bic: 130.25,
                rmse: 1.5,
                mae: 1.25,
                mape: f64::INFINITY,
            },
            forecasted_values: vec![10.5, 11.0, 11.25],
            confidence_intervals: ConfidenceIntervals {
                lower: vec![8.0, 7.5, 7.0],
                upper: vec![13.0, 14.5, 15.5],
            },
            training: TrainingWindow {
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 6, 24).unwrap(),
                point_count: 26,
            },
        }
    }

    #[tokio::test]
    async fn test_sqlite_store_initialization() {
        let store = SqliteStore::in_memory();
        assert!(store.is_ok());
    }

    #[tokio::test]
    async fn test_forecast_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let created = store.create_forecast(&draft()).await.unwrap();
        let loaded = store.load_forecast(created.id).await.unwrap().unwrap();

        assert_eq!(loaded, created);
        assert_eq!(loaded.order, ArimaOrder::new(2, 1, 1));
        assert_eq!(loaded.forecasted_values, vec![10.5, 11.0, 11.25]);
        assert!(loaded.metrics.mape.is_infinite());
        assert!(store.load_forecast(created.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deactivated_forecast_hidden_from_latest() {
        let store = SqliteStore::in_memory().unwrap();
        let forecast = store.create_forecast(&draft()).await.unwrap();
        store.set_forecast_active(forecast.id, false).await.unwrap();

        assert!(store.latest_forecast(ItemId(42)).await.unwrap().is_none());
        assert!(store.active_forecasts().await.unwrap().is_empty());
        let kept = store.create_forecast(&draft()).await.unwrap();
        let active = store.active_forecasts().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, kept.id);
        let loaded = store.load_forecast(forecast.id).await.unwrap().unwrap();
        assert!(!loaded.is_active);
        assert!(matches!(
            store.set_forecast_active(1000, true).await,
            Err(ForecastError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_optimization_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let forecast = store.create_forecast(&draft()).await.unwrap();
        let optimization = NewOptimization {
            forecast_id: forecast.id,
            item_id: ItemId(42),
            service_level: 95.0,
            lead_time_days: 7,
            holding_cost_percentage: 20.0,
            safety_stock: 3,
            reorder_point: 14,
            optimal_order_quantity: 40,
            optimal_maximum_stock: 54,
            expected_holding_cost: Decimal::new(4000, 2),
            expected_stockout_cost: Decimal::new(287, 2),
            total_expected_cost: Decimal::new(4287, 2),
        };
        let created = store.create_optimization(&optimization).await.unwrap();
        let latest = store.latest_optimization(ItemId(42)).await.unwrap().unwrap();
        assert_eq!(latest, created);
        assert_eq!(latest.total_expected_cost, Decimal::new(4287, 2));

        // One optimization per forecast
        assert!(store.create_optimization(&optimization).await.is_err());
    }

    #[tokio::test]
    async fn test_trend_upsert_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let mut point = TrendPoint {
            item_id: ItemId(1),
            period: PeriodType::Monthly,
            period_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            quantity_sold: 20.0,
            revenue: Decimal::new(20000, 2),
            average_price: Decimal::new(1000, 2),
        };
        let first = store.upsert_trend(&point).await.unwrap();
        store
            .set_trend_indicators(first.id, Some(-7.5), Some(TrendDirection::Down))
            .await
            .unwrap();

        point.quantity_sold = 25.0;
        point.revenue = Decimal::new(25000, 2);
        let second = store.upsert_trend(&point).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.quantity_sold, 25.0);
        assert_eq!(second.trend_direction, Some(TrendDirection::Down));
        assert_eq!(
            store
                .trends(ItemId(1), PeriodType::Monthly)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_sales_feed_queries() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .add_item(
                &CatalogItem::new(ItemId(5), Decimal::new(1299, 2), CategoryClass::Controlled)
                    .with_stock(4, 12),
            )
            .unwrap();
        store
            .add_item(&CatalogItem::new(ItemId(6), Decimal::ONE, CategoryClass::General).inactive())
            .unwrap();

        let at = |day| Utc.with_ymd_and_hms(2024, 2, day, 9, 30, 0).unwrap();
        store
            .record_sales(&[
                LineItem {
                    item_id: ItemId(5),
                    occurred_at: at(3),
                    quantity: f64::NAN,
                    unit_price: Decimal::new(1299, 2),
                    status: OrderStatus::Delivered,
                },
                LineItem {
                    item_id: ItemId(5),
                    occurred_at: at(1),
                    quantity: 2.0,
                    unit_price: Decimal::new(1299, 2),
                    status: OrderStatus::Confirmed,
                },
                LineItem {
                    item_id: ItemId(5),
                    occurred_at: at(2),
                    quantity: 1.0,
                    unit_price: Decimal::new(1299, 2),
                    status: OrderStatus::Cancelled,
                },
            ])
            .unwrap();

        let lines = store
            .line_items(ItemId(5), StatusFilter::Fulfilled, None)
            .await
            .unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].occurred_at, at(1));
        assert!(lines[1].quantity.is_nan());

        let ranged = store
            .line_items(
                ItemId(5),
                StatusFilter::Any,
                Some(DateRange::new(at(2), at(2))),
            )
            .await
            .unwrap();
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].status, OrderStatus::Cancelled);

        assert_eq!(
            store.unit_price(ItemId(5)).await.unwrap(),
            Decimal::new(1299, 2)
        );
        assert_eq!(
            store.category_class(ItemId(5)).await.unwrap(),
            CategoryClass::Controlled
        );
        assert!(matches!(
            store.unit_price(ItemId(7)).await,
            Err(ForecastError::NotFound(_))
        ));
        assert_eq!(store.active_items().await.unwrap(), vec![ItemId(5)]);
        assert_eq!(store.stock_levels().await.unwrap()[0].reorder_point, 12);
    }

    #[tokio::test]
    async fn test_locked_database_reports_busy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demand.db");
        let store = SqliteStore::new(&path).unwrap();
        store.set_busy_timeout(Duration::ZERO).unwrap();

        let other = Connection::open(&path).unwrap();
        other.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let err = store.create_forecast(&draft()).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");

        other.execute_batch("ROLLBACK").unwrap();
        assert!(store.create_forecast(&draft()).await.is_ok());
    }
}
