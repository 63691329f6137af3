//! Core data types for demand forecasting.
//!
//! This module defines the fundamental data structures:
//!
//! - [`ItemId`] - Identifier of a stocked item
//! - [`LineItem`] - A raw order line read from the sales feed
//! - [`TimeSeriesPoint`] - One aggregated period of demand
//! - [`ForecastRecord`] - A persisted ARIMA forecast
//! - [`OptimizationRecord`] - Inventory levels derived from a forecast
//! - [`TrendRecord`] - Per-period sales trend with growth indicators

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ForecastError;
use crate::period::PeriodType;

/// Identifier of a stocked item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl ItemId {
    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ItemId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Lifecycle status of the order a line item belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Placed but not yet confirmed.
    Pending,
    /// Confirmed by the pharmacy.
    Confirmed,
    /// Being picked and packed.
    Processing,
    /// Handed to the carrier.
    Shipped,
    /// Received by the customer.
    Delivered,
    /// Cancelled before fulfilment.
    Cancelled,
}

impl OrderStatus {
    /// Returns the lowercase storage tag for this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true for statuses that represent real demand.
    #[must_use]
    pub const fn is_fulfilled(&self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::Processing | Self::Shipped | Self::Delivered
        )
    }
}

impl FromStr for OrderStatus {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ForecastError::Parse(format!("Invalid order status: {other}"))),
        }
    }
}

/// Which order statuses a line-item query accepts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StatusFilter {
    /// Confirmed, processing, shipped or delivered orders only.
    #[default]
    Fulfilled,
    /// Every status, including pending and cancelled.
    Any,
}

impl StatusFilter {
    /// Returns true if `status` passes this filter.
    #[must_use]
    pub const fn accepts(&self, status: OrderStatus) -> bool {
        match self {
            Self::Fulfilled => status.is_fulfilled(),
            Self::Any => true,
        }
    }
}

/// Inclusive timestamp range for line-item queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// Start of the range (inclusive).
    pub start: DateTime<Utc>,
    /// End of the range (inclusive).
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Creates a new range.
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Returns true if `ts` lies within the range.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// A raw order line read from the sales feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Item that was ordered.
    pub item_id: ItemId,
    /// When the parent order was created.
    pub occurred_at: DateTime<Utc>,
    /// Ordered quantity. May be non-finite or negative in dirty feeds.
    pub quantity: f64,
    /// Price per unit at order time.
    pub unit_price: Decimal,
    /// Status of the parent order.
    pub status: OrderStatus,
}

/// Coarse category class that drives the fixed ordering cost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryClass {
    /// Prescription-only and controlled substances.
    Controlled,
    /// Vitamins and supplements.
    Supplement,
    /// Emergency and critical-care items.
    Emergency,
    /// Everything else.
    #[default]
    General,
}

impl CategoryClass {
    /// Returns the lowercase storage tag for this class.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Controlled => "controlled",
            Self::Supplement => "supplement",
            Self::Emergency => "emergency",
            Self::General => "general",
        }
    }
}

impl FromStr for CategoryClass {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "controlled" => Ok(Self::Controlled),
            "supplement" => Ok(Self::Supplement),
            "emergency" => Ok(Self::Emergency),
            "general" => Ok(Self::General),
            other => Err(ForecastError::Parse(format!("Invalid category class: {other}"))),
        }
    }
}

/// Current stock position of an active item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    /// The item.
    pub item_id: ItemId,
    /// Units currently on hand.
    pub current_stock: i64,
    /// Reorder point configured on the item itself.
    pub reorder_point: i64,
}

/// One aggregated period of demand.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// First date of the period.
    pub period_start: NaiveDate,
    /// Total quantity sold in the period, never negative.
    pub quantity: f64,
}

impl TimeSeriesPoint {
    /// Creates a new point.
    #[must_use]
    pub const fn new(period_start: NaiveDate, quantity: f64) -> Self {
        Self {
            period_start,
            quantity,
        }
    }
}

/// Non-seasonal ARIMA order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArimaOrder {
    /// Autoregressive order.
    pub p: usize,
    /// Differencing order.
    pub d: usize,
    /// Moving average order.
    pub q: usize,
}

impl ArimaOrder {
    /// Order used when automatic selection fails.
    pub const FALLBACK: Self = Self::new(1, 1, 1);

    /// Creates a new order.
    #[must_use]
    pub const fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)
    }
}

/// Fit and accuracy metrics of a forecast model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// Akaike information criterion.
    pub aic: f64,
    /// Bayesian information criterion.
    pub bic: f64,
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Mean absolute percentage error.
    pub mape: f64,
}

/// Lower and upper forecast bounds, one entry per horizon step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceIntervals {
    /// Lower bounds.
    pub lower: Vec<f64>,
    /// Upper bounds.
    pub upper: Vec<f64>,
}

/// Span of history a model was trained on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingWindow {
    /// First period start in the training series.
    pub start_date: NaiveDate,
    /// Last period start in the training series.
    pub end_date: NaiveDate,
    /// Number of observed periods.
    pub point_count: usize,
}

/// A forecast ready to be persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewForecast {
    /// Forecasted item.
    pub item_id: ItemId,
    /// Period granularity.
    pub period: PeriodType,
    /// Number of periods predicted.
    pub horizon: u32,
    /// Fitted ARIMA order.
    pub order: ArimaOrder,
    /// Fit and accuracy metrics.
    pub metrics: ForecastMetrics,
    /// Point forecasts, `horizon` long.
    pub forecasted_values: Vec<f64>,
    /// Interval bounds, `horizon` long each.
    pub confidence_intervals: ConfidenceIntervals,
    /// Training span.
    pub training: TrainingWindow,
}

/// A persisted ARIMA forecast.
///
/// Immutable once created apart from the `is_active` soft-delete flag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    /// Store-assigned identifier.
    pub id: i64,
    /// Forecasted item.
    pub item_id: ItemId,
    /// Period granularity.
    pub period: PeriodType,
    /// Number of periods predicted.
    pub horizon: u32,
    /// Fitted ARIMA order.
    pub order: ArimaOrder,
    /// Fit and accuracy metrics.
    pub metrics: ForecastMetrics,
    /// Point forecasts.
    pub forecasted_values: Vec<f64>,
    /// Interval bounds.
    pub confidence_intervals: ConfidenceIntervals,
    /// Training span.
    pub training: TrainingWindow,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// False once the forecast has been retired.
    pub is_active: bool,
}

impl ForecastRecord {
    /// Builds a record from a persisted draft.
    #[must_use]
    pub fn from_new(id: i64, created_at: DateTime<Utc>, draft: NewForecast) -> Self {
        Self {
            id,
            item_id: draft.item_id,
            period: draft.period,
            horizon: draft.horizon,
            order: draft.order,
            metrics: draft.metrics,
            forecasted_values: draft.forecasted_values,
            confidence_intervals: draft.confidence_intervals,
            training: draft.training,
            created_at,
            is_active: true,
        }
    }

    /// Qualitative label derived from MAPE.
    #[must_use]
    pub fn model_quality(&self) -> &'static str {
        match self.metrics.mape {
            m if m < 10.0 => "Excellent",
            m if m < 20.0 => "Good",
            m if m < 30.0 => "Fair",
            _ => "Poor",
        }
    }

    /// Start dates of the forecasted periods, following the training window.
    #[must_use]
    pub fn forecast_period_starts(&self) -> Vec<NaiveDate> {
        (1..=self.horizon)
            .filter_map(|step| self.period.advance(self.training.end_date, step))
            .collect()
    }
}

/// Inventory levels ready to be persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewOptimization {
    /// Forecast the levels were derived from.
    pub forecast_id: i64,
    /// Optimized item.
    pub item_id: ItemId,
    /// Target service level in percent.
    pub service_level: f64,
    /// Replenishment lead time in days.
    pub lead_time_days: u32,
    /// Annual holding cost as a percentage of unit price.
    pub holding_cost_percentage: f64,
    /// Buffer stock.
    pub safety_stock: u64,
    /// Stock level that triggers a reorder.
    pub reorder_point: u64,
    /// Economic order quantity.
    pub optimal_order_quantity: u64,
    /// Reorder point plus order quantity.
    pub optimal_maximum_stock: u64,
    /// Expected holding cost.
    pub expected_holding_cost: Decimal,
    /// Expected stockout cost.
    pub expected_stockout_cost: Decimal,
    /// Sum of both cost terms.
    pub total_expected_cost: Decimal,
}

/// Persisted inventory levels, one per forecast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRecord {
    /// Store-assigned identifier.
    pub id: i64,
    /// Forecast the levels were derived from.
    pub forecast_id: i64,
    /// Optimized item.
    pub item_id: ItemId,
    /// Target service level in percent.
    pub service_level: f64,
    /// Replenishment lead time in days.
    pub lead_time_days: u32,
    /// Annual holding cost as a percentage of unit price.
    pub holding_cost_percentage: f64,
    /// Buffer stock.
    pub safety_stock: u64,
    /// Stock level that triggers a reorder.
    pub reorder_point: u64,
    /// Economic order quantity.
    pub optimal_order_quantity: u64,
    /// Reorder point plus order quantity.
    pub optimal_maximum_stock: u64,
    /// Expected holding cost.
    pub expected_holding_cost: Decimal,
    /// Expected stockout cost.
    pub expected_stockout_cost: Decimal,
    /// Sum of both cost terms.
    pub total_expected_cost: Decimal,
    /// Calculation time.
    pub calculated_at: DateTime<Utc>,
}

impl OptimizationRecord {
    /// Builds a record from a persisted draft.
    #[must_use]
    pub fn from_new(id: i64, calculated_at: DateTime<Utc>, draft: NewOptimization) -> Self {
        Self {
            id,
            forecast_id: draft.forecast_id,
            item_id: draft.item_id,
            service_level: draft.service_level,
            lead_time_days: draft.lead_time_days,
            holding_cost_percentage: draft.holding_cost_percentage,
            safety_stock: draft.safety_stock,
            reorder_point: draft.reorder_point,
            optimal_order_quantity: draft.optimal_order_quantity,
            optimal_maximum_stock: draft.optimal_maximum_stock,
            expected_holding_cost: draft.expected_holding_cost,
            expected_stockout_cost: draft.expected_stockout_cost,
            total_expected_cost: draft.total_expected_cost,
            calculated_at,
        }
    }
}

/// Direction of a period-over-period sales change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    /// Growth above +5%.
    Up,
    /// Decline below -5%.
    Down,
    /// Within ±5%.
    Stable,
}

impl TrendDirection {
    /// Classifies a growth rate given in percent.
    #[must_use]
    pub fn from_growth_rate(rate: f64) -> Self {
        if rate > 5.0 {
            Self::Up
        } else if rate < -5.0 {
            Self::Down
        } else {
            Self::Stable
        }
    }

    /// Returns the lowercase storage tag for this direction.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Stable => "stable",
        }
    }
}

impl FromStr for TrendDirection {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "stable" => Ok(Self::Stable),
            other => Err(ForecastError::Parse(format!("Invalid trend direction: {other}"))),
        }
    }
}

/// Sales figures for one period, keyed by (item, period, period_date).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// The item.
    pub item_id: ItemId,
    /// Period granularity.
    pub period: PeriodType,
    /// First date of the period.
    pub period_date: NaiveDate,
    /// Units sold.
    pub quantity_sold: f64,
    /// Units sold times unit price.
    pub revenue: Decimal,
    /// Average selling price.
    pub average_price: Decimal,
}

/// Persisted sales trend row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendRecord {
    /// Store-assigned identifier.
    pub id: i64,
    /// The item.
    pub item_id: ItemId,
    /// Period granularity.
    pub period: PeriodType,
    /// First date of the period.
    pub period_date: NaiveDate,
    /// Units sold.
    pub quantity_sold: f64,
    /// Units sold times unit price.
    pub revenue: Decimal,
    /// Average selling price.
    pub average_price: Decimal,
    /// Percentage change against the previous period.
    pub growth_rate: Option<f64>,
    /// Direction of the change.
    pub trend_direction: Option<TrendDirection>,
}
