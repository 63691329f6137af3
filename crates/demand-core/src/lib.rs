#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/demand/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for demand forecasting.
//!
//! This crate provides the foundational abstractions shared by the model,
//! storage and orchestration crates:
//!
//! - [`SalesSource`](source::SalesSource) - Read-only feed of order line items and item lookups
//! - [`ForecastStore`](store::ForecastStore) - Persistence for forecasts, optimizations and trends
//! - [`EngineConfig`](config::EngineConfig) - Tunable constants for the whole pipeline

/// Engine configuration and tunable constants.
pub mod config;
/// Error types for forecasting operations.
pub mod error;
/// Period granularity and calendar bucketing.
pub mod period;
/// Upstream sales data trait.
pub mod source;
/// Persistence trait for forecast outputs.
pub mod store;
/// Core data types (ItemId, TimeSeriesPoint, ForecastRecord, etc.).
pub mod types;

// Re-export commonly used items at crate root
pub use config::{
    EngineConfig, MaxHorizon, MinDataPoints, OptimizerConfig, OrderingCostTable, RetryPolicy,
    ScoreWeights,
};
pub use error::{ForecastError, Result};
pub use period::PeriodType;
pub use source::SalesSource;
pub use store::ForecastStore;
pub use types::{
    ArimaOrder, CategoryClass, ConfidenceIntervals, DateRange, ForecastMetrics, ForecastRecord,
    ItemId, LineItem, NewForecast, NewOptimization, OptimizationRecord, OrderStatus, StatusFilter,
    StockLevel, TimeSeriesPoint, TrainingWindow, TrendDirection, TrendPoint, TrendRecord,
};
