#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/demand/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Demand forecasting and inventory optimization.
//!
//! This crate re-exports the core types and storage backends and provides
//! [`DemandService`], which runs the per-item pipeline:
//!
//! 1. [`SalesDataAggregator`] turns order lines into a periodic series
//! 2. [`ForecastEngine`] selects an ARIMA order, fits it and forecasts
//! 3. [`InventoryOptimizer`] derives safety stock, reorder point and EOQ
//! 4. [`RetryingPersistence`] writes the results while the store is contended
//!
//! # Features
//!
//! - `store-sqlite` - SQLite-backed [`SqliteStore`] (enabled by default)

// Core types and traits
pub use demand_core::*;

// Storage backends
#[cfg(feature = "store-sqlite")]
pub use demand_store::SqliteStore;
pub use demand_store::{CatalogItem, InMemoryStore};

// Order selection
pub use demand_model::{Correlogram, ModelSelector, OrderSelection, StepwiseSelector};

/// Raw order lines to periodic series.
pub mod aggregator;
/// Reorder alerts for low-stock items.
pub mod alerts;
/// Batch forecasting and best-candidate search.
pub mod bulk;
/// Model fitting and forecasting.
pub mod engine;
/// Inventory level optimization.
pub mod optimizer;
/// Per-item pipeline.
pub mod pipeline;
/// Retry of contended writes.
pub mod retry;
/// Service facade.
pub mod service;
/// Accuracy summary over stored forecasts.
pub mod summary;
/// Sales trend maintenance.
pub mod trends;

pub use aggregator::SalesDataAggregator;
pub use alerts::{AlertPriority, ReorderAlert};
pub use bulk::{BatchOutcome, BulkOrchestrator, ForecastCandidate, ScoredCandidate, SkipReason};
pub use engine::ForecastEngine;
pub use optimizer::InventoryOptimizer;
pub use pipeline::{ForecastOutcome, ForecastPipeline};
pub use retry::RetryingPersistence;
pub use service::{DemandService, ExtendedForecast};
pub use summary::{PerformanceSummary, PeriodPerformance};
pub use trends::TrendAnalyzer;
