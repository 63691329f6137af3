//! Reorder alerts for items at or below their reorder point.

use std::fmt;

use demand_core::{ForecastStore, ItemId, OptimizationRecord, Result, SalesSource, StockLevel};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

/// Urgency of a reorder alert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    /// Stock above the optimal reorder point.
    Low,
    /// Up to the optimal reorder point, or no optimization available.
    Medium,
    /// Up to 75% of the optimal reorder point.
    High,
    /// Up to half of the optimal reorder point.
    Urgent,
}

impl AlertPriority {
    /// Priority for `current_stock` against an optimal reorder point.
    #[must_use]
    pub fn from_stock_ratio(current_stock: i64, optimal_reorder_point: u64) -> Self {
        let ratio = current_stock as f64 / optimal_reorder_point.max(1) as f64;
        if ratio <= 0.5 {
            Self::Urgent
        } else if ratio <= 0.75 {
            Self::High
        } else if ratio <= 1.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Returns the lowercase label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A suggested replenishment for a low-stock item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderAlert {
    /// The item.
    pub item_id: ItemId,
    /// Units on hand.
    pub current_stock: i64,
    /// Reorder point configured on the item.
    pub reorder_point: i64,
    /// Suggested order size.
    pub suggested_quantity: u64,
    /// Urgency.
    pub priority: AlertPriority,
    /// True when the item is out of stock.
    pub is_critical: bool,
}

impl ReorderAlert {
    /// Builds an alert from a stock position and the latest optimization, if any.
    #[must_use]
    pub fn new(stock: &StockLevel, optimization: Option<&OptimizationRecord>) -> Self {
        let (suggested_quantity, priority) = match optimization {
            Some(opt) => (
                opt.optimal_order_quantity,
                AlertPriority::from_stock_ratio(stock.current_stock, opt.reorder_point),
            ),
            None => (
                u64::try_from(stock.reorder_point.max(0)).unwrap_or(0) * 2,
                AlertPriority::Medium,
            ),
        };
        Self {
            item_id: stock.item_id,
            current_stock: stock.current_stock,
            reorder_point: stock.reorder_point,
            suggested_quantity,
            priority,
            is_critical: stock.current_stock == 0,
        }
    }
}

/// Builds alerts for every active item whose stock is at or below its reorder point.
///
/// Items whose optimization lookup fails are logged and skipped.
///
/// # Errors
/// Returns an error only if the stock levels cannot be read.
#[instrument(skip(source, store))]
pub async fn reorder_alerts(
    source: &dyn SalesSource,
    store: &dyn ForecastStore,
) -> Result<Vec<ReorderAlert>> {
    let mut alerts = Vec::new();
    for stock in source.stock_levels().await? {
        if stock.current_stock > stock.reorder_point {
            continue;
        }
        match store.latest_optimization(stock.item_id).await {
            Ok(optimization) => alerts.push(ReorderAlert::new(&stock, optimization.as_ref())),
            Err(e) => warn!(item = %stock.item_id, error = %e, "Skipping reorder alert"),
        }
    }
    Ok(alerts)
}
