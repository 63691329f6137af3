#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/demand/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Storage backends for demand forecasting.
//!
//! This crate provides:
//! - [`InMemoryStore`] - Simple in-memory store for testing
//! - [`SqliteStore`] - Persistent SQLite-based store (requires `sqlite` feature)

use demand_core::{CategoryClass, ItemId, StockLevel};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

mod memory;
pub use memory::InMemoryStore;

#[cfg(feature = "sqlite")]
mod sqlite;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Catalogue entry for a stocked item, used to seed a store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Item identifier.
    pub id: ItemId,
    /// Current unit price.
    pub unit_price: Decimal,
    /// Category class driving the ordering cost.
    pub category: CategoryClass,
    /// Units on hand.
    pub current_stock: i64,
    /// Reorder point configured on the item.
    pub reorder_point: i64,
    /// Inactive items are skipped by `active_items` and `stock_levels`.
    pub is_active: bool,
}

impl CatalogItem {
    /// Creates an active item with no stock.
    #[must_use]
    pub const fn new(id: ItemId, unit_price: Decimal, category: CategoryClass) -> Self {
        Self {
            id,
            unit_price,
            category,
            current_stock: 0,
            reorder_point: 0,
            is_active: true,
        }
    }

    /// Sets the stock position.
    #[must_use]
    pub const fn with_stock(mut self, current_stock: i64, reorder_point: i64) -> Self {
        self.current_stock = current_stock;
        self.reorder_point = reorder_point;
        self
    }

    /// Marks the item inactive.
    #[must_use]
    pub const fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub(crate) const fn stock_level(&self) -> StockLevel {
        StockLevel {
            item_id: self.id,
            current_stock: self.current_stock,
            reorder_point: self.reorder_point,
        }
    }
}
