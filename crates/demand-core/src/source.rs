//! Upstream sales data trait.
//!
//! The order/inventory subsystem owns the raw data; the engine only reads it
//! through [`SalesSource`].

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt::Debug;

use crate::{
    error::Result,
    types::{CategoryClass, DateRange, ItemId, LineItem, StatusFilter, StockLevel},
};

/// Read-only feed of order line items and item lookups.
///
/// Reads are not transactional and may observe in-flight order writes.
#[async_trait]
pub trait SalesSource: Send + Sync + Debug {
    /// Returns line items for `item` ordered by `occurred_at` ascending.
    ///
    /// `range` of `None` means the whole history.
    async fn line_items(
        &self,
        item: ItemId,
        status: StatusFilter,
        range: Option<DateRange>,
    ) -> Result<Vec<LineItem>>;

    /// Returns the current unit price of `item`.
    async fn unit_price(&self, item: ItemId) -> Result<Decimal>;

    /// Returns the category class of `item`.
    async fn category_class(&self, item: ItemId) -> Result<CategoryClass>;

    /// Returns every active item, ordered by id.
    async fn active_items(&self) -> Result<Vec<ItemId>>;

    /// Returns the stock position of every active item, ordered by id.
    async fn stock_levels(&self) -> Result<Vec<StockLevel>>;
}
