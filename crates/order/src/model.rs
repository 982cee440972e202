//! Order entities and the read models derived from them.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::OrderError;
use crate::status::OrderStatus;

/// A product record as returned by the product authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: i64,
}

/// One `(product, quantity)` pair of a stock reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl StockLine {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }

    /// Delta that takes this line out of stock.
    pub fn reserve_delta(&self) -> i64 {
        -i64::from(self.quantity)
    }

    /// Delta that puts this line back into stock.
    pub fn release_delta(&self) -> i64 {
        i64::from(self.quantity)
    }
}

/// A line of an order, with price and name snapshotted at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    id: i64,
    product_id: ProductId,
    product_name: String,
    unit_price: Money,
    quantity: u32,
}

impl OrderItem {
    /// Snapshots the product's current name and price.
    pub fn snapshot(product: &Product, quantity: u32) -> Self {
        Self {
            id: 0,
            product_id: product.id,
            product_name: product.name.clone(),
            unit_price: product.price,
            quantity,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Unit price times quantity, or `None` if it does not fit in cents.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }

    pub fn stock_line(&self) -> StockLine {
        StockLine::new(self.product_id, self.quantity)
    }
}

/// An order and its line items.
///
/// The total is computed once from the snapshotted items and never
/// mutated independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    status: OrderStatus,
    items: Vec<OrderItem>,
    total_amount: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// A new, not yet persisted, pending order.
    ///
    /// Fails if any line total or the order total overflows.
    pub fn new(
        user_id: UserId,
        items: Vec<OrderItem>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        let total_amount = items.iter().try_fold(Money::zero(), |total, item| {
            item.line_total()
                .and_then(|line| total.checked_add(line))
                .ok_or(OrderError::AmountOverflow)
        })?;
        Ok(Self {
            id: OrderId::new(0),
            user_id,
            status: OrderStatus::Pending,
            items,
            total_amount,
            created_at: now,
            updated_at: now,
        })
    }

    /// Assigns the ids handed out by the persistence port.
    pub fn persisted(mut self, id: OrderId, line_ids: impl IntoIterator<Item = i64>) -> Self {
        self.id = id;
        for (item, line_id) in self.items.iter_mut().zip(line_ids) {
            item.id = line_id;
        }
        self
    }

    /// Fixture helper for seeding stores with orders in a given status.
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    /// Fixture helper for seeding stores with historical orders.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn stock_lines(&self) -> Vec<StockLine> {
        self.items.iter().map(OrderItem::stock_line).collect()
    }

    pub(crate) fn set_status(&mut self, status: OrderStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// One page of a user's orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
}

/// Effective paging parameters after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Pages below 1 become 1; sizes outside `[1, 100]` become 20.
    pub fn normalize(page: i64, page_size: i64) -> Self {
        let page = u32::try_from(page.max(1)).unwrap_or(u32::MAX);
        let page_size = match u32::try_from(page_size) {
            Ok(size) if (1..=Self::MAX_PAGE_SIZE).contains(&size) => size,
            _ => Self::DEFAULT_PAGE_SIZE,
        };
        Self { page, page_size }
    }

    pub fn limit(&self) -> u32 {
        self.page_size
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

/// Aggregate figures over a user's orders.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderStats {
    pub total_orders: u32,
    pub active_orders: u32,
    pub total_spent: Money,
    pub last_order_at: Option<DateTime<Utc>>,
}

impl OrderStats {
    pub fn from_orders(orders: &[Order]) -> Self {
        orders.iter().fold(Self::default(), |mut stats, order| {
            stats.total_orders += 1;
            if order.status().is_active() {
                stats.active_orders += 1;
            }
            if order.status() == OrderStatus::Completed {
                stats.total_spent = stats.total_spent.saturating_add(order.total_amount());
            }
            if stats.last_order_at.is_none_or(|last| order.created_at() > last) {
                stats.last_order_at = Some(order.created_at());
            }
            stats
        })
    }
}
