//! The order saga: order operations spanning the product authority and
//! the persistence port, kept consistent by compensation.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use common::{Context, ErrorKind, Identity, OrderId, ProductId, ServiceError, UserId};
use resilience::{Failure, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::error::OrderError;
use crate::model::{Order, OrderItem, OrderPage, OrderStats, PageRequest, Product};
use crate::reservation::StockReservationCoordinator;
use crate::services::{OrderRepository, ProductAuthority};
use crate::status::OrderStatus;

/// Orders scanned when computing statistics.
pub const STATS_SCAN_LIMIT: u32 = 1000;

/// One requested line of a new order, as received from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl LineRequest {
    pub fn new(product_id: impl Into<ProductId>, quantity: i64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Request to create an order.
///
/// `user_id` may be omitted; if present it must name the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub items: Vec<LineRequest>,
}

impl CreateOrder {
    pub fn new(items: Vec<LineRequest>) -> Self {
        Self {
            user_id: None,
            items,
        }
    }

    pub fn for_user(mut self, user_id: impl Into<UserId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Orchestrates order operations over a product authority and an order store.
///
/// Every operation reads the caller's identity from the [`Context`] and
/// enforces ownership: admins may act on any user's orders, everybody
/// else only on their own.
pub struct OrderSaga<P, R>
where
    P: ProductAuthority + Clone,
    R: OrderRepository,
{
    products: P,
    coordinator: StockReservationCoordinator<P>,
    repository: R,
    retry: RetryPolicy,
}

impl<P, R> OrderSaga<P, R>
where
    P: ProductAuthority + Clone,
    R: OrderRepository,
{
    /// Creates a new saga with the default retry policy.
    pub fn new(products: P, repository: R) -> Self {
        Self {
            coordinator: StockReservationCoordinator::new(products.clone()),
            products,
            repository,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the retry policy used for product lookups.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Bounds each compensating stock call.
    pub fn with_compensation_timeout(mut self, timeout: Duration) -> Self {
        self.coordinator = self.coordinator.with_compensation_timeout(timeout);
        self
    }

    /// Creates an order: validates, snapshots prices, reserves stock and persists.
    ///
    /// If reservation fails nothing is persisted and the reservation error is
    /// returned unchanged. If persistence fails the reserved stock is
    /// released before returning `Internal`.
    #[tracing::instrument(skip(self, ctx, request), fields(items = request.items.len()))]
    pub async fn create(
        &self,
        ctx: &Context,
        request: CreateOrder,
    ) -> Result<OrderId, ServiceError> {
        let identity = ctx.identity()?;
        if request.user_id.is_some_and(|id| id != identity.user_id) {
            return Err(ServiceError::forbidden(
                "FORBIDDEN: Cannot create order for another user",
            ));
        }

        let lines = validate_lines(&request.items)?;
        let products = self.fetch_products(ctx, &lines).await?;

        let items = lines
            .iter()
            .map(|(product_id, quantity)| {
                products
                    .get(product_id)
                    .map(|product| OrderItem::snapshot(product, *quantity))
                    .ok_or(OrderError::ProductNotFound(*product_id))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let order = Order::new(identity.user_id, items, Utc::now())?;

        let reservation = self.coordinator.reserve(ctx, &order.stock_lines()).await?;

        let total = order.total_amount();
        let created = match self.repository.create(ctx, order).await {
            Ok(created) => created,
            Err(err) => {
                tracing::error!(
                    user_id = %identity.user_id,
                    error = %err,
                    "failed to persist order, releasing reserved stock"
                );
                self.coordinator.release(ctx, reservation.lines()).await;
                return Err(ServiceError::internal(format!(
                    "DATABASE_ERROR: Failed to create order: {}",
                    err.message()
                )));
            }
        };

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %created.id(),
            user_id = %identity.user_id,
            total = %total,
            "order created"
        );
        Ok(created.id())
    }

    /// Loads an order the caller is allowed to see.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn get_order(&self, ctx: &Context, order_id: OrderId) -> Result<Order, ServiceError> {
        let identity = ctx.identity()?;
        self.load_owned(ctx, &identity, order_id).await
    }

    /// Cancels a pending or confirmed order, then releases its stock.
    ///
    /// Release failures are logged; the cancellation still succeeds.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn cancel(
        &self,
        ctx: &Context,
        order_id: OrderId,
        reason: &str,
    ) -> Result<Order, ServiceError> {
        let identity = ctx.identity()?;
        let mut order = self.load_owned(ctx, &identity, order_id).await?;

        if !order.status().can_cancel() {
            return Err(OrderError::NotCancellable(order.status()).into());
        }

        order.set_status(OrderStatus::Cancelled, Utc::now());
        self.save(ctx, &order).await?;
        self.coordinator.release(ctx, &order.stock_lines()).await;

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(order_id = %order_id, reason, "order cancelled");
        Ok(order)
    }

    /// Moves an order to `status`, or only refreshes its timestamp when no
    /// status (or the current one) is given.
    ///
    /// Entering `cancelled` releases the order's stock after it is saved.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn update_status(
        &self,
        ctx: &Context,
        order_id: OrderId,
        status: Option<&str>,
    ) -> Result<Order, ServiceError> {
        let identity = ctx.identity()?;
        let mut order = self.load_owned(ctx, &identity, order_id).await?;
        let target = status.map(OrderStatus::parse).transpose()?;

        let current = order.status();
        let now = Utc::now();
        match target {
            Some(target) if target != current => {
                if !current.can_transition_to(target) {
                    return Err(OrderError::InvalidTransition {
                        from: current,
                        to: target,
                    }
                    .into());
                }
                order.set_status(target, now);
            }
            _ => order.touch(now),
        }

        self.save(ctx, &order).await?;

        if current != OrderStatus::Cancelled && order.status() == OrderStatus::Cancelled {
            self.coordinator.release(ctx, &order.stock_lines()).await;
            metrics::counter!("orders_cancelled_total").increment(1);
        }

        tracing::info!(
            order_id = %order_id,
            from = %current,
            to = %order.status(),
            "order status updated"
        );
        Ok(order)
    }

    /// One page of a user's orders, newest first.
    ///
    /// Pages below 1 become 1; sizes outside `[1, 100]` become 20.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn get_user_orders(
        &self,
        ctx: &Context,
        user_id: UserId,
        page: i64,
        page_size: i64,
    ) -> Result<OrderPage, ServiceError> {
        let identity = ctx.identity()?;
        identity.ensure_access(user_id)?;

        let paging = PageRequest::normalize(page, page_size);
        let (orders, total_count) = self
            .repository
            .list_by_user(ctx, user_id, paging.limit(), paging.offset())
            .await
            .map_err(|e| storage_error(e, "list orders"))?;

        Ok(OrderPage {
            orders,
            total_count,
            page: paging.page,
            page_size: paging.page_size,
        })
    }

    /// Totals over the user's most recent orders.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn get_order_stats(
        &self,
        ctx: &Context,
        user_id: UserId,
    ) -> Result<OrderStats, ServiceError> {
        let identity = ctx.identity()?;
        identity.ensure_access(user_id)?;

        let (orders, _) = self
            .repository
            .list_by_user(ctx, user_id, STATS_SCAN_LIMIT, 0)
            .await
            .map_err(|e| storage_error(e, "list orders"))?;

        Ok(OrderStats::from_orders(&orders))
    }

    async fn fetch_products(
        &self,
        ctx: &Context,
        lines: &[(ProductId, u32)],
    ) -> Result<HashMap<ProductId, Product>, ServiceError> {
        let mut seen = HashSet::new();
        let ids: Vec<ProductId> = lines
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| seen.insert(*id))
            .collect();

        let products = &self.products;
        let ids = ids.as_slice();
        let fetched = resilience::retry(&self.retry, ctx, "get_products", move || async move {
            products
                .get_products(ctx, ids)
                .await
                .map_err(Failure::from)
        })
        .await?;

        Ok(fetched.into_iter().map(|p| (p.id, p)).collect())
    }

    async fn load_owned(
        &self,
        ctx: &Context,
        identity: &Identity,
        order_id: OrderId,
    ) -> Result<Order, ServiceError> {
        let order = self
            .repository
            .get(ctx, order_id)
            .await
            .map_err(|e| storage_error(e, "get order"))?
            .ok_or(OrderError::OrderNotFound)?;
        identity.ensure_access(order.user_id())?;
        Ok(order)
    }

    async fn save(&self, ctx: &Context, order: &Order) -> Result<(), ServiceError> {
        self.repository
            .update(ctx, order)
            .await
            .map_err(|e| storage_error(e, "update order"))
    }
}

/// Checks every requested line before any downstream call is made.
fn validate_lines(items: &[LineRequest]) -> Result<Vec<(ProductId, u32)>, OrderError> {
    if items.is_empty() {
        return Err(OrderError::NoItems);
    }
    items
        .iter()
        .map(|item| {
            if !item.product_id.is_valid() {
                return Err(OrderError::InvalidProductId(item.product_id));
            }
            match u32::try_from(item.quantity) {
                Ok(quantity) if quantity > 0 => Ok((item.product_id, quantity)),
                _ => Err(OrderError::InvalidQuantity {
                    product_id: item.product_id,
                }),
            }
        })
        .collect()
}

fn storage_error(err: ServiceError, action: &str) -> ServiceError {
    match err.kind() {
        ErrorKind::Timeout => err,
        _ => ServiceError::internal(format!(
            "DATABASE_ERROR: Failed to {action}: {}",
            err.message()
        )),
    }
}
