//! Order service port, served in-process by the order saga.

use async_trait::async_trait;
use common::{Context, OrderId, ServiceError, UserId};
use order::{
    CreateOrder, Order, OrderPage, OrderRepository, OrderSaga, OrderStats, ProductAuthority,
};

/// The order operations the gateway calls; every call carries the caller's
/// identity in its [`Context`].
#[async_trait]
pub trait OrderBackend: Send + Sync {
    async fn create_order(&self, ctx: &Context, request: CreateOrder)
    -> Result<OrderId, ServiceError>;

    async fn get_order(&self, ctx: &Context, order_id: OrderId) -> Result<Order, ServiceError>;

    async fn cancel_order(
        &self,
        ctx: &Context,
        order_id: OrderId,
        reason: &str,
    ) -> Result<Order, ServiceError>;

    async fn update_order_status(
        &self,
        ctx: &Context,
        order_id: OrderId,
        status: Option<&str>,
    ) -> Result<Order, ServiceError>;

    async fn get_user_orders(
        &self,
        ctx: &Context,
        user_id: UserId,
        page: i64,
        page_size: i64,
    ) -> Result<OrderPage, ServiceError>;

    async fn get_order_stats(
        &self,
        ctx: &Context,
        user_id: UserId,
    ) -> Result<OrderStats, ServiceError>;
}

#[async_trait]
impl<P, R> OrderBackend for OrderSaga<P, R>
where
    P: ProductAuthority + Clone + 'static,
    R: OrderRepository + 'static,
{
    async fn create_order(
        &self,
        ctx: &Context,
        request: CreateOrder,
    ) -> Result<OrderId, ServiceError> {
        self.create(ctx, request).await
    }

    async fn get_order(&self, ctx: &Context, order_id: OrderId) -> Result<Order, ServiceError> {
        OrderSaga::get_order(self, ctx, order_id).await
    }

    async fn cancel_order(
        &self,
        ctx: &Context,
        order_id: OrderId,
        reason: &str,
    ) -> Result<Order, ServiceError> {
        self.cancel(ctx, order_id, reason).await
    }

    async fn update_order_status(
        &self,
        ctx: &Context,
        order_id: OrderId,
        status: Option<&str>,
    ) -> Result<Order, ServiceError> {
        self.update_status(ctx, order_id, status).await
    }

    async fn get_user_orders(
        &self,
        ctx: &Context,
        user_id: UserId,
        page: i64,
        page_size: i64,
    ) -> Result<OrderPage, ServiceError> {
        OrderSaga::get_user_orders(self, ctx, user_id, page, page_size).await
    }

    async fn get_order_stats(
        &self,
        ctx: &Context,
        user_id: UserId,
    ) -> Result<OrderStats, ServiceError> {
        OrderSaga::get_order_stats(self, ctx, user_id).await
    }
}
