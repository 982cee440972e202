//! Order persistence port and in-memory implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Context, OrderId, ServiceError, UserId};
use tokio::sync::RwLock;

use crate::model::Order;

/// Persistence port for orders. Every call honours the caller's context.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Stores a new order and returns it with ids assigned.
    async fn create(&self, ctx: &Context, order: Order) -> Result<Order, ServiceError>;

    /// Loads an order with its line items.
    async fn get(&self, ctx: &Context, id: OrderId) -> Result<Option<Order>, ServiceError>;

    /// A user's orders, newest first, plus the user's total order count.
    async fn list_by_user(
        &self,
        ctx: &Context,
        user_id: UserId,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<Order>, u64), ServiceError>;

    /// Saves an existing order.
    async fn update(&self, ctx: &Context, order: &Order) -> Result<(), ServiceError>;
}

#[async_trait]
impl<T: OrderRepository + ?Sized> OrderRepository for Arc<T> {
    async fn create(&self, ctx: &Context, order: Order) -> Result<Order, ServiceError> {
        (**self).create(ctx, order).await
    }

    async fn get(&self, ctx: &Context, id: OrderId) -> Result<Option<Order>, ServiceError> {
        (**self).get(ctx, id).await
    }

    async fn list_by_user(
        &self,
        ctx: &Context,
        user_id: UserId,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<Order>, u64), ServiceError> {
        (**self).list_by_user(ctx, user_id, limit, offset).await
    }

    async fn update(&self, ctx: &Context, order: &Order) -> Result<(), ServiceError> {
        (**self).update(ctx, order).await
    }
}

/// One recorded call against the in-memory repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryCall {
    Create,
    Get(OrderId),
    ListByUser {
        user_id: UserId,
        limit: u32,
        offset: u64,
    },
    Update(OrderId),
}

#[derive(Debug, Default)]
struct InMemoryRepositoryState {
    orders: BTreeMap<OrderId, Order>,
    next_order_id: i64,
    next_line_id: i64,
    calls: Vec<RepositoryCall>,
    fail_on_create: bool,
    fail_on_update: bool,
}

/// In-memory order store for tests and local wiring.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRepository {
    state: Arc<RwLock<InMemoryRepositoryState>>,
}

impl InMemoryOrderRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an order directly, bypassing the saga; returns its assigned id.
    pub async fn insert(&self, order: Order) -> OrderId {
        let mut state = self.state.write().await;
        let order = assign_ids(&mut state, order);
        let id = order.id();
        state.orders.insert(id, order);
        id
    }

    /// Configures `create` to fail.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Configures `update` to fail.
    pub async fn set_fail_on_update(&self, fail: bool) {
        self.state.write().await.fail_on_update = fail;
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Every call received so far, in order.
    pub async fn calls(&self) -> Vec<RepositoryCall> {
        self.state.read().await.calls.clone()
    }

    /// Forgets recorded calls.
    pub async fn clear_calls(&self) {
        self.state.write().await.calls.clear();
    }
}

fn assign_ids(state: &mut InMemoryRepositoryState, order: Order) -> Order {
    state.next_order_id += 1;
    let id = OrderId::new(state.next_order_id);
    let first_line = state.next_line_id + 1;
    state.next_line_id += order.items().len() as i64;
    order.persisted(id, first_line..)
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, ctx: &Context, order: Order) -> Result<Order, ServiceError> {
        ctx.run(async {
            let mut state = self.state.write().await;
            state.calls.push(RepositoryCall::Create);
            if state.fail_on_create {
                return Err(ServiceError::internal("database is unavailable"));
            }
            let order = assign_ids(&mut state, order);
            state.orders.insert(order.id(), order.clone());
            Ok(order)
        })
        .await
    }

    async fn get(&self, ctx: &Context, id: OrderId) -> Result<Option<Order>, ServiceError> {
        ctx.run(async {
            let mut state = self.state.write().await;
            state.calls.push(RepositoryCall::Get(id));
            Ok(state.orders.get(&id).cloned())
        })
        .await
    }

    async fn list_by_user(
        &self,
        ctx: &Context,
        user_id: UserId,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<Order>, u64), ServiceError> {
        ctx.run(async {
            let mut state = self.state.write().await;
            state.calls.push(RepositoryCall::ListByUser {
                user_id,
                limit,
                offset,
            });

            let mut owned: Vec<&Order> = state
                .orders
                .values()
                .filter(|o| o.user_id() == user_id)
                .collect();
            owned.sort_by(|a, b| {
                b.created_at()
                    .cmp(&a.created_at())
                    .then_with(|| b.id().cmp(&a.id()))
            });
            let total = owned.len() as u64;
            let page = owned
                .into_iter()
                .skip(usize::try_from(offset).unwrap_or(usize::MAX))
                .take(limit as usize)
                .cloned()
                .collect();
            Ok((page, total))
        })
        .await
    }

    async fn update(&self, ctx: &Context, order: &Order) -> Result<(), ServiceError> {
        ctx.run(async {
            let mut state = self.state.write().await;
            state.calls.push(RepositoryCall::Update(order.id()));
            if state.fail_on_update {
                return Err(ServiceError::internal("database is unavailable"));
            }
            match state.orders.get_mut(&order.id()) {
                Some(stored) => {
                    *stored = order.clone();
                    Ok(())
                }
                None => Err(ServiceError::not_found("Order not found")),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use common::{Money, ProductId};

    use super::*;
    use crate::model::{OrderItem, Product};

    fn order_for(user: i64, age_days: i64) -> Order {
        let product = Product {
            id: ProductId::new(1),
            name: "Widget".to_string(),
            description: String::new(),
            price: Money::from_cents(100),
            stock: 1,
        };
        Order::new(
            UserId::new(user),
            vec![OrderItem::snapshot(&product, 1)],
            Utc::now(),
        )
        .unwrap()
        .with_created_at(Utc::now() - Duration::days(age_days))
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let repo = InMemoryOrderRepository::new();
        let ctx = Context::new();
        let first = repo.create(&ctx, order_for(1, 0)).await.unwrap();
        let second = repo.create(&ctx, order_for(1, 0)).await.unwrap();
        assert_eq!(first.id(), OrderId::new(1));
        assert_eq!(second.id(), OrderId::new(2));
        assert_eq!(second.items()[0].id(), 2);
    }

    #[tokio::test]
    async fn test_list_by_user_pages_newest_first() {
        let repo = InMemoryOrderRepository::new();
        let oldest = repo.insert(order_for(1, 5)).await;
        let newest = repo.insert(order_for(1, 0)).await;
        let middle = repo.insert(order_for(1, 2)).await;
        repo.insert(order_for(2, 0)).await;

        let (page, total) = repo
            .list_by_user(&Context::new(), UserId::new(1), 2, 0)
            .await
            .unwrap();
        assert_eq!(total, 3);
        let ids: Vec<_> = page.iter().map(Order::id).collect();
        assert_eq!(ids, vec![newest, middle]);

        let (page, _) = repo
            .list_by_user(&Context::new(), UserId::new(1), 2, 2)
            .await
            .unwrap();
        assert_eq!(page.iter().map(Order::id).collect::<Vec<_>>(), vec![oldest]);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let repo = InMemoryOrderRepository::new();
        repo.set_fail_on_create(true).await;
        assert!(repo.create(&Context::new(), order_for(1, 0)).await.is_err());
        assert_eq!(repo.order_count().await, 0);
        assert_eq!(repo.calls().await, vec![RepositoryCall::Create]);
    }
}
