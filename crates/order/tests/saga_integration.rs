//! Integration tests for the order saga.

use std::time::Duration;

use common::{Context, ErrorKind, Identity, Money, OrderId, ProductId, USER_ID_KEY, UserId};
use order::{
    CreateOrder, InMemoryOrderRepository, InMemoryProductAuthority, LineRequest, Order,
    OrderItem, OrderSaga, OrderStatus, Product, RepositoryCall,
};
use resilience::RetryPolicy;

type TestSaga = OrderSaga<InMemoryProductAuthority, InMemoryOrderRepository>;

fn product(id: i64, name: &str, cents: i64, stock: i64) -> Product {
    Product {
        id: ProductId::new(id),
        name: name.to_string(),
        description: format!("{name} description"),
        price: Money::from_cents(cents),
        stock,
    }
}

fn as_user(id: i64) -> Context {
    Context::new().with_identity(&Identity::user(id))
}

fn as_admin(id: i64) -> Context {
    Context::new().with_identity(&Identity::admin(id))
}

struct TestHarness {
    saga: TestSaga,
    products: InMemoryProductAuthority,
    repository: InMemoryOrderRepository,
}

impl TestHarness {
    fn new() -> Self {
        let products = InMemoryProductAuthority::with_products([
            product(1, "Widget", 1000, 10),
            product(2, "Gadget", 2500, 5),
            product(3, "Gizmo", 499, 0),
        ]);
        let repository = InMemoryOrderRepository::new();
        let saga = OrderSaga::new(products.clone(), repository.clone())
            .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(1)));

        Self {
            saga,
            products,
            repository,
        }
    }

    fn stock(&self, id: i64) -> i64 {
        self.products.stock_of(ProductId::new(id)).unwrap()
    }

    async fn create_order(&self, user: i64) -> OrderId {
        self.saga
            .create(
                &as_user(user),
                CreateOrder::new(vec![LineRequest::new(1, 2), LineRequest::new(2, 1)]),
            )
            .await
            .unwrap()
    }

    async fn seed_order(&self, user: i64, status: OrderStatus) -> OrderId {
        let widget = product(1, "Widget", 1000, 0);
        let order = Order::new(
            UserId::new(user),
            vec![OrderItem::snapshot(&widget, 3)],
            chrono::Utc::now(),
        )
        .unwrap()
        .with_status(status);
        self.repository.insert(order).await
    }
}

#[tokio::test]
async fn test_create_reserves_stock_and_persists_pending_order() {
    let h = TestHarness::new();

    let order_id = h.create_order(1).await;

    let order = h.saga.get_order(&as_user(1), order_id).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Pending);
    assert_eq!(order.user_id(), UserId::new(1));
    assert_eq!(order.items().len(), 2);
    assert_eq!(order.items()[0].product_name(), "Widget");
    assert_eq!(order.total_amount(), Money::from_cents(4500));
    assert_eq!(h.stock(1), 8);
    assert_eq!(h.stock(2), 4);
    assert_eq!(h.products.get_products_calls(), 1);
}

#[tokio::test]
async fn test_create_failure_compensates_succeeded_prefix_only() {
    let h = TestHarness::new();
    h.products.insert(product(2, "Gadget", 2500, 0));

    let err = h
        .saga
        .create(
            &as_user(1),
            CreateOrder::new(vec![LineRequest::new(1, 2), LineRequest::new(2, 1)]),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(
        h.products.stock_calls(),
        vec![
            (ProductId::new(1), -2),
            (ProductId::new(2), -1),
            (ProductId::new(1), 2),
        ]
    );
    assert_eq!(h.stock(1), 10);
    assert_eq!(h.repository.order_count().await, 0);
    assert!(h.repository.calls().await.is_empty());
}

#[tokio::test]
async fn test_create_failure_at_third_line_rolls_back_two() {
    let h = TestHarness::new();

    let err = h
        .saga
        .create(
            &as_user(1),
            CreateOrder::new(vec![
                LineRequest::new(2, 1),
                LineRequest::new(1, 4),
                LineRequest::new(3, 1),
            ]),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let compensations: Vec<_> = h
        .products
        .stock_calls()
        .into_iter()
        .filter(|(_, delta)| *delta > 0)
        .collect();
    assert_eq!(
        compensations,
        vec![(ProductId::new(2), 1), (ProductId::new(1), 4)]
    );
    assert_eq!(h.stock(1), 10);
    assert_eq!(h.stock(2), 5);
    assert_eq!(h.repository.order_count().await, 0);
}

#[tokio::test]
async fn test_create_with_unknown_product_is_not_found() {
    let h = TestHarness::new();

    let err = h
        .saga
        .create(
            &as_user(1),
            CreateOrder::new(vec![LineRequest::new(1, 1), LineRequest::new(42, 1)]),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.message().contains("42"));
    assert!(h.products.stock_calls().is_empty());
    assert_eq!(h.repository.order_count().await, 0);
}

#[tokio::test]
async fn test_create_validation_touches_no_dependency() {
    let h = TestHarness::new();
    let ctx = as_user(1);

    for request in [
        CreateOrder::new(vec![]),
        CreateOrder::new(vec![LineRequest::new(1, 0)]),
        CreateOrder::new(vec![LineRequest::new(1, 1), LineRequest::new(2, -1)]),
        CreateOrder::new(vec![LineRequest::new(-5, 1)]),
    ] {
        let err = h.saga.create(&ctx, request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.message().starts_with("INVALID_REQUEST"));
    }

    assert_eq!(h.products.get_products_calls(), 0);
    assert!(h.products.stock_calls().is_empty());
    assert!(h.repository.calls().await.is_empty());
}

#[tokio::test]
async fn test_create_with_overflowing_total_is_rejected_before_reserving() {
    let h = TestHarness::new();
    h.products.insert(product(4, "Yacht", 1_000_000, i64::MAX));

    let lines = vec![LineRequest::new(4, i64::from(u32::MAX)); 3000];
    let err = h
        .saga
        .create(&as_user(1), CreateOrder::new(lines))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(err.message().starts_with("INVALID_REQUEST"));
    assert!(h.products.stock_calls().is_empty());
    assert_eq!(h.stock(4), i64::MAX);
    assert!(h.repository.calls().await.is_empty());
}

#[tokio::test]
async fn test_create_persistence_failure_releases_stock() {
    let h = TestHarness::new();
    h.repository.set_fail_on_create(true).await;

    let err = h
        .saga
        .create(
            &as_user(1),
            CreateOrder::new(vec![LineRequest::new(1, 2), LineRequest::new(2, 1)]),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(err.message().starts_with("DATABASE_ERROR"));
    assert_eq!(h.stock(1), 10);
    assert_eq!(h.stock(2), 5);
    assert_eq!(h.repository.order_count().await, 0);
}

#[tokio::test]
async fn test_create_for_another_user_is_forbidden() {
    let h = TestHarness::new();

    let err = h
        .saga
        .create(
            &as_admin(1),
            CreateOrder::new(vec![LineRequest::new(1, 1)]).for_user(2),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert!(h.products.stock_calls().is_empty());

    let own = h
        .saga
        .create(
            &as_user(1),
            CreateOrder::new(vec![LineRequest::new(1, 1)]).for_user(1),
        )
        .await;
    assert!(own.is_ok());
}

#[tokio::test]
async fn test_product_lookup_is_retried_then_propagated() {
    let h = TestHarness::new();
    h.products
        .set_fail_get_products(Some(common::ServiceError::unavailable("product service down")));

    let err = h
        .saga
        .create(&as_user(1), CreateOrder::new(vec![LineRequest::new(1, 1)]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    assert_eq!(h.products.get_products_calls(), 3);
    assert!(h.products.stock_calls().is_empty());
}

#[tokio::test]
async fn test_total_is_not_affected_by_later_price_changes() {
    let h = TestHarness::new();
    let order_id = h.create_order(1).await;

    h.products
        .set_price(ProductId::new(1), Money::from_cents(99_999));

    let order = h.saga.get_order(&as_user(1), order_id).await.unwrap();
    assert_eq!(order.total_amount(), Money::from_cents(4500));
    assert_eq!(order.items()[0].unit_price(), Money::from_cents(1000));
}

#[tokio::test]
async fn test_other_users_get_forbidden_without_side_effects() {
    let h = TestHarness::new();
    let order_id = h.create_order(1).await;
    h.repository.clear_calls().await;
    let stock_before = h.products.stock_calls().len();
    let intruder = as_user(2);

    let err = h.saga.get_order(&intruder, order_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = h
        .saga
        .cancel(&intruder, order_id, "not mine")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = h
        .saga
        .update_status(&intruder, order_id, Some("cancelled"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = h
        .saga
        .update_status(&intruder, order_id, Some("bogus"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = h
        .saga
        .get_user_orders(&intruder, UserId::new(1), 1, 20)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = h
        .saga
        .get_order_stats(&intruder, UserId::new(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    assert!(
        h.repository
            .calls()
            .await
            .iter()
            .all(|call| matches!(call, RepositoryCall::Get(_)))
    );
    assert_eq!(h.products.stock_calls().len(), stock_before);
    let order = h.saga.get_order(&as_user(1), order_id).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Pending);
}

#[tokio::test]
async fn test_admin_can_act_on_any_order() {
    let h = TestHarness::new();
    let order_id = h.create_order(1).await;
    let admin = as_admin(99);

    assert!(h.saga.get_order(&admin, order_id).await.is_ok());
    let page = h
        .saga
        .get_user_orders(&admin, UserId::new(1), 1, 20)
        .await
        .unwrap();
    assert_eq!(page.total_count, 1);

    let order = h.saga.cancel(&admin, order_id, "fraud").await.unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_get_missing_order_is_not_found() {
    let h = TestHarness::new();
    let err = h
        .saga
        .get_order(&as_user(1), OrderId::new(404))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_user_orders_page_bounds_reach_the_store() {
    let h = TestHarness::new();
    let ctx = as_user(1);

    let page = h
        .saga
        .get_user_orders(&ctx, UserId::new(1), 0, 1000)
        .await
        .unwrap();
    assert_eq!(page.page, 1);
    assert_eq!(page.page_size, 20);

    h.saga
        .get_user_orders(&ctx, UserId::new(1), 3, 10)
        .await
        .unwrap();
    h.saga
        .get_user_orders(&ctx, UserId::new(1), -1, 0)
        .await
        .unwrap();

    assert_eq!(
        h.repository.calls().await,
        vec![
            RepositoryCall::ListByUser {
                user_id: UserId::new(1),
                limit: 20,
                offset: 0,
            },
            RepositoryCall::ListByUser {
                user_id: UserId::new(1),
                limit: 10,
                offset: 20,
            },
            RepositoryCall::ListByUser {
                user_id: UserId::new(1),
                limit: 20,
                offset: 0,
            },
        ]
    );
}

#[tokio::test]
async fn test_user_orders_returns_page_and_total() {
    let h = TestHarness::new();
    for _ in 0..3 {
        h.seed_order(1, OrderStatus::Pending).await;
    }
    h.seed_order(2, OrderStatus::Pending).await;

    let page = h
        .saga
        .get_user_orders(&as_user(1), UserId::new(1), 2, 2)
        .await
        .unwrap();
    assert_eq!(page.total_count, 3);
    assert_eq!(page.orders.len(), 1);
}

#[tokio::test]
async fn test_cancel_completed_order_is_rejected_before_persisting() {
    let h = TestHarness::new();
    let order_id = h.seed_order(1, OrderStatus::Completed).await;

    let err = h
        .saga
        .cancel(&as_user(1), order_id, "changed my mind")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(err.message().starts_with("INVALID_STATUS"));
    assert_eq!(h.repository.calls().await, vec![RepositoryCall::Get(order_id)]);
    assert!(h.products.stock_calls().is_empty());
}

#[tokio::test]
async fn test_cancel_releases_stock() {
    let h = TestHarness::new();
    let order_id = h.create_order(1).await;
    assert_eq!(h.stock(1), 8);

    let order = h
        .saga
        .cancel(&as_user(1), order_id, "changed my mind")
        .await
        .unwrap();

    assert_eq!(order.status(), OrderStatus::Cancelled);
    assert_eq!(h.stock(1), 10);
    assert_eq!(h.stock(2), 5);
    let stored = h.saga.get_order(&as_user(1), order_id).await.unwrap();
    assert_eq!(stored.status(), OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_succeeds_when_release_fails() {
    let h = TestHarness::new();
    let order_id = h.create_order(1).await;
    h.products.set_fail_stock_update(ProductId::new(1), true);

    let order = h
        .saga
        .cancel(&as_user(1), order_id, "changed my mind")
        .await
        .unwrap();

    assert_eq!(order.status(), OrderStatus::Cancelled);
    assert_eq!(h.stock(1), 8);
    assert_eq!(h.stock(2), 5);
}

#[tokio::test]
async fn test_update_status_follows_state_machine() {
    let h = TestHarness::new();
    let order_id = h.create_order(1).await;
    let ctx = as_user(1);

    let order = h
        .saga
        .update_status(&ctx, order_id, Some("processing"))
        .await
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Processing);

    let err = h
        .saga
        .update_status(&ctx, order_id, Some("confirmed"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(err.message().starts_with("INVALID_TRANSITION"));

    let err = h
        .saga
        .update_status(&ctx, order_id, Some("shipped"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(err.message().starts_with("INVALID_STATUS"));

    let touched = h.saga.update_status(&ctx, order_id, None).await.unwrap();
    assert_eq!(touched.status(), OrderStatus::Processing);
    assert!(touched.updated_at() >= order.updated_at());
}

#[tokio::test]
async fn test_update_into_cancelled_releases_stock_once() {
    let h = TestHarness::new();
    let order_id = h.create_order(1).await;
    let ctx = as_user(1);

    h.saga
        .update_status(&ctx, order_id, Some("cancelled"))
        .await
        .unwrap();
    assert_eq!(h.stock(1), 10);

    // Same status again is only a touch, not a second release.
    h.saga
        .update_status(&ctx, order_id, Some("cancelled"))
        .await
        .unwrap();
    assert_eq!(h.stock(1), 10);
}

#[tokio::test]
async fn test_order_stats() {
    let h = TestHarness::new();
    h.seed_order(1, OrderStatus::Pending).await;
    h.seed_order(1, OrderStatus::Completed).await;
    h.seed_order(1, OrderStatus::Completed).await;
    h.seed_order(1, OrderStatus::Cancelled).await;
    h.seed_order(2, OrderStatus::Completed).await;

    let stats = h
        .saga
        .get_order_stats(&as_user(1), UserId::new(1))
        .await
        .unwrap();

    assert_eq!(stats.total_orders, 4);
    assert_eq!(stats.active_orders, 1);
    assert_eq!(stats.total_spent, Money::from_cents(6000));
    assert!(stats.last_order_at.is_some());
    assert!(h.repository.calls().await.contains(&RepositoryCall::ListByUser {
        user_id: UserId::new(1),
        limit: 1000,
        offset: 0,
    }));
}

#[tokio::test]
async fn test_missing_or_malformed_identity_is_unauthenticated() {
    let h = TestHarness::new();
    let order_id = h.create_order(1).await;

    let err = h
        .saga
        .get_order(&Context::new(), order_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);

    let malformed = Context::new().with_metadata(USER_ID_KEY, "not-a-number");
    let err = h
        .saga
        .create(&malformed, CreateOrder::new(vec![LineRequest::new(1, 1)]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
}

#[tokio::test]
async fn test_deadline_during_reservation_still_compensates() {
    let h = TestHarness::new();
    h.products.set_latency(Some(Duration::from_millis(100)));
    let ctx = as_user(1).with_timeout(Duration::from_millis(250));

    let err = h
        .saga
        .create(
            &ctx,
            CreateOrder::new(vec![LineRequest::new(1, 3), LineRequest::new(2, 1)]),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(
        h.products.stock_calls(),
        vec![(ProductId::new(1), -3), (ProductId::new(1), 3)]
    );
    assert_eq!(h.stock(1), 10);
    assert_eq!(h.repository.order_count().await, 0);
}
