//! Aggregated read operations built from concurrent downstream fetches.

pub mod fanout;
pub mod views;

use std::sync::Arc;

use common::{Context, OrderId, ServiceError, UserId};
use order::ProductAuthority;

use crate::clients::{OrderBackend, UserAuthority};

pub use fanout::{FanOut, Slot};
pub use views::{
    OrderDetailView, OrderItemView, ProductNames, UNKNOWN_PRODUCT, UserProfileView, UserSummary,
};

/// Page of orders shown on the profile view.
const PROFILE_PAGE: i64 = 1;
const PROFILE_PAGE_SIZE: i64 = 20;

/// Builds the order-detail and user-profile views.
///
/// The caller's identity travels in the [`Context`] to every downstream
/// call, so each service applies its own ownership rules.
#[derive(Clone)]
pub struct Aggregator {
    users: Arc<dyn UserAuthority>,
    orders: Arc<dyn OrderBackend>,
    products: Arc<dyn ProductAuthority>,
}

impl Aggregator {
    pub fn new(
        users: Arc<dyn UserAuthority>,
        orders: Arc<dyn OrderBackend>,
        products: Arc<dyn ProductAuthority>,
    ) -> Self {
        Self {
            users,
            orders,
            products,
        }
    }

    /// Loads the order, then its owner and its products concurrently.
    ///
    /// Lines whose product is not returned are named [`UNKNOWN_PRODUCT`].
    #[tracing::instrument(skip(self, ctx))]
    pub async fn order_detail(
        &self,
        ctx: &Context,
        order_id: OrderId,
    ) -> Result<OrderDetailView, ServiceError> {
        let order = self.orders.get_order(ctx, order_id).await?;
        let product_ids = views::referenced_products([&order]);
        let owner = order.user_id();

        let mut group = FanOut::new(ctx, "order_detail");
        let users = self.users.clone();
        let user = group.spawn(move |ctx| async move { users.get_user(&ctx, owner).await });
        let products = if product_ids.is_empty() {
            None
        } else {
            let products = self.products.clone();
            Some(group.spawn(move |ctx| async move {
                products.get_products(&ctx, &product_ids).await
            }))
        };
        group.wait().await?;

        let user = user.take()?;
        let names: ProductNames = products
            .map(Slot::take)
            .transpose()?
            .unwrap_or_default()
            .into_iter()
            .collect();

        Ok(OrderDetailView::stitch(&order, UserSummary::from(&user), &names))
    }

    /// Loads the user and their first page of orders concurrently, then
    /// resolves every referenced product in one follow-up call.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn user_profile(
        &self,
        ctx: &Context,
        user_id: UserId,
    ) -> Result<UserProfileView, ServiceError> {
        let mut group = FanOut::new(ctx, "user_profile");
        let users = self.users.clone();
        let user = group.spawn(move |ctx| async move { users.get_user(&ctx, user_id).await });
        let orders = self.orders.clone();
        let page = group.spawn(move |ctx| async move {
            orders
                .get_user_orders(&ctx, user_id, PROFILE_PAGE, PROFILE_PAGE_SIZE)
                .await
        });
        group.wait().await?;

        let user = UserSummary::from(&user.take()?);
        let orders = page.take()?.orders;

        let product_ids = views::referenced_products(&orders);
        let names: ProductNames = if product_ids.is_empty() {
            ProductNames::default()
        } else {
            self.products
                .get_products(ctx, &product_ids)
                .await?
                .into_iter()
                .collect()
        };

        Ok(UserProfileView {
            orders: orders
                .iter()
                .map(|order| OrderDetailView::stitch(order, user.clone(), &names))
                .collect(),
            user,
        })
    }
}
