//! Stitched read models returned by the aggregated endpoints.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use order::{Order, OrderStatus, Product};
use serde::{Deserialize, Serialize};

use crate::clients::User;

/// Display name used when a line's product could not be resolved.
pub const UNKNOWN_PRODUCT: &str = "Unknown Product";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemView {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

/// An order joined with its owner and current product names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetailView {
    pub id: OrderId,
    pub user: UserSummary,
    pub items: Vec<OrderItemView>,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
}

impl OrderDetailView {
    pub fn stitch(order: &Order, user: UserSummary, names: &ProductNames) -> Self {
        Self {
            id: order.id(),
            user,
            items: order
                .items()
                .iter()
                .map(|item| OrderItemView {
                    product_id: item.product_id(),
                    product_name: names.name_of(item.product_id()).to_string(),
                    quantity: item.quantity(),
                    unit_price: item.unit_price(),
                })
                .collect(),
            status: order.status(),
            total_amount: order.total_amount(),
            created_at: order.created_at(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfileView {
    pub user: UserSummary,
    pub orders: Vec<OrderDetailView>,
}

/// Product names by id, falling back to [`UNKNOWN_PRODUCT`].
#[derive(Debug, Clone, Default)]
pub struct ProductNames(HashMap<ProductId, String>);

impl ProductNames {
    pub fn name_of(&self, id: ProductId) -> &str {
        self.0.get(&id).map_or(UNKNOWN_PRODUCT, String::as_str)
    }
}

impl FromIterator<Product> for ProductNames {
    fn from_iter<I: IntoIterator<Item = Product>>(products: I) -> Self {
        Self(products.into_iter().map(|p| (p.id, p.name)).collect())
    }
}

/// Distinct product ids referenced by `orders`, in first-seen order.
pub fn referenced_products<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Vec<ProductId> {
    let mut ids = Vec::new();
    for item in orders.into_iter().flat_map(Order::items) {
        if !ids.contains(&item.product_id()) {
            ids.push(item.product_id());
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use common::Role;
    use order::OrderItem;

    use super::*;

    fn product(id: i64, name: &str) -> Product {
        Product {
            id: ProductId::new(id),
            name: name.to_string(),
            description: String::new(),
            price: Money::from_cents(100),
            stock: 1,
        }
    }

    #[test]
    fn test_missing_product_falls_back_to_unknown() {
        let order = Order::new(
            UserId::new(1),
            vec![
                OrderItem::snapshot(&product(1, "Widget"), 1),
                OrderItem::snapshot(&product(99, "Gone"), 2),
            ],
            Utc::now(),
        )
        .unwrap();
        let names: ProductNames = [product(1, "Widget"), product(2, "Gadget")]
            .into_iter()
            .collect();
        let user = User {
            id: UserId::new(1),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            role: Role::User,
        };

        let view = OrderDetailView::stitch(&order, UserSummary::from(&user), &names);

        assert_eq!(view.items[0].product_name, "Widget");
        assert_eq!(view.items[1].product_name, UNKNOWN_PRODUCT);
        assert_eq!(view.items[1].quantity, 2);
        assert_eq!(view.user.name, "Alice");
    }

    #[test]
    fn test_referenced_products_are_distinct() {
        let widget = product(1, "Widget");
        let gadget = product(2, "Gadget");
        let orders = [
            Order::new(
                UserId::new(1),
                vec![OrderItem::snapshot(&widget, 1), OrderItem::snapshot(&gadget, 1)],
                Utc::now(),
            )
            .unwrap(),
            Order::new(UserId::new(1), vec![OrderItem::snapshot(&widget, 3)], Utc::now()).unwrap(),
        ];
        assert_eq!(
            referenced_products(&orders),
            vec![ProductId::new(1), ProductId::new(2)]
        );
    }
}
