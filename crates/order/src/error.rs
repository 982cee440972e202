//! Order validation errors.

use common::{ProductId, ServiceError};
use thiserror::Error;

use crate::status::OrderStatus;

/// Failures detected locally by the order saga, before any downstream call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The request carries no line items.
    #[error("order must contain at least one item")]
    NoItems,

    /// A line item quantity is zero or negative.
    #[error("invalid quantity for product {product_id}")]
    InvalidQuantity { product_id: ProductId },

    /// A line item references a non-positive product id.
    #[error("invalid product_id: {0}")]
    InvalidProductId(ProductId),

    /// A line total or the order total does not fit in the money type.
    #[error("order total is too large")]
    AmountOverflow,

    /// The product authority does not know this product.
    #[error("Product with ID {0} not found")]
    ProductNotFound(ProductId),

    /// The order does not exist.
    #[error("Order not found")]
    OrderNotFound,

    /// The status name is not one of the known statuses.
    #[error("Invalid status '{0}'")]
    UnknownStatus(String),

    /// Only pending or confirmed orders may be cancelled.
    #[error("Cannot cancel order with status '{0}'")]
    NotCancellable(OrderStatus),

    /// The state machine forbids this transition.
    #[error("Cannot change status from '{from}' to '{to}'")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

impl From<OrderError> for ServiceError {
    fn from(err: OrderError) -> Self {
        match &err {
            OrderError::NoItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::InvalidProductId(_)
            | OrderError::AmountOverflow => {
                ServiceError::invalid_input(format!("INVALID_REQUEST: {err}"))
            }
            OrderError::ProductNotFound(_) => {
                ServiceError::not_found(format!("PRODUCT_NOT_FOUND: {err}"))
            }
            OrderError::OrderNotFound => ServiceError::not_found(format!("NOT_FOUND: {err}")),
            OrderError::UnknownStatus(_) | OrderError::NotCancellable(_) => {
                ServiceError::invalid_input(format!("INVALID_STATUS: {err}"))
            }
            OrderError::InvalidTransition { .. } => {
                ServiceError::invalid_input(format!("INVALID_TRANSITION: {err}"))
            }
        }
    }
}
