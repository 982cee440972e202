//! Order saga with stock reservation and compensation.
//!
//! Creating an order spans two independent services: the product authority,
//! which owns stock, and the order store. There is no shared transaction, so
//! consistency comes from compensation:
//! 1. Validate the request locally
//! 2. Fetch and snapshot the referenced products
//! 3. Reserve stock line by line, rolling back the succeeded prefix on failure
//! 4. Persist the order, releasing the reservation if that fails
//!
//! Cancelling (or moving an order into `cancelled`) releases its stock on a
//! best-effort basis after the new status is saved.

pub mod error;
pub mod model;
pub mod reservation;
pub mod saga;
pub mod services;
pub mod status;

pub use error::OrderError;
pub use model::{Order, OrderItem, OrderPage, OrderStats, PageRequest, Product, StockLine};
pub use reservation::{Reservation, StockReservationCoordinator};
pub use saga::{CreateOrder, LineRequest, OrderSaga};
pub use services::{
    InMemoryOrderRepository, InMemoryProductAuthority, OrderRepository, ProductAuthority,
    RepositoryCall,
};
pub use status::OrderStatus;
