//! Shared building blocks for the storefront services.
//!
//! - Typed integer ids and [`Money`]
//! - The domain error taxonomy ([`ServiceError`], [`ErrorKind`])
//! - The Error-Mapper between transport codes and the taxonomy ([`transport`])
//! - The propagated caller [`Identity`] and the per-request call [`Context`]

pub mod context;
pub mod error;
pub mod identity;
pub mod transport;
pub mod types;

pub use context::Context;
pub use error::{ErrorKind, Result, ServiceError};
pub use identity::{Identity, Metadata, Role, USER_ID_KEY, USER_ROLE_KEY};
pub use transport::RpcCode;
pub use types::{Money, OrderId, ProductId, UserId};
