//! Downstream service ports used by the gateway, with their adapters.

pub mod auth;
pub mod catalog;
pub mod orders;
pub mod users;

pub use auth::{AuthAuthority, HttpAuthClient, InMemoryAuthAuthority, LoginRequest, LoginResponse, TokenValidation};
pub use catalog::{HttpProductCatalog, ProductListing};
pub use orders::OrderBackend;
pub use users::{InMemoryUserAuthority, NewUser, User, UserAuthority};
