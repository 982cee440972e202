//! External collaborator traits and in-memory implementations for the saga.

pub mod product;
pub mod repository;

pub use product::{InMemoryProductAuthority, ProductAuthority};
pub use repository::{InMemoryOrderRepository, OrderRepository, RepositoryCall};
