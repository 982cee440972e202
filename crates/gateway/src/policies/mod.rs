//! Edge policies applied as axum middleware.

pub mod auth;
pub mod cache;
pub mod rate_limit;

pub use auth::{parse_authorization, require_auth};
pub use cache::{CACHE_HEADER, CacheStore, InMemoryCacheStore, ResponseCache, cache_key, cache_responses};
pub use rate_limit::{Clock, TokenBucket, TokioClock, rate_limit};
