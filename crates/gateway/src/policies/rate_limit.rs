//! A single token bucket shared by every inbound request.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::http::header::RETRY_AFTER;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::time::Instant;

use crate::error::ApiError;

/// Time source for the bucket.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Tokio's clock, which tests can pause and advance.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Token bucket: refills at `rate` tokens per second up to `burst`.
///
/// Each request takes one token; with none left the request is rejected.
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    clock: Arc<dyn Clock>,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    /// Creates a full bucket.
    pub fn new(rate: f64, burst: u32) -> Self {
        Self::with_clock(rate, burst, Arc::new(TokioClock))
    }

    pub fn with_clock(rate: f64, burst: u32, clock: Arc<dyn Clock>) -> Self {
        let burst = f64::from(burst.max(1));
        let now = clock.now();
        Self {
            rate: rate.max(0.0),
            burst,
            clock,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                refilled_at: now,
            }),
        }
    }

    /// Takes a token if one is available.
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut bucket = match self.bucket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let elapsed = now.saturating_duration_since(bucket.refilled_at);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.rate).min(self.burst);
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until the next token becomes available, if the rate is non-zero.
    pub fn retry_after(&self) -> Option<Duration> {
        if self.rate <= 0.0 {
            return None;
        }
        let tokens = match self.bucket.lock() {
            Ok(guard) => guard.tokens,
            Err(poisoned) => poisoned.into_inner().tokens,
        };
        Some(Duration::from_secs_f64(((1.0 - tokens) / self.rate).max(0.0)))
    }
}

/// Rejects the request with 429 once the bucket is empty, with a
/// `Retry-After` header in whole seconds when the bucket refills at all.
pub async fn rate_limit(
    State(limiter): State<Arc<TokenBucket>>,
    request: Request,
    next: Next,
) -> Response {
    if limiter.try_acquire() {
        return next.run(request).await;
    }

    metrics::counter!("rate_limit_rejections_total").increment(1);
    tracing::warn!(
        method = %request.method(),
        path = %request.uri().path(),
        "rate limit exceeded"
    );
    let mut response = ApiError::TooManyRequests.into_response();
    if let Some(wait) = limiter.retry_after() {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs(wait)));
    }
    response
}

fn retry_after_secs(wait: Duration) -> u64 {
    wait.as_secs_f64().ceil().max(1.0) as u64
}
