//! Bounded retry with backoff for outbound calls.
//!
//! One [`RetryPolicy`] drives two distinct call sites:
//! - [`retry`] propagates the final failure to the caller;
//! - [`retry_or_fallback`] degrades to a caller-supplied value once all
//!   attempts are exhausted, and only surfaces terminal failures.

mod policy;

pub use policy::RetryPolicy;

use std::future::Future;

use common::{Context, ServiceError};
use thiserror::Error;

/// Classification of one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Network errors and 5xx-class responses: try again.
    Retryable(ServiceError),
    /// 4xx-class responses and decode errors: stop immediately.
    Terminal(ServiceError),
}

impl Failure {
    pub fn into_inner(self) -> ServiceError {
        match self {
            Failure::Retryable(e) | Failure::Terminal(e) => e,
        }
    }
}

impl From<ServiceError> for Failure {
    /// Transient kinds are retryable, everything else is terminal.
    fn from(err: ServiceError) -> Self {
        if err.kind().is_transient() {
            Failure::Retryable(err)
        } else {
            Failure::Terminal(err)
        }
    }
}

/// Why a retried call gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    /// A terminal failure stopped the loop on the attempt it occurred.
    #[error("terminal failure: {0}")]
    Terminal(ServiceError),

    /// Every attempt failed with a retryable error.
    #[error("all {attempts} attempts failed, last error: {last}")]
    Exhausted { attempts: u32, last: ServiceError },

    /// The caller's scope ended while retrying.
    #[error("retry cancelled: {0}")]
    Cancelled(ServiceError),
}

impl From<RetryError> for ServiceError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Terminal(e) | RetryError::Cancelled(e) => e,
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

/// Runs `call` until it succeeds, fails terminally, runs out of attempts,
/// or the context ends. Backoff sleeps also observe the context.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    ctx: &Context,
    operation: &'static str,
    mut call: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Failure>>,
{
    let attempts = policy.attempts();
    let mut attempt = 0;
    loop {
        attempt += 1;
        if let Some(err) = ctx.err() {
            return Err(RetryError::Cancelled(err));
        }

        let outcome = tokio::select! {
            biased;
            err = ctx.done() => return Err(RetryError::Cancelled(err)),
            outcome = call() => outcome,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(Failure::Terminal(err)) => return Err(RetryError::Terminal(err)),
            Err(Failure::Retryable(err)) => err,
        };

        metrics::counter!("retry_attempts_total", "operation" => operation).increment(1);
        if attempt >= attempts {
            return Err(RetryError::Exhausted {
                attempts,
                last: err,
            });
        }

        let delay = policy.delay_for(attempt);
        tracing::warn!(
            operation,
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying request"
        );
        tokio::select! {
            biased;
            err = ctx.done() => return Err(RetryError::Cancelled(err)),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

/// Like [`retry`], but exhaustion yields `fallback()` instead of an error.
///
/// Terminal failures and cancellation are still returned as errors.
pub async fn retry_or_fallback<T, F, Fut, D>(
    policy: &RetryPolicy,
    ctx: &Context,
    operation: &'static str,
    call: F,
    fallback: D,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Failure>>,
    D: FnOnce() -> T,
{
    match retry(policy, ctx, operation, call).await {
        Ok(value) => Ok(value),
        Err(RetryError::Exhausted { attempts, last }) => {
            metrics::counter!("retry_fallbacks_total", "operation" => operation).increment(1);
            tracing::error!(
                operation,
                attempts,
                error = %last,
                "all retries failed, falling back"
            );
            Ok(fallback())
        }
        Err(other) => Err(other.into()),
    }
}
