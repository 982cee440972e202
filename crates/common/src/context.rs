//! Per-request call context: outgoing metadata, deadline and cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;
use crate::identity::{Identity, Metadata};

/// Scope of one logical request as seen by a downstream call.
///
/// Clones share the same cancellation scope. [`Context::child`] derives a
/// sub-scope that is cancelled together with its parent but can also be
/// cancelled on its own.
#[derive(Debug, Clone)]
pub struct Context {
    metadata: Metadata,
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl Context {
    /// A root context with no deadline and no metadata.
    pub fn new() -> Self {
        Self {
            metadata: Metadata::new(),
            deadline: None,
            token: CancellationToken::new(),
        }
    }

    /// Returns a context carrying the caller's identity in its metadata.
    pub fn with_identity(mut self, identity: &Identity) -> Self {
        identity.write_to(&mut self.metadata);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Tightens the deadline to at most `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(current) if current < candidate => current,
            _ => candidate,
        });
        self
    }

    /// A sub-scope cancelled whenever this one is.
    pub fn child(&self) -> Self {
        Self {
            metadata: self.metadata.clone(),
            deadline: self.deadline,
            token: self.token.child_token(),
        }
    }

    /// Same metadata, but independent of this scope's cancellation and deadline.
    pub fn detached(&self) -> Self {
        Self {
            metadata: self.metadata.clone(),
            deadline: None,
            token: CancellationToken::new(),
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The propagated identity of the caller.
    pub fn identity(&self) -> Result<Identity, ServiceError> {
        Identity::from_metadata(&self.metadata)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns why this scope is finished, if it is.
    pub fn err(&self) -> Option<ServiceError> {
        if self.token.is_cancelled() {
            return Some(ServiceError::cancelled());
        }
        match self.deadline {
            Some(at) if Instant::now() >= at => Some(deadline_exceeded()),
            _ => None,
        }
    }

    /// Resolves once the scope is cancelled or its deadline passes.
    pub async fn done(&self) -> ServiceError {
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            () = self.token.cancelled() => ServiceError::cancelled(),
            () = expired => deadline_exceeded(),
        }
    }

    /// Runs a downstream call, abandoning it if the scope ends first.
    pub async fn run<T, F>(&self, call: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            result = call => result,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

fn deadline_exceeded() -> ServiceError {
    ServiceError::timeout("DEADLINE_EXCEEDED: deadline exceeded")
}
