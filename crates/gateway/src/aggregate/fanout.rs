//! A task group for concurrent downstream fetches under one cancellable scope.

use std::future::Future;
use std::time::Instant;

use common::{Context, ServiceError};
use tokio::sync::oneshot;
use tokio::task::JoinSet;

/// Runs independent branches concurrently and fails fast.
///
/// All branches share a child of the caller's context. The first branch
/// error cancels that child once, so siblings still in flight abort, and
/// [`FanOut::wait`] returns only after every branch has been joined.
/// Dropping an unfinished group aborts its tasks.
pub struct FanOut {
    ctx: Context,
    tasks: JoinSet<Result<(), ServiceError>>,
    view: &'static str,
    started: Instant,
}

/// The value a branch produced, readable once the group has succeeded.
#[derive(Debug)]
pub struct Slot<T>(oneshot::Receiver<T>);

impl<T> Slot<T> {
    pub fn take(mut self) -> Result<T, ServiceError> {
        self.0
            .try_recv()
            .map_err(|_| ServiceError::internal("fan-out branch produced no value"))
    }
}

impl FanOut {
    pub fn new(parent: &Context, view: &'static str) -> Self {
        Self {
            ctx: parent.child(),
            tasks: JoinSet::new(),
            view,
            started: Instant::now(),
        }
    }

    /// Starts a branch. It receives the group's context and is abandoned
    /// as soon as that context is cancelled.
    pub fn spawn<T, F, Fut>(&mut self, branch: F) -> Slot<T>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let ctx = self.ctx.clone();
        let call = branch(ctx.clone());
        self.tasks.spawn(async move {
            let value = ctx.run(call).await?;
            // The receiver only disappears if the group was abandoned.
            let _ = tx.send(value);
            Ok(())
        });
        Slot(rx)
    }

    /// Joins every branch and returns the first failure observed, if any.
    pub async fn wait(mut self) -> Result<(), ServiceError> {
        let mut first_error = None;
        while let Some(joined) = self.tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| {
                Err(ServiceError::internal(format!("fan-out branch failed: {e}")))
            });
            match outcome {
                Err(err) if first_error.is_none() => {
                    tracing::debug!(
                        view = self.view,
                        error = %err,
                        "fan-out branch failed, cancelling siblings"
                    );
                    self.ctx.cancel();
                    first_error = Some(err);
                }
                _ => {}
            }
        }

        metrics::histogram!("fanout_duration_seconds", "view" => self.view)
            .record(self.started.elapsed().as_secs_f64());

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
