/// Job dispatcher
///
/// Routes each claimed job to its handler through a table keyed by
/// `(family, operation)`. Handlers are pure with respect to the dispatcher:
/// payload in, typed result out; side effects (persistence, cache
/// invalidation) belong to the handler. The dispatcher never lets a handler
/// failure or panic escape past its boundary.
use crate::modules::jobs::domain::entities::{JobFamily, JobOperation, JobRecord};
use crate::shared::errors::{AppError, AppResult};
use crate::{log_debug, log_error};
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub type JobRoute = (JobFamily, JobOperation);

/// A single job handler. Implementations receive the job payload and perform
/// their own side effects, awaiting anything (like cache invalidation) that
/// must land before the job counts as completed.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: &Value) -> AppResult<()>;
}

/// Outcome of dispatching one job. The worker decides between retry and
/// terminal failure based on the attached error.
#[derive(Debug)]
pub enum DispatchOutcome {
    Completed,
    Failed(AppError),
}

#[derive(Default)]
pub struct JobDispatcher {
    routes: HashMap<JobRoute, Arc<dyn JobHandler>>,
}

impl JobDispatcher {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    pub fn register(
        mut self,
        family: JobFamily,
        operation: JobOperation,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        self.routes.insert((family, operation), handler);
        self
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Run the matching handler under the job's deadline.
    ///
    /// A routing miss is a deploy/config mismatch, reported as the
    /// non-retryable `UnknownJobType`. Handler panics and untyped failures
    /// are converted to `ProcessingError` with the original error retained
    /// as cause; deadline overruns become `TimeoutError`.
    pub async fn dispatch(&self, job: &JobRecord) -> DispatchOutcome {
        let handler = match self.routes.get(&(job.family, job.operation)) {
            Some(handler) => handler,
            None => {
                log_error!(
                    "No handler registered for {}/{} (job {})",
                    job.family,
                    job.operation,
                    job.id
                );
                return DispatchOutcome::Failed(AppError::UnknownJobType {
                    family: job.family.to_string(),
                    operation: job.operation.to_string(),
                });
            }
        };

        log_debug!(
            "Dispatching job {} to {}/{} handler (deadline {}ms)",
            job.id,
            job.family,
            job.operation,
            job.timeout_ms
        );

        let guarded = AssertUnwindSafe(handler.handle(&job.payload)).catch_unwind();
        match tokio::time::timeout(job.timeout(), guarded).await {
            Ok(Ok(Ok(()))) => DispatchOutcome::Completed,
            Ok(Ok(Err(err))) => DispatchOutcome::Failed(Self::classify(err)),
            Ok(Err(panic)) => DispatchOutcome::Failed(AppError::ProcessingError {
                message: "Handler panicked".to_string(),
                cause: Some(panic_message(panic.as_ref())),
            }),
            Err(_) => DispatchOutcome::Failed(AppError::TimeoutError(format!(
                "Handler exceeded {}ms deadline",
                job.timeout_ms
            ))),
        }
    }

    /// Keep errors the retry policy understands; wrap everything else as a
    /// processing failure with the original retained as cause.
    fn classify(err: AppError) -> AppError {
        match err {
            err @ (AppError::ConnectionError(_)
            | AppError::SerializationError(_)
            | AppError::ValidationError(_)
            | AppError::ProcessingError { .. }
            | AppError::TimeoutError(_)
            | AppError::UnknownJobType { .. }) => err,
            other => AppError::ProcessingError {
                message: "Handler failed".to_string(),
                cause: Some(other.to_string()),
            },
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
