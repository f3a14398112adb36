/// Producer-side queue adapter
///
/// Thin wrapper over the transport for code that enqueues work without
/// owning a worker: routing layers, schedulers, operational tooling. Exposes
/// the queue depth metadata used for backpressure decisions.
use crate::modules::jobs::domain::entities::{Job, JobRecord};
use crate::modules::jobs::domain::transport::{QueueCounts, QueueTransport};
use crate::shared::errors::AppResult;
use crate::log_debug;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone)]
pub struct QueueAdapter {
    transport: Arc<dyn QueueTransport>,
}

impl QueueAdapter {
    pub fn new(transport: Arc<dyn QueueTransport>) -> Self {
        Self { transport }
    }

    pub async fn enqueue(&self, job: Job) -> AppResult<JobRecord> {
        let record = self.transport.enqueue(job).await?;
        log_debug!(
            "Enqueued job {} ({}/{})",
            record.id,
            record.family,
            record.operation
        );
        Ok(record)
    }

    /// Enqueue for delivery no earlier than `delay` from now.
    pub async fn schedule(&self, job: Job, delay: Duration) -> AppResult<JobRecord> {
        let record = self.transport.schedule(job, delay).await?;
        log_debug!(
            "Scheduled job {} ({}/{}) in {:?}",
            record.id,
            record.family,
            record.operation,
            delay
        );
        Ok(record)
    }

    /// Remove a not-yet-claimed job. Returns false if it is unknown or
    /// already active.
    pub async fn remove(&self, job_id: Uuid) -> AppResult<bool> {
        self.transport.remove(job_id).await
    }

    /// Waiting/active/completed/failed/delayed depths for backpressure and
    /// operator dashboards.
    pub async fn counts(&self) -> AppResult<QueueCounts> {
        self.transport.counts().await
    }
}
