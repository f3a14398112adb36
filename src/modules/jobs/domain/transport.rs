/// Queue transport contract
///
/// The worker lifecycle manager owns one transport per job family. Lifecycle
/// is event-driven: `run()` hands back an mpsc channel and the transport
/// reports `Ready`, `Error`, `Stalled` and terminal job outcomes on it, so
/// state transitions happen in one event-processing loop instead of ad-hoc
/// listener callbacks mutating shared state.
use crate::modules::jobs::domain::entities::{Job, JobRecord};
use crate::shared::errors::AppResult;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Lifecycle events surfaced by a queue transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The transport is connected and delivering jobs.
    Ready,
    /// Unrecoverable transport fault; the worker transitions to Errored.
    Error(String),
    /// A claimed job stopped renewing its lock; it will be redelivered.
    Stalled { job_id: Uuid },
    Completed { job_id: Uuid },
    Failed { job_id: Uuid, reason: String },
    Closing,
    Closed,
}

/// Queue depth and outcome counters, the backpressure metadata consumed by
/// the worker manager and operational tooling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
}

#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Begin delivering jobs. Events flow on the returned channel; a `Ready`
    /// event signals the transport is live, `Error` that startup failed.
    /// Callable again after `close()` (reconnect) on the same instance.
    async fn run(&self) -> AppResult<mpsc::Receiver<TransportEvent>>;

    /// Graceful close: stop handing out jobs, then report `Closed`. In-flight
    /// jobs are left to the stalled-job policy of the next run.
    async fn close(&self, grace: Duration) -> AppResult<()>;

    /// Enqueue a job for immediate delivery.
    async fn enqueue(&self, job: Job) -> AppResult<JobRecord>;

    /// Enqueue a job for delivery no earlier than `delay` from now.
    async fn schedule(&self, job: Job, delay: Duration) -> AppResult<JobRecord>;

    /// Remove a job that has not been claimed yet. Returns false if the job
    /// is unknown or already active.
    async fn remove(&self, job_id: Uuid) -> AppResult<bool>;

    /// Claim the next waiting job for exclusive processing; increments its
    /// `attempts_made`. Returns `None` when the queue is empty.
    async fn claim_next(&self) -> AppResult<Option<JobRecord>>;

    async fn mark_completed(&self, job_id: Uuid) -> AppResult<()>;

    /// Re-deliver a claimed job after `delay` (retry with backoff).
    async fn retry(&self, job_id: Uuid, delay: Duration) -> AppResult<()>;

    /// Terminal failure after exhausted retries; `reason` is operator-facing.
    async fn mark_failed(&self, job_id: Uuid, reason: &str) -> AppResult<()>;

    async fn counts(&self) -> AppResult<QueueCounts>;
}
