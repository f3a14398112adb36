/// In-memory queue transport
///
/// Mirrors the Redis transport's at-least-once semantics behind a single
/// mutex. Used by the integration tests and by embedded deployments that
/// run without a broker. Test hooks cover the lifecycle paths that are hard
/// to provoke against a live broker: suppressed readiness and stalled
/// reports.
use crate::modules::jobs::domain::entities::{Job, JobRecord, JobStatus};
use crate::modules::jobs::domain::transport::{QueueCounts, QueueTransport, TransportEvent};
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    waiting: VecDeque<Uuid>,
    delayed: Vec<(DateTime<Utc>, Uuid)>,
    active: HashSet<Uuid>,
    jobs: HashMap<Uuid, JobRecord>,
    completed: u64,
    failed: u64,
    closed: bool,
}

impl Inner {
    /// Move due delayed jobs to the back of the waiting queue, earliest first.
    fn promote_due(&mut self) {
        let now = Utc::now();
        self.delayed.sort_by_key(|(run_at, _)| *run_at);

        while let Some((run_at, _)) = self.delayed.first() {
            if *run_at > now {
                break;
            }
            let (_, job_id) = self.delayed.remove(0);
            self.waiting.push_back(job_id);
        }
    }
}

pub struct MemoryQueueTransport {
    inner: Mutex<Inner>,
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    emit_ready: bool,
    run_requests: AtomicU32,
}

impl MemoryQueueTransport {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            events: Mutex::new(None),
            emit_ready: true,
            run_requests: AtomicU32::new(0),
        }
    }

    /// Test hook: a transport whose `run()` never reports ready, for
    /// exercising the worker's readiness timeout.
    pub fn with_ready_suppressed() -> Self {
        Self {
            emit_ready: false,
            ..Self::new()
        }
    }

    /// How many run requests the worker has issued; an idempotent `start()`
    /// must not add one.
    pub fn run_requests(&self) -> u32 {
        self.run_requests.load(Ordering::SeqCst)
    }

    /// Test hook: report an active job as stalled.
    pub async fn report_stalled(&self, job_id: Uuid) {
        self.emit(TransportEvent::Stalled { job_id }).await;
    }

    /// Test hook: emit a transport-level error event.
    pub async fn report_error(&self, reason: impl Into<String>) {
        self.emit(TransportEvent::Error(reason.into())).await;
    }

    /// Snapshot of one job's record, for assertions on status and reason.
    pub async fn job_record(&self, job_id: Uuid) -> Option<JobRecord> {
        self.inner.lock().await.jobs.get(&job_id).cloned()
    }

    async fn emit(&self, event: TransportEvent) {
        let guard = self.events.lock().await;
        if let Some(sender) = guard.as_ref() {
            let _ = sender.try_send(event);
        }
    }
}

impl Default for MemoryQueueTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueTransport for MemoryQueueTransport {
    async fn run(&self) -> AppResult<mpsc::Receiver<TransportEvent>> {
        self.run_requests.fetch_add(1, Ordering::SeqCst);

        let (sender, receiver) = mpsc::channel(64);
        self.inner.lock().await.closed = false;
        *self.events.lock().await = Some(sender.clone());

        if self.emit_ready {
            let _ = sender.try_send(TransportEvent::Ready);
        }

        Ok(receiver)
    }

    async fn close(&self, _grace: Duration) -> AppResult<()> {
        self.emit(TransportEvent::Closing).await;
        self.inner.lock().await.closed = true;
        self.emit(TransportEvent::Closed).await;
        // Dropping the sender ends the worker's event stream.
        *self.events.lock().await = None;
        Ok(())
    }

    async fn enqueue(&self, job: Job) -> AppResult<JobRecord> {
        let record = JobRecord::from_job(&job);
        let mut inner = self.inner.lock().await;
        inner.jobs.insert(record.id, record.clone());
        inner.waiting.push_back(record.id);
        Ok(record)
    }

    async fn schedule(&self, job: Job, delay: Duration) -> AppResult<JobRecord> {
        let record = JobRecord::from_job(&job);
        let run_at = Utc::now()
            + chrono::Duration::from_std(delay)
                .map_err(|e| AppError::ValidationError(format!("Invalid delay: {}", e)))?;

        let mut inner = self.inner.lock().await;
        inner.jobs.insert(record.id, record.clone());
        inner.delayed.push((run_at, record.id));
        Ok(record)
    }

    async fn remove(&self, job_id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        if inner.active.contains(&job_id) {
            return Ok(false);
        }

        let waiting_before = inner.waiting.len();
        inner.waiting.retain(|id| *id != job_id);
        let delayed_before = inner.delayed.len();
        inner.delayed.retain(|(_, id)| *id != job_id);

        let removed =
            inner.waiting.len() < waiting_before || inner.delayed.len() < delayed_before;
        if removed {
            inner.jobs.remove(&job_id);
        }
        Ok(removed)
    }

    async fn claim_next(&self) -> AppResult<Option<JobRecord>> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Ok(None);
        }

        inner.promote_due();

        let job_id = match inner.waiting.pop_front() {
            Some(job_id) => job_id,
            None => return Ok(None),
        };

        let record = inner
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::InternalError(format!("Job {} has no record", job_id)))?;
        record.attempts_made += 1;
        record.status = JobStatus::Running;
        let claimed = record.clone();

        inner.active.insert(job_id);
        Ok(Some(claimed))
    }

    async fn mark_completed(&self, job_id: Uuid) -> AppResult<()> {
        {
            let mut inner = self.inner.lock().await;
            inner.active.remove(&job_id);
            if let Some(record) = inner.jobs.get_mut(&job_id) {
                record.status = JobStatus::Completed;
            }
            inner.completed += 1;
        }
        self.emit(TransportEvent::Completed { job_id }).await;
        Ok(())
    }

    async fn retry(&self, job_id: Uuid, delay: Duration) -> AppResult<()> {
        let run_at = Utc::now()
            + chrono::Duration::from_std(delay)
                .map_err(|e| AppError::ValidationError(format!("Invalid delay: {}", e)))?;

        let mut inner = self.inner.lock().await;
        inner.active.remove(&job_id);
        if let Some(record) = inner.jobs.get_mut(&job_id) {
            record.status = JobStatus::Pending;
        }
        inner.delayed.push((run_at, job_id));
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, reason: &str) -> AppResult<()> {
        {
            let mut inner = self.inner.lock().await;
            inner.active.remove(&job_id);
            if let Some(record) = inner.jobs.get_mut(&job_id) {
                record.status = JobStatus::Failed;
                record.failed_reason = Some(reason.to_string());
            }
            inner.failed += 1;
        }
        self.emit(TransportEvent::Failed {
            job_id,
            reason: reason.to_string(),
        })
        .await;
        Ok(())
    }

    async fn counts(&self) -> AppResult<QueueCounts> {
        let inner = self.inner.lock().await;
        Ok(QueueCounts {
            waiting: inner.waiting.len() as u64,
            active: inner.active.len() as u64,
            completed: inner.completed,
            failed: inner.failed,
            delayed: inner.delayed.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::cache::domain::DomainType;
    use crate::modules::jobs::domain::entities::JobFamily;

    #[tokio::test]
    async fn claim_is_fifo_and_increments_attempts() {
        let transport = MemoryQueueTransport::new();
        let first = transport
            .enqueue(Job::sync(JobFamily::Meta, DomainType::Phase, "1"))
            .await
            .unwrap();
        let second = transport
            .enqueue(Job::sync(JobFamily::Meta, DomainType::Phase, "2"))
            .await
            .unwrap();

        let claimed = transport.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.attempts_made, 1);
        assert_eq!(claimed.status, JobStatus::Running);

        let claimed = transport.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, second.id);

        assert!(transport.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scheduled_jobs_are_invisible_until_due() {
        let transport = MemoryQueueTransport::new();
        let record = transport
            .schedule(
                Job::sync(JobFamily::Meta, DomainType::Phase, "1"),
                Duration::from_millis(30),
            )
            .await
            .unwrap();

        assert!(transport.claim_next().await.unwrap().is_none());
        assert_eq!(transport.counts().await.unwrap().delayed, 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let claimed = transport.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, record.id);
    }

    #[tokio::test]
    async fn remove_skips_active_jobs() {
        let transport = MemoryQueueTransport::new();
        let record = transport
            .enqueue(Job::sync(JobFamily::Meta, DomainType::Phase, "1"))
            .await
            .unwrap();

        transport.claim_next().await.unwrap().unwrap();
        assert!(!transport.remove(record.id).await.unwrap());

        let waiting = transport
            .enqueue(Job::sync(JobFamily::Meta, DomainType::Phase, "2"))
            .await
            .unwrap();
        assert!(transport.remove(waiting.id).await.unwrap());
    }

    #[tokio::test]
    async fn outcome_transitions_update_counts() {
        let transport = MemoryQueueTransport::new();
        let record = transport
            .enqueue(Job::sync(JobFamily::Meta, DomainType::Phase, "1"))
            .await
            .unwrap();

        transport.claim_next().await.unwrap().unwrap();
        transport.mark_completed(record.id).await.unwrap();

        let counts = transport.counts().await.unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.active, 0);

        let snapshot = transport.job_record(record.id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);
    }
}
