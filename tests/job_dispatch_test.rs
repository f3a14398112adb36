use async_trait::async_trait;
use serde_json::Value;
use sportsync::modules::cache::DomainType;
use sportsync::modules::jobs::{
    Job, JobDispatcher, JobFamily, JobHandler, JobOperation, JobStatus, MemoryQueueTransport,
    QueueCounts, QueueTransport, WorkerLifecycleManager,
};
use sportsync::shared::config::{RetryPolicy, WorkerConfig};
use sportsync::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> WorkerConfig {
    WorkerConfig {
        concurrency: 1,
        poll_interval: Duration::from_millis(10),
        throttle: Duration::ZERO,
        readiness_timeout: Duration::from_millis(500),
        shutdown_grace: Duration::from_millis(500),
        lock_duration: Duration::from_secs(5),
        chunk_size: 16,
    }
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
    }
}

async fn wait_for_counts(
    transport: &MemoryQueueTransport,
    predicate: impl Fn(&QueueCounts) -> bool,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let counts = transport.counts().await.unwrap();
        if predicate(&counts) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time: {:?}",
            counts
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

struct FailingHandler {
    error: AppError,
}

#[async_trait]
impl JobHandler for FailingHandler {
    async fn handle(&self, _payload: &Value) -> AppResult<()> {
        Err(self.error.clone())
    }
}

struct SlowHandler;

#[async_trait]
impl JobHandler for SlowHandler {
    async fn handle(&self, _payload: &Value) -> AppResult<()> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }
}

#[tokio::test]
async fn unknown_job_fails_terminally_without_retry() {
    let transport = Arc::new(MemoryQueueTransport::new());
    let dispatcher = Arc::new(JobDispatcher::new());
    let worker = WorkerLifecycleManager::new(
        transport.clone(),
        dispatcher,
        test_config(),
        fast_retry(3),
    );

    let record = transport
        .enqueue(Job::sync(JobFamily::Meta, DomainType::Phase, "1"))
        .await
        .unwrap();

    worker.start().await.unwrap();
    wait_for_counts(&transport, |counts| counts.failed == 1).await;
    worker.stop().await.unwrap();

    let snapshot = transport.job_record(record.id).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Failed);
    // Routing misses are configuration bugs, never retried.
    assert_eq!(snapshot.attempts_made, 1);
    assert!(snapshot
        .failed_reason
        .unwrap()
        .contains("Unknown job type: META/SYNC"));
}

#[tokio::test]
async fn validation_failure_is_not_retried() {
    let transport = Arc::new(MemoryQueueTransport::new());
    let dispatcher = Arc::new(JobDispatcher::new().register(
        JobFamily::Meta,
        JobOperation::Sync,
        Arc::new(FailingHandler {
            error: AppError::ValidationError("missing entity id".into()),
        }),
    ));
    let worker = WorkerLifecycleManager::new(
        transport.clone(),
        dispatcher,
        test_config(),
        fast_retry(3),
    );

    let record = transport
        .enqueue(Job::sync(JobFamily::Meta, DomainType::Phase, "1"))
        .await
        .unwrap();

    worker.start().await.unwrap();
    wait_for_counts(&transport, |counts| counts.failed == 1).await;
    worker.stop().await.unwrap();

    let snapshot = transport.job_record(record.id).await.unwrap();
    assert_eq!(snapshot.attempts_made, 1);
    assert_eq!(
        snapshot.failed_reason.unwrap(),
        "Validation error: missing entity id"
    );
}

#[tokio::test]
async fn retryable_failure_is_retried_until_max_attempts() {
    let transport = Arc::new(MemoryQueueTransport::new());
    let dispatcher = Arc::new(JobDispatcher::new().register(
        JobFamily::Meta,
        JobOperation::Sync,
        Arc::new(FailingHandler {
            error: AppError::processing_with_cause("upstream sync failed", "http 500"),
        }),
    ));
    let worker = WorkerLifecycleManager::new(
        transport.clone(),
        dispatcher,
        test_config(),
        fast_retry(3),
    );

    let record = transport
        .enqueue(Job::sync(JobFamily::Meta, DomainType::Phase, "1"))
        .await
        .unwrap();

    worker.start().await.unwrap();
    wait_for_counts(&transport, |counts| counts.failed == 1).await;
    worker.stop().await.unwrap();

    let snapshot = transport.job_record(record.id).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert_eq!(snapshot.attempts_made, 3);
    assert_eq!(
        snapshot.failed_reason.unwrap(),
        "upstream sync failed (cause: http 500)"
    );
}

#[tokio::test]
async fn deadline_overrun_is_retried_like_a_processing_failure() {
    let transport = Arc::new(MemoryQueueTransport::new());
    let dispatcher = Arc::new(JobDispatcher::new().register(
        JobFamily::Meta,
        JobOperation::Sync,
        Arc::new(SlowHandler),
    ));
    let worker = WorkerLifecycleManager::new(
        transport.clone(),
        dispatcher,
        test_config(),
        fast_retry(2),
    );

    let record = transport
        .enqueue(
            Job::sync(JobFamily::Meta, DomainType::Phase, "1")
                .with_max_attempts(2)
                .with_timeout(Duration::from_millis(20)),
        )
        .await
        .unwrap();

    worker.start().await.unwrap();
    wait_for_counts(&transport, |counts| counts.failed == 1).await;
    worker.stop().await.unwrap();

    let snapshot = transport.job_record(record.id).await.unwrap();
    assert_eq!(snapshot.attempts_made, 2);
    assert!(snapshot.failed_reason.unwrap().contains("deadline"));
}
