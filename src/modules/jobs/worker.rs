/// Worker lifecycle manager
///
/// Owns the queue transport for one job family and drives the lifecycle
/// state machine Idle → Starting → Running → Stopping → Stopped, with
/// Errored reachable from any state on an unrecoverable transport fault.
/// Transport events arrive on a channel and are consumed by a single event
/// loop; claimed jobs are handed to the dispatcher under a concurrency
/// limit, and retryable failures are rescheduled with backoff.
use crate::modules::jobs::dispatcher::{DispatchOutcome, JobDispatcher};
use crate::modules::jobs::domain::entities::JobRecord;
use crate::modules::jobs::domain::transport::{QueueTransport, TransportEvent};
use crate::shared::config::{RetryPolicy, WorkerConfig};
use crate::shared::errors::{AppError, AppResult};
use crate::{log_debug, log_error, log_info, log_warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifecycle states for a worker bound to one job-family queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Errored,
}

/// Running/closing flags owned by the manager. Both may only be true
/// together while a graceful shutdown is in progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerFlags {
    pub is_running: bool,
    pub is_closing: bool,
}

/// Worker statistics for monitoring
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerStatistics {
    pub is_running: bool,
    pub waiting_jobs: u64,
    pub active_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub delayed_jobs: u64,
}

/// Everything a spawned processing task needs, cloned out of the manager so
/// the loops own their dependencies.
#[derive(Clone)]
struct JobContext {
    transport: Arc<dyn QueueTransport>,
    dispatcher: Arc<JobDispatcher>,
    retry_policy: RetryPolicy,
    abandoned: Arc<AtomicBool>,
}

pub struct WorkerLifecycleManager {
    transport: Arc<dyn QueueTransport>,
    dispatcher: Arc<JobDispatcher>,
    config: WorkerConfig,
    retry_policy: RetryPolicy,
    state: Arc<RwLock<WorkerState>>,
    flags: Arc<RwLock<WorkerFlags>>,
    /// Permits bound the number of concurrently running handlers; draining
    /// them during stop() waits out in-flight jobs.
    in_flight: Arc<Semaphore>,
    /// Raised only once the shutdown grace period expires with handlers still
    /// running; from then on their outcome writes are discarded and the
    /// transport redelivers. Handlers finishing within grace write normally.
    abandoned: Arc<AtomicBool>,
    /// Serializes start()/stop(); the second caller observes the state the
    /// first one reached instead of racing the transport.
    lifecycle: Mutex<()>,
    shutdown: Mutex<Option<CancellationToken>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerLifecycleManager {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        dispatcher: Arc<JobDispatcher>,
        config: WorkerConfig,
        retry_policy: RetryPolicy,
    ) -> Self {
        let concurrency = config.concurrency.max(1);
        Self {
            transport,
            dispatcher,
            config,
            retry_policy,
            state: Arc::new(RwLock::new(WorkerState::Idle)),
            flags: Arc::new(RwLock::new(WorkerFlags::default())),
            in_flight: Arc::new(Semaphore::new(concurrency)),
            abandoned: Arc::new(AtomicBool::new(false)),
            lifecycle: Mutex::new(()),
            shutdown: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub async fn flags(&self) -> WorkerFlags {
        *self.flags.read().await
    }

    pub async fn is_running(&self) -> bool {
        self.flags.read().await.is_running
    }

    /// Start the worker.
    ///
    /// Issues a run request to the transport and waits, bounded by the
    /// readiness timeout, for it to report ready. Idempotent: starting an
    /// already-running worker returns success without re-issuing the run
    /// request. A worker in `Errored` recovers here by re-running the
    /// transport on the same manager instance.
    pub async fn start(&self) -> AppResult<()> {
        let _lifecycle = self.lifecycle.lock().await;

        if *self.state.read().await == WorkerState::Running {
            log_debug!("Worker already running; start() is a no-op");
            return Ok(());
        }

        // Leftovers from a previous run or failed start.
        if let Some(stale) = self.shutdown.lock().await.take() {
            stale.cancel();
        }
        self.reap_finished_tasks().await;

        self.set_state(WorkerState::Starting).await;

        let mut events = match self.transport.run().await {
            Ok(events) => events,
            Err(e) => {
                log_error!("Transport run request failed: {}", e);
                self.set_state(WorkerState::Errored).await;
                return Err(e);
            }
        };

        match tokio::time::timeout(self.config.readiness_timeout, await_ready(&mut events)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log_error!("Transport reported an error during startup: {}", e);
                self.set_state(WorkerState::Errored).await;
                return Err(e);
            }
            Err(_) => {
                let timeout_ms = self.config.readiness_timeout.as_millis() as u64;
                log_error!("Worker start timed out after {}ms waiting for ready", timeout_ms);
                self.set_state(WorkerState::Errored).await;
                return Err(AppError::WorkerStartTimeout(timeout_ms));
            }
        }

        self.set_state(WorkerState::Running).await;
        {
            let mut flags = self.flags.write().await;
            flags.is_running = true;
            flags.is_closing = false;
        }

        let token = CancellationToken::new();
        *self.shutdown.lock().await = Some(token.clone());
        self.abandoned.store(false, Ordering::SeqCst);

        let context = JobContext {
            transport: Arc::clone(&self.transport),
            dispatcher: Arc::clone(&self.dispatcher),
            retry_policy: self.retry_policy,
            abandoned: Arc::clone(&self.abandoned),
        };

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(event_loop(
            events,
            token.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.flags),
        )));
        tasks.push(tokio::spawn(claim_loop(
            context,
            self.config.clone(),
            Arc::clone(&self.in_flight),
            token,
        )));

        log_info!("Worker started (concurrency: {})", self.config.concurrency.max(1));
        Ok(())
    }

    /// Stop the worker gracefully.
    ///
    /// Stops claiming new jobs, asks the transport to close, then waits out
    /// the shutdown grace period for in-flight handlers. Handlers still
    /// running after the grace period are abandoned; their outcome writes
    /// are discarded and the transport redelivers those jobs later.
    /// Idempotent: stopping a stopped worker is a no-op.
    pub async fn stop(&self) -> AppResult<()> {
        let _lifecycle = self.lifecycle.lock().await;

        if matches!(
            *self.state.read().await,
            WorkerState::Stopped | WorkerState::Idle
        ) {
            log_debug!("Worker not running; stop() is a no-op");
            return Ok(());
        }

        self.set_state(WorkerState::Stopping).await;
        self.flags.write().await.is_closing = true;

        if let Some(token) = self.shutdown.lock().await.take() {
            token.cancel();
        }

        if let Err(e) = self.transport.close(self.config.shutdown_grace).await {
            log_warn!("Transport close reported an error: {}", e);
        }

        // Drain the concurrency permits: all of them free means no handler
        // is still in flight. Handlers finishing within the grace period get
        // their outcome writes through before the drain completes.
        let concurrency = self.config.concurrency.max(1) as u32;
        let drain = Arc::clone(&self.in_flight).acquire_many_owned(concurrency);
        match tokio::time::timeout(self.config.shutdown_grace, drain).await {
            Ok(Ok(permits)) => drop(permits),
            Ok(Err(_)) => {}
            Err(_) => {
                self.abandoned.store(true, Ordering::SeqCst);
                log_warn!(
                    "In-flight job(s) still running after {:?} grace period; abandoning",
                    self.config.shutdown_grace
                );
            }
        }

        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }

        self.set_state(WorkerState::Stopped).await;
        {
            let mut flags = self.flags.write().await;
            flags.is_running = false;
            flags.is_closing = false;
        }

        log_info!("Worker stopped");
        Ok(())
    }

    /// Get statistics about the worker and its queue
    pub async fn statistics(&self) -> AppResult<WorkerStatistics> {
        let counts = self.transport.counts().await?;
        let flags = self.flags.read().await;

        Ok(WorkerStatistics {
            is_running: flags.is_running,
            waiting_jobs: counts.waiting,
            active_jobs: counts.active,
            completed_jobs: counts.completed,
            failed_jobs: counts.failed,
            delayed_jobs: counts.delayed,
        })
    }

    async fn set_state(&self, next: WorkerState) {
        let mut state = self.state.write().await;
        log_debug!("Worker state: {:?} -> {:?}", *state, next);
        *state = next;
    }

    async fn reap_finished_tasks(&self) {
        self.tasks.lock().await.retain(|task| !task.is_finished());
    }
}

/// Wait for the transport to report ready; a transport error or a closed
/// channel ends the wait early.
async fn await_ready(events: &mut mpsc::Receiver<TransportEvent>) -> AppResult<()> {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Ready => return Ok(()),
            TransportEvent::Error(reason) => return Err(AppError::ConnectionError(reason)),
            other => log_debug!("Ignoring transport event before ready: {:?}", other),
        }
    }
    Err(AppError::ConnectionError(
        "Transport event channel closed before ready".to_string(),
    ))
}

/// Single consumer of transport lifecycle events.
async fn event_loop(
    mut events: mpsc::Receiver<TransportEvent>,
    token: CancellationToken,
    state: Arc<RwLock<WorkerState>>,
    flags: Arc<RwLock<WorkerFlags>>,
) {
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            TransportEvent::Stalled { job_id } => {
                // Not our retry to make: the transport redelivers per its
                // stalled-job policy.
                log_warn!("Job {} stalled (lock expired without progress)", job_id);
            }
            TransportEvent::Error(reason) => {
                log_error!("Unrecoverable transport error: {}", reason);
                *state.write().await = WorkerState::Errored;
                flags.write().await.is_running = false;
                // Take the claim loop down with us; an errored worker must
                // not keep claiming jobs.
                token.cancel();
                break;
            }
            TransportEvent::Completed { job_id } => {
                log_debug!("Transport acknowledged completion of job {}", job_id);
            }
            TransportEvent::Failed { job_id, reason } => {
                log_debug!("Transport recorded failure of job {}: {}", job_id, reason);
            }
            TransportEvent::Closing => log_debug!("Transport closing"),
            TransportEvent::Closed => log_debug!("Transport closed"),
            TransportEvent::Ready => log_debug!("Transport re-reported ready"),
        }
    }
}

/// Claims jobs from the transport and spawns processing tasks, bounded by
/// the in-flight semaphore. Roughly FIFO at concurrency 1; no cross-job
/// ordering beyond that.
async fn claim_loop(
    context: JobContext,
    config: WorkerConfig,
    in_flight: Arc<Semaphore>,
    token: CancellationToken,
) {
    loop {
        let permit = tokio::select! {
            _ = token.cancelled() => break,
            permit = Arc::clone(&in_flight).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let claimed = tokio::select! {
            _ = token.cancelled() => break,
            claimed = context.transport.claim_next() => claimed,
        };

        match claimed {
            Ok(Some(job)) => {
                let job_context = context.clone();
                tokio::spawn(async move {
                    process_job(&job_context, job).await;
                    drop(permit);
                });

                if !config.throttle.is_zero() {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(config.throttle) => {}
                    }
                }
            }
            Ok(None) => {
                drop(permit);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(config.poll_interval) => {}
                }
            }
            Err(e) => {
                drop(permit);
                log_error!("Failed to claim next job: {}", e);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(config.poll_interval) => {}
                }
            }
        }
    }
}

/// Dispatch one job and write its outcome back to the transport.
async fn process_job(context: &JobContext, job: JobRecord) {
    log_info!(
        "Processing job {} ({}/{}, attempt {}/{})",
        job.id,
        job.family,
        job.operation,
        job.attempts_made,
        job.max_attempts
    );

    let outcome = context.dispatcher.dispatch(&job).await;

    if context.abandoned.load(Ordering::SeqCst) {
        // The shutdown grace period expired while this handler ran; the
        // transport redelivers the job to a future worker, so the outcome
        // write is dropped on purpose.
        log_debug!("Discarding outcome of job {} abandoned at shutdown", job.id);
        return;
    }

    match outcome {
        DispatchOutcome::Completed => {
            match context.transport.mark_completed(job.id).await {
                Ok(()) => log_info!("Job {} completed successfully", job.id),
                Err(e) => log_error!("Failed to mark job {} as completed: {}", job.id, e),
            }
        }
        DispatchOutcome::Failed(err) => {
            let reason = err.failed_reason();

            if err.is_retryable() && job.can_retry() {
                let delay = context.retry_policy.delay_for_attempt(job.attempts_made);
                log_warn!(
                    "Job {} failed (attempt {}/{}), retrying in {:?}: {}",
                    job.id,
                    job.attempts_made,
                    job.max_attempts,
                    delay,
                    reason
                );
                if let Err(e) = context.transport.retry(job.id, delay).await {
                    log_error!("Failed to schedule retry for job {}: {}", job.id, e);
                }
            } else {
                log_error!(
                    "Job {} failed permanently after {} attempt(s): {}",
                    job.id,
                    job.attempts_made,
                    reason
                );
                if let Err(e) = context.transport.mark_failed(job.id, &reason).await {
                    log_error!("Failed to mark job {} as failed: {}", job.id, e);
                }
            }
        }
    }
}
