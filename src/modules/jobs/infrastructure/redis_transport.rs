/// Redis-backed queue transport
///
/// One logical queue per job family:
///   `<prefix>:queue:<family>:waiting`  list of job ids, LPUSH/RPOPLPUSH
///   `<prefix>:queue:<family>:active`   list of claimed job ids
///   `<prefix>:queue:<family>:delayed`  ZSET scored by due time (ms)
///   `<prefix>:queue:<family>:jobs`     hash id -> stored job JSON
///   `<prefix>:queue:<family>:lock:<id>` claim lock with PX expiry
///   `<prefix>:queue:<family>:completed` / `:failed` outcome counters
///
/// Delivery is at-least-once: a claimed job whose lock expires without
/// progress is moved back to waiting by the stalled checker and reported as
/// a `Stalled` event, so a future worker picks it up again.
use crate::modules::jobs::domain::entities::{Job, JobEnvelope, JobRecord, JobStatus};
use crate::modules::jobs::domain::transport::{QueueCounts, QueueTransport, TransportEvent};
use crate::shared::config::{RedisConfig, WorkerConfig};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::connection::connect_with_retries;
use crate::{log_debug, log_warn};
use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Job form persisted in the jobs hash: bookkeeping around the wire envelope.
#[derive(Debug, Serialize, Deserialize)]
struct StoredJob {
    id: Uuid,
    envelope: JobEnvelope,
    attempts_made: u32,
    max_attempts: u32,
    timeout_ms: u64,
    status: JobStatus,
    failed_reason: Option<String>,
}

impl StoredJob {
    fn from_record(record: &JobRecord) -> AppResult<Self> {
        Ok(Self {
            id: record.id,
            envelope: record.to_envelope()?,
            attempts_made: record.attempts_made,
            max_attempts: record.max_attempts,
            timeout_ms: record.timeout_ms,
            status: record.status,
            failed_reason: record.failed_reason.clone(),
        })
    }

    fn into_record(self) -> AppResult<JobRecord> {
        let (family, operation, payload) = JobRecord::parts_from_envelope(&self.envelope)?;
        Ok(JobRecord {
            id: self.id,
            family,
            operation,
            payload,
            enqueued_at: self.envelope.timestamp,
            attempts_made: self.attempts_made,
            max_attempts: self.max_attempts,
            timeout_ms: self.timeout_ms,
            status: self.status,
            failed_reason: self.failed_reason,
        })
    }
}

pub struct RedisQueueTransport {
    client: Arc<Client>,
    base_key: String,
    max_retries: Option<u32>,
    lock_duration: Duration,
    chunk_size: usize,
    events: Arc<Mutex<Option<mpsc::Sender<TransportEvent>>>>,
    stalled_task: Mutex<Option<JoinHandle<()>>>,
}

impl RedisQueueTransport {
    pub fn new(
        redis: &RedisConfig,
        worker: &WorkerConfig,
        family: crate::modules::jobs::domain::entities::JobFamily,
    ) -> AppResult<Self> {
        let client = Client::open(redis.url())
            .map_err(|e| AppError::ConnectionError(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            base_key: format!("{}:queue:{}", redis.key_prefix, family.queue_segment()),
            max_retries: redis.max_retries_per_request,
            lock_duration: worker.lock_duration,
            chunk_size: worker.chunk_size.max(1),
            events: Arc::new(Mutex::new(None)),
            stalled_task: Mutex::new(None),
        })
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.base_key, suffix)
    }

    fn lock_key(&self, job_id: Uuid) -> String {
        format!("{}:lock:{}", self.base_key, job_id)
    }

    async fn conn(&self) -> AppResult<redis::aio::Connection> {
        connect_with_retries(&self.client, self.max_retries).await
    }

    async fn load(
        &self,
        conn: &mut redis::aio::Connection,
        job_id: Uuid,
    ) -> AppResult<Option<JobRecord>> {
        let raw: Option<String> = conn
            .hget(self.key("jobs"), job_id.to_string())
            .await
            .map_err(AppError::from)?;

        match raw {
            Some(json) => {
                let stored: StoredJob = serde_json::from_str(&json)?;
                Ok(Some(stored.into_record()?))
            }
            None => Ok(None),
        }
    }

    async fn store(
        &self,
        conn: &mut redis::aio::Connection,
        record: &JobRecord,
    ) -> AppResult<()> {
        let stored = StoredJob::from_record(record)?;
        let json = serde_json::to_string(&stored)?;
        let _: () = conn
            .hset(self.key("jobs"), record.id.to_string(), json)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    /// Move due delayed jobs back into the waiting list, bounded per call.
    async fn promote_due(&self, conn: &mut redis::aio::Connection) -> AppResult<()> {
        let now_ms = Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore_limit(
                self.key("delayed"),
                "-inf",
                now_ms,
                0,
                self.chunk_size as isize,
            )
            .await
            .map_err(AppError::from)?;

        for job_id in due {
            let _: () = conn
                .zrem(self.key("delayed"), &job_id)
                .await
                .map_err(AppError::from)?;
            let _: () = conn
                .lpush(self.key("waiting"), &job_id)
                .await
                .map_err(AppError::from)?;
        }
        Ok(())
    }

    /// Remove a job from the active list and release its claim lock.
    async fn release(&self, conn: &mut redis::aio::Connection, job_id: Uuid) -> AppResult<()> {
        let _: () = conn
            .lrem(self.key("active"), 0, job_id.to_string())
            .await
            .map_err(AppError::from)?;
        let _: () = conn
            .del(self.lock_key(job_id))
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    async fn emit(&self, event: TransportEvent) {
        let guard = self.events.lock().await;
        if let Some(sender) = guard.as_ref() {
            let _ = sender.try_send(event);
        }
    }

    /// Periodically sweep the active list for jobs whose claim lock expired
    /// and move them back to waiting for redelivery.
    fn spawn_stalled_checker(&self, sender: mpsc::Sender<TransportEvent>) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        let active_key = self.key("active");
        let waiting_key = self.key("waiting");
        let lock_prefix = format!("{}:lock:", self.base_key);
        let interval = self.lock_duration.max(Duration::from_millis(500)) / 2;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if sender.is_closed() {
                    break;
                }

                let mut conn = match client.get_async_connection().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        log_warn!("Stalled checker could not reach Redis: {}", e);
                        continue;
                    }
                };

                let active: Vec<String> = match conn.lrange(&active_key, 0, -1).await {
                    Ok(ids) => ids,
                    Err(e) => {
                        log_warn!("Stalled checker failed to read active list: {}", e);
                        continue;
                    }
                };

                for raw_id in active {
                    let locked: bool = conn
                        .exists(format!("{}{}", lock_prefix, raw_id))
                        .await
                        .unwrap_or(true);
                    if locked {
                        continue;
                    }

                    // Lock expired without progress: redeliver.
                    let _: Result<(), _> = conn.lrem(&active_key, 0, &raw_id).await;
                    let _: Result<(), _> = conn.lpush(&waiting_key, &raw_id).await;

                    if let Ok(job_id) = raw_id.parse::<Uuid>() {
                        let _ = sender.try_send(TransportEvent::Stalled { job_id });
                    }
                }
            }
        })
    }
}

#[async_trait]
impl QueueTransport for RedisQueueTransport {
    async fn run(&self) -> AppResult<mpsc::Receiver<TransportEvent>> {
        let (sender, receiver) = mpsc::channel(64);
        *self.events.lock().await = Some(sender.clone());

        // Probe the connection off the caller's await; the worker learns the
        // result through the Ready/Error event.
        let client = Arc::clone(&self.client);
        let startup_sender = sender.clone();
        tokio::spawn(async move {
            let probe = async {
                let mut conn = client.get_async_connection().await?;
                redis::cmd("PING").query_async::<_, String>(&mut conn).await
            };
            match probe.await {
                Ok(_) => {
                    let _ = startup_sender.send(TransportEvent::Ready).await;
                }
                Err(e) => {
                    let _ = startup_sender
                        .send(TransportEvent::Error(format!("Redis unreachable: {}", e)))
                        .await;
                }
            }
        });

        let checker = self.spawn_stalled_checker(sender);
        if let Some(previous) = self.stalled_task.lock().await.replace(checker) {
            previous.abort();
        }

        Ok(receiver)
    }

    async fn close(&self, _grace: Duration) -> AppResult<()> {
        self.emit(TransportEvent::Closing).await;

        if let Some(checker) = self.stalled_task.lock().await.take() {
            checker.abort();
        }

        self.emit(TransportEvent::Closed).await;
        *self.events.lock().await = None;
        log_debug!("Redis transport for {} closed", self.base_key);
        Ok(())
    }

    async fn enqueue(&self, job: Job) -> AppResult<JobRecord> {
        let record = JobRecord::from_job(&job);
        let mut conn = self.conn().await?;

        self.store(&mut conn, &record).await?;
        let _: () = conn
            .lpush(self.key("waiting"), record.id.to_string())
            .await
            .map_err(AppError::from)?;

        Ok(record)
    }

    async fn schedule(&self, job: Job, delay: Duration) -> AppResult<JobRecord> {
        let record = JobRecord::from_job(&job);
        let run_at_ms = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let mut conn = self.conn().await?;

        self.store(&mut conn, &record).await?;
        let _: () = conn
            .zadd(self.key("delayed"), record.id.to_string(), run_at_ms)
            .await
            .map_err(AppError::from)?;

        Ok(record)
    }

    async fn remove(&self, job_id: Uuid) -> AppResult<bool> {
        let mut conn = self.conn().await?;

        let from_waiting: i64 = conn
            .lrem(self.key("waiting"), 0, job_id.to_string())
            .await
            .map_err(AppError::from)?;
        let from_delayed: i64 = conn
            .zrem(self.key("delayed"), job_id.to_string())
            .await
            .map_err(AppError::from)?;

        let removed = from_waiting > 0 || from_delayed > 0;
        if removed {
            let _: () = conn
                .hdel(self.key("jobs"), job_id.to_string())
                .await
                .map_err(AppError::from)?;
        }
        Ok(removed)
    }

    async fn claim_next(&self) -> AppResult<Option<JobRecord>> {
        let mut conn = self.conn().await?;

        self.promote_due(&mut conn).await?;

        let claimed: Option<String> = conn
            .rpoplpush(self.key("waiting"), self.key("active"))
            .await
            .map_err(AppError::from)?;

        let raw_id = match claimed {
            Some(raw_id) => raw_id,
            None => return Ok(None),
        };
        let job_id: Uuid = raw_id
            .parse()
            .map_err(|e| AppError::InternalError(format!("Corrupt job id '{}': {}", raw_id, e)))?;

        let mut record = self.load(&mut conn, job_id).await?.ok_or_else(|| {
            AppError::InternalError(format!("Job {} has no stored record", job_id))
        })?;
        record.attempts_made += 1;
        record.status = JobStatus::Running;
        self.store(&mut conn, &record).await?;

        let _: () = conn
            .pset_ex(
                self.lock_key(job_id),
                1,
                self.lock_duration.as_millis() as u64,
            )
            .await
            .map_err(AppError::from)?;

        Ok(Some(record))
    }

    async fn mark_completed(&self, job_id: Uuid) -> AppResult<()> {
        let mut conn = self.conn().await?;

        self.release(&mut conn, job_id).await?;
        let _: () = conn
            .hdel(self.key("jobs"), job_id.to_string())
            .await
            .map_err(AppError::from)?;
        let _: i64 = conn
            .incr(self.key("completed"), 1)
            .await
            .map_err(AppError::from)?;

        self.emit(TransportEvent::Completed { job_id }).await;
        Ok(())
    }

    async fn retry(&self, job_id: Uuid, delay: Duration) -> AppResult<()> {
        let mut conn = self.conn().await?;

        self.release(&mut conn, job_id).await?;

        if let Some(mut record) = self.load(&mut conn, job_id).await? {
            record.status = JobStatus::Pending;
            self.store(&mut conn, &record).await?;
        }

        let run_at_ms = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let _: () = conn
            .zadd(self.key("delayed"), job_id.to_string(), run_at_ms)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, reason: &str) -> AppResult<()> {
        let mut conn = self.conn().await?;

        self.release(&mut conn, job_id).await?;

        // Keep the terminal record for operator inspection.
        if let Some(mut record) = self.load(&mut conn, job_id).await? {
            record.status = JobStatus::Failed;
            record.failed_reason = Some(reason.to_string());
            self.store(&mut conn, &record).await?;
        }
        let _: i64 = conn
            .incr(self.key("failed"), 1)
            .await
            .map_err(AppError::from)?;

        self.emit(TransportEvent::Failed {
            job_id,
            reason: reason.to_string(),
        })
        .await;
        Ok(())
    }

    async fn counts(&self) -> AppResult<QueueCounts> {
        let mut conn = self.conn().await?;

        let waiting: u64 = conn
            .llen(self.key("waiting"))
            .await
            .map_err(AppError::from)?;
        let active: u64 = conn
            .llen(self.key("active"))
            .await
            .map_err(AppError::from)?;
        let delayed: u64 = conn
            .zcard(self.key("delayed"))
            .await
            .map_err(AppError::from)?;
        let completed: Option<u64> = conn
            .get(self.key("completed"))
            .await
            .map_err(AppError::from)?;
        let failed: Option<u64> = conn
            .get(self.key("failed"))
            .await
            .map_err(AppError::from)?;

        Ok(QueueCounts {
            waiting,
            active,
            completed: completed.unwrap_or(0),
            failed: failed.unwrap_or(0),
            delayed,
        })
    }
}
