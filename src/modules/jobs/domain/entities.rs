/// Domain entities for the background job system
///
/// Jobs are typed envelopes processed asynchronously by a worker: a coarse
/// family (one logical queue per family), a fine-grained operation, and a
/// JSON payload. Families and operations are enums so a routing miss is a
/// compile-time-visible configuration bug, not a stringly-typed surprise.
use crate::modules::cache::domain::DomainType;
use crate::shared::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Coarse job family; each family gets its own queue and worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobFamily {
    Meta,
    Events,
    Standings,
}

impl JobFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobFamily::Meta => "META",
            JobFamily::Events => "EVENTS",
            JobFamily::Standings => "STANDINGS",
        }
    }

    /// Lowercase form used in queue key names.
    pub fn queue_segment(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }
}

impl std::fmt::Display for JobFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "META" => Ok(JobFamily::Meta),
            "EVENTS" => Ok(JobFamily::Events),
            "STANDINGS" => Ok(JobFamily::Standings),
            _ => Err(format!("Invalid job family: {}", s)),
        }
    }
}

/// Fine-grained action within a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobOperation {
    Sync,
    Cleanup,
    Refresh,
}

impl JobOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOperation::Sync => "SYNC",
            JobOperation::Cleanup => "CLEANUP",
            JobOperation::Refresh => "REFRESH",
        }
    }
}

impl std::fmt::Display for JobOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SYNC" => Ok(JobOperation::Sync),
            "CLEANUP" => Ok(JobOperation::Cleanup),
            "REFRESH" => Ok(JobOperation::Refresh),
            _ => Err(format!("Invalid job operation: {}", s)),
        }
    }
}

/// Job status as tracked by the queue transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Payload for sync jobs: re-fetch one entity and refresh derived caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPayload {
    pub domain_type: DomainType,
    pub entity_id: String,
}

/// Payload for cleanup jobs: sweep every cached entry of one domain type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupPayload {
    pub domain_type: DomainType,
}

/// New job to be enqueued (before the transport assigns id and metadata).
#[derive(Debug, Clone)]
pub struct Job {
    pub family: JobFamily,
    pub operation: JobOperation,
    pub payload: Value,
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl Job {
    pub fn new(family: JobFamily, operation: JobOperation, payload: Value) -> Self {
        Self {
            family,
            operation,
            payload,
            max_attempts: 3,
            timeout: Duration::from_secs(30),
        }
    }

    /// Create a sync job for one changed entity
    pub fn sync(family: JobFamily, domain_type: DomainType, entity_id: impl Into<String>) -> Self {
        let payload = SyncPayload {
            domain_type,
            entity_id: entity_id.into(),
        };
        Self::new(
            family,
            JobOperation::Sync,
            serde_json::to_value(payload).unwrap_or(Value::Null),
        )
    }

    /// Create a cleanup job for one domain type
    pub fn cleanup(family: JobFamily, domain_type: DomainType) -> Self {
        let payload = CleanupPayload { domain_type };
        Self::new(
            family,
            JobOperation::Cleanup,
            serde_json::to_value(payload).unwrap_or(Value::Null),
        )
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Job record as tracked by the transport. Immutable once enqueued except
/// for `attempts_made`, which the transport increments on each claim, and
/// the terminal `status`/`failed_reason` transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub family: JobFamily,
    pub operation: JobOperation,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub timeout_ms: u64,
    pub status: JobStatus,
    pub failed_reason: Option<String>,
}

impl JobRecord {
    pub fn from_job(job: &Job) -> Self {
        Self {
            id: Uuid::new_v4(),
            family: job.family,
            operation: job.operation,
            payload: job.payload.clone(),
            enqueued_at: Utc::now(),
            attempts_made: 0,
            max_attempts: job.max_attempts,
            timeout_ms: job.timeout.as_millis() as u64,
            status: JobStatus::Pending,
            failed_reason: None,
        }
    }

    /// Check if the job has retry budget left
    pub fn can_retry(&self) -> bool {
        self.attempts_made < self.max_attempts
    }

    /// Handler deadline for one attempt
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn parse_sync_payload(&self) -> Result<SyncPayload, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    pub fn parse_cleanup_payload(&self) -> Result<CleanupPayload, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// Wire form persisted by the transport:
    /// `{ "type": "META", "timestamp": ..., "data": { "operation": "SYNC", ... } }`
    pub fn to_envelope(&self) -> AppResult<JobEnvelope> {
        let mut data = match &self.payload {
            Value::Object(map) => map.clone(),
            other => {
                return Err(AppError::ValidationError(format!(
                    "Job payload must be a JSON object, got: {}",
                    other
                )))
            }
        };
        data.insert(
            "operation".to_string(),
            Value::String(self.operation.to_string()),
        );

        Ok(JobEnvelope {
            job_type: self.family.to_string(),
            timestamp: self.enqueued_at,
            data: Value::Object(data),
        })
    }

    /// Recover `(family, operation, payload)` from a wire envelope.
    pub fn parts_from_envelope(envelope: &JobEnvelope) -> AppResult<(JobFamily, JobOperation, Value)> {
        let family: JobFamily = envelope
            .job_type
            .parse()
            .map_err(AppError::ValidationError)?;

        let mut data = match &envelope.data {
            Value::Object(map) => map.clone(),
            other => {
                return Err(AppError::ValidationError(format!(
                    "Envelope data must be a JSON object, got: {}",
                    other
                )))
            }
        };

        let operation: JobOperation = data
            .remove("operation")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| {
                AppError::ValidationError("Envelope data is missing 'operation'".to_string())
            })?
            .parse()
            .map_err(AppError::ValidationError)?;

        Ok((family, operation, Value::Object(data)))
    }
}

/// Wire envelope persisted by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    #[serde(rename = "type")]
    pub job_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}
