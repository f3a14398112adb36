use serde::Serialize;
use thiserror::Error;

/// Error taxonomy for the job and cache subsystems.
///
/// Retryable variants describe transient faults the worker may reschedule;
/// everything else is terminal and surfaced to the operator.
#[derive(Error, Debug, Clone, Serialize)]
#[serde(tag = "type", content = "message")]
pub enum AppError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Processing error: {message}")]
    ProcessingError {
        message: String,
        cause: Option<String>,
    },

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Unknown job type: {family}/{operation}")]
    UnknownJobType { family: String, operation: String },

    #[error("Worker failed to become ready within {0}ms")]
    WorkerStartTimeout(u64),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AppError {
    pub fn processing(message: impl Into<String>) -> Self {
        AppError::ProcessingError {
            message: message.into(),
            cause: None,
        }
    }

    pub fn processing_with_cause(message: impl Into<String>, cause: impl Into<String>) -> Self {
        AppError::ProcessingError {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    /// Whether the worker should hand this failure back to the retry policy.
    ///
    /// Connection faults, handler failures and deadline overruns are transient.
    /// Validation errors, routing misses and serialization errors indicate a
    /// deploy or data-contract bug and are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ConnectionError(_)
                | AppError::ProcessingError { .. }
                | AppError::TimeoutError(_)
        )
    }

    /// Causal error retained from the original handler failure, if any.
    pub fn cause(&self) -> Option<&str> {
        match self {
            AppError::ProcessingError { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }

    /// Human-readable reason recorded on terminally failed jobs.
    pub fn failed_reason(&self) -> String {
        match self {
            AppError::ProcessingError {
                message,
                cause: Some(cause),
            } => format!("{} (cause: {})", message, cause),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::TypeError => AppError::SerializationError(err.to_string()),
            _ => AppError::ConnectionError(err.to_string()),
        }
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::ValidationError(format!("Invalid UUID: {}", err))
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(AppError::ConnectionError("refused".into()).is_retryable());
        assert!(AppError::processing("handler failed").is_retryable());
        assert!(AppError::TimeoutError("deadline".into()).is_retryable());
    }

    #[test]
    fn configuration_bugs_are_not_retryable() {
        assert!(!AppError::ValidationError("bad payload".into()).is_retryable());
        assert!(!AppError::SerializationError("bad json".into()).is_retryable());
        assert!(!AppError::UnknownJobType {
            family: "META".into(),
            operation: "SYNC".into()
        }
        .is_retryable());
    }

    #[test]
    fn failed_reason_keeps_cause() {
        let err = AppError::processing_with_cause("handler failed", "upstream 503");
        assert_eq!(err.cause(), Some("upstream 503"));
        assert_eq!(err.failed_reason(), "handler failed (cause: upstream 503)");
    }
}
