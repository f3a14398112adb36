/// Cache store contract shared by the Redis and in-memory implementations.
///
/// Values travel as JSON documents. Implementations hold no business logic
/// and never special-case domain types; connection faults surface as
/// `AppError::ConnectionError` (retryable) and malformed payloads as
/// `AppError::SerializationError` (a data-contract bug, not retryable).
use crate::shared::errors::AppResult;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a cached value, or `None` on miss or TTL expiry.
    async fn get(&self, key: &str) -> AppResult<Option<Value>>;

    /// Create or overwrite an entry with the given time-to-live.
    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> AppResult<()>;

    /// Delete one key; returns the number of keys removed (0 or 1).
    async fn delete(&self, key: &str) -> AppResult<u64>;

    /// Best-effort multi-key delete; returns the number of keys removed.
    /// A failure mid-way does not roll back keys already deleted.
    async fn delete_many(&self, keys: &[String]) -> AppResult<u64>;

    /// Resolve a `*` pattern to the concrete keys currently present.
    async fn keys_matching(&self, pattern: &str) -> AppResult<Vec<String>>;
}
