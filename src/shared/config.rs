/// Runtime configuration, read once from the environment at startup into
/// explicit structs. Call sites never touch `env::var` directly; the
/// embedding binary loads `.env` via `dotenvy::dotenv()` before calling
/// the `from_env` constructors.
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::shared::utils::backoff;

/// Load `.env` into the process environment. Call once before the `from_env`
/// constructors; a missing file is not an error.
pub fn load_env() {
    dotenvy::dotenv().ok();
}

fn env_parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

/// Connection settings for the shared Redis instance backing both the cache
/// store and the queue transport.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Leading segment of every cache key (`<prefix>:<domainType>:<id>`).
    pub key_prefix: String,
    /// `None` means retry forever; producers override this to fail fast.
    pub max_retries_per_request: Option<u32>,
}

impl RedisConfig {
    pub fn from_env() -> Self {
        Self {
            host: env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_parsed("REDIS_PORT", 6379),
            password: env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
            key_prefix: env::var("REDIS_KEY_PREFIX").unwrap_or_else(|_| "cache".to_string()),
            max_retries_per_request: None,
        }
    }

    /// Producer connections fail fast instead of buffering commands while the
    /// broker is unreachable.
    pub fn producer(mut self) -> Self {
        self.max_retries_per_request = Some(3);
        self
    }

    /// Consumer connections ride out broker restarts.
    pub fn consumer(mut self) -> Self {
        self.max_retries_per_request = None;
        self
    }

    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!("redis://:{}@{}:{}", password, self.host, self.port),
            None => format!("redis://{}:{}", self.host, self.port),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            key_prefix: "cache".to_string(),
            max_retries_per_request: None,
        }
    }
}

/// Per-job-family worker tunables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrently running job handlers.
    pub concurrency: usize,
    /// Sleep between claim attempts when the queue is empty.
    pub poll_interval: Duration,
    /// Pause between successive claims, for rate-limited upstreams.
    pub throttle: Duration,
    /// How long `start()` waits for the transport to report ready.
    pub readiness_timeout: Duration,
    /// How long `stop()` waits for in-flight jobs before abandoning them.
    pub shutdown_grace: Duration,
    /// Claimed jobs that hold no live lock past this window count as stalled.
    pub lock_duration: Duration,
    /// Batch size for moving due delayed jobs back into the waiting queue.
    pub chunk_size: usize,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            concurrency: env_parsed("WORKER_CONCURRENCY", 2),
            poll_interval: Duration::from_millis(env_parsed("WORKER_POLL_INTERVAL_MS", 500)),
            throttle: Duration::from_millis(env_parsed("WORKER_THROTTLE_MS", 0)),
            readiness_timeout: Duration::from_millis(env_parsed(
                "WORKER_READINESS_TIMEOUT_MS",
                5_000,
            )),
            shutdown_grace: Duration::from_millis(env_parsed("WORKER_SHUTDOWN_GRACE_MS", 10_000)),
            lock_duration: Duration::from_millis(env_parsed("WORKER_LOCK_DURATION_MS", 30_000)),
            chunk_size: env_parsed("WORKER_CHUNK_SIZE", 64),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            poll_interval: Duration::from_millis(500),
            throttle: Duration::ZERO,
            readiness_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(10),
            lock_duration: Duration::from_secs(30),
            chunk_size: 64,
        }
    }
}

/// Retry schedule applied to retryable job failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before re-delivering a job that has already made `attempt`
    /// attempts. Exponential with jitter, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        backoff::delay_for_attempt(attempt, self.base_delay, self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_url_includes_password_when_set() {
        let config = RedisConfig {
            host: "redis.internal".into(),
            port: 6380,
            password: Some("secret".into()),
            ..RedisConfig::default()
        };
        assert_eq!(config.url(), "redis://:secret@redis.internal:6380");
    }

    #[test]
    fn redis_url_without_password() {
        let config = RedisConfig::default();
        assert_eq!(config.url(), "redis://127.0.0.1:6379");
    }

    #[test]
    fn producer_and_consumer_retry_settings_differ() {
        let producer = RedisConfig::default().producer();
        let consumer = RedisConfig::default().consumer();
        assert_eq!(producer.max_retries_per_request, Some(3));
        assert_eq!(consumer.max_retries_per_request, None);
    }
}
