use crate::modules::cache::domain::CacheStore;
use crate::shared::config::RedisConfig;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::connection::connect_with_retries;
use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Redis-backed cache store over the shared connection.
pub struct RedisCacheStore {
    client: Arc<Client>,
    max_retries: Option<u32>,
}

impl RedisCacheStore {
    pub fn new(config: &RedisConfig) -> AppResult<Self> {
        Self::from_url(&config.url(), config.max_retries_per_request)
    }

    pub fn from_url(redis_url: &str, max_retries: Option<u32>) -> AppResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| AppError::ConnectionError(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            max_retries,
        })
    }

    async fn conn(&self) -> AppResult<redis::aio::Connection> {
        connect_with_retries(&self.client, self.max_retries).await
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> AppResult<Option<Value>> {
        let mut conn = self.conn().await?;

        // Be explicit about the expected return type from Redis:
        let data: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| AppError::ConnectionError(format!("Failed to get from cache: {}", e)))?;

        match data {
            Some(json) => {
                let value = serde_json::from_str(&json)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> AppResult<()> {
        let mut conn = self.conn().await?;

        let json = serde_json::to_string(value)?;

        // Make the return type explicit to avoid never-type fallback.
        let _: () = conn
            .set_ex::<_, _, ()>(key, json, ttl.as_secs().max(1))
            .await
            .map_err(|e| AppError::ConnectionError(format!("Failed to set cache: {}", e)))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<u64> {
        let mut conn = self.conn().await?;

        let removed: u64 = conn
            .del(key)
            .await
            .map_err(|e| AppError::ConnectionError(format!("Failed to delete from cache: {}", e)))?;

        Ok(removed)
    }

    async fn delete_many(&self, keys: &[String]) -> AppResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn().await?;

        // Single DEL with all keys; Redis removes them in one atomic step.
        let removed: u64 = conn
            .del(keys)
            .await
            .map_err(|e| AppError::ConnectionError(format!("Failed to delete from cache: {}", e)))?;

        Ok(removed)
    }

    async fn keys_matching(&self, pattern: &str) -> AppResult<Vec<String>> {
        let mut conn = self.conn().await?;

        // SCAN instead of KEYS so a large key space does not block the server.
        let mut iter: redis::AsyncIter<String> = conn
            .scan_match(pattern)
            .await
            .map_err(|e| AppError::ConnectionError(format!("Failed to scan cache keys: {}", e)))?;

        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }

        Ok(keys)
    }
}
