use crate::modules::cache::domain::CacheStore;
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Cached entry with TTL support
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() > self.ttl
    }
}

/// In-memory cache store used by tests and embedded deployments.
///
/// Expired entries are dropped lazily on access; there is no background
/// sweeper, so the map only shrinks when keys are read or deleted.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compile a `*` key pattern into an anchored regex.
    fn pattern_regex(pattern: &str) -> AppResult<Regex> {
        let escaped = regex::escape(pattern).replace("\\*", ".*");
        Regex::new(&format!("^{}$", escaped))
            .map_err(|e| AppError::ValidationError(format!("Invalid key pattern: {}", e)))
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> AppResult<Option<Value>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }

        // Remove expired entry
        self.entries.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> AppResult<()> {
        self.entries
            .insert(key.to_string(), CacheEntry::new(value.clone(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<u64> {
        Ok(self.entries.remove(key).map_or(0, |_| 1))
    }

    async fn delete_many(&self, keys: &[String]) -> AppResult<u64> {
        let mut removed = 0;
        for key in keys {
            removed += self.entries.remove(key).map_or(0, |_| 1);
        }
        Ok(removed)
    }

    async fn keys_matching(&self, pattern: &str) -> AppResult<Vec<String>> {
        let regex = Self::pattern_regex(pattern)?;

        let keys = self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired() && regex.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn set_get_delete_roundtrip() {
        let store = MemoryCacheStore::new();
        store
            .set("cache:phase:1", &json!({"name": "group stage"}), TTL)
            .await
            .unwrap();

        let value = store.get("cache:phase:1").await.unwrap().unwrap();
        assert_eq!(value["name"], "group stage");

        assert_eq!(store.delete("cache:phase:1").await.unwrap(), 1);
        assert_eq!(store.delete("cache:phase:1").await.unwrap(), 0);
        assert!(store.get("cache:phase:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entries_read_as_misses() {
        let store = MemoryCacheStore::new();
        store
            .set("cache:team:3", &json!(1), Duration::ZERO)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.get("cache:team:3").await.unwrap().is_none());
        assert!(store.is_empty(), "expired entry should be dropped on read");
    }

    #[tokio::test]
    async fn patterns_match_only_their_segment() {
        let store = MemoryCacheStore::new();
        store.set("cache:event:5", &json!(1), TTL).await.unwrap();
        store
            .set("cache:event:7:phase:1", &json!(2), TTL)
            .await
            .unwrap();
        store.set("cache:phase:1", &json!(3), TTL).await.unwrap();

        let mut wide = store.keys_matching("cache:event:*").await.unwrap();
        wide.sort();
        assert_eq!(wide, vec!["cache:event:5", "cache:event:7:phase:1"]);

        let scoped = store.keys_matching("cache:event:*:phase:1").await.unwrap();
        assert_eq!(scoped, vec!["cache:event:7:phase:1"]);
    }
}
