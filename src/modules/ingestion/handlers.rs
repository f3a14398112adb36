/// Ingestion job handlers
///
/// The concrete routes behind the dispatcher table. Handlers own their side
/// effects end to end: a sync fetches from the data source, persists, then
/// awaits cascading invalidation before returning, so a completed job never
/// leaves stale dependents in the cache.
use crate::modules::cache::domain::keys::{CacheKeys, DomainType};
use crate::modules::cache::domain::repository::CacheStore;
use crate::modules::invalidation::engine::InvalidationEngine;
use crate::modules::jobs::dispatcher::JobHandler;
use crate::modules::jobs::domain::entities::{CleanupPayload, SyncPayload};
use crate::shared::errors::{AppError, AppResult};
use crate::{log_debug, log_info, log_warn};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

/// An entity as fetched from the upstream data source, before any domain
/// shaping. `data` stays opaque JSON here; typed decoding belongs to the
/// repository implementation.
#[derive(Debug, Clone)]
pub struct RawEntity {
    pub domain_type: DomainType,
    pub entity_id: String,
    pub data: Value,
    pub fetched_at: DateTime<Utc>,
}

/// Upstream data source, supplied by the caller.
#[async_trait]
pub trait EntityFetcher: Send + Sync {
    async fn fetch_entity(&self, domain_type: DomainType, entity_id: &str)
        -> AppResult<RawEntity>;
}

/// Persistence seam, supplied by the caller.
#[async_trait]
pub trait EntityRepository: Send + Sync {
    async fn save(&self, entity: &RawEntity) -> AppResult<()>;
    async fn find(&self, domain_type: DomainType, entity_id: &str)
        -> AppResult<Option<RawEntity>>;
    async fn delete(&self, domain_type: DomainType, entity_id: &str) -> AppResult<()>;
    /// Ids of persisted entities that no longer exist upstream.
    async fn stale_ids(&self, domain_type: DomainType) -> AppResult<Vec<String>>;
}

/// Fetch one entity, persist it, and invalidate everything derived from it.
pub struct SyncHandler {
    fetcher: Arc<dyn EntityFetcher>,
    repository: Arc<dyn EntityRepository>,
    invalidation: Arc<InvalidationEngine>,
}

impl SyncHandler {
    pub fn new(
        fetcher: Arc<dyn EntityFetcher>,
        repository: Arc<dyn EntityRepository>,
        invalidation: Arc<InvalidationEngine>,
    ) -> Self {
        Self {
            fetcher,
            repository,
            invalidation,
        }
    }
}

#[async_trait]
impl JobHandler for SyncHandler {
    async fn handle(&self, payload: &Value) -> AppResult<()> {
        let payload: SyncPayload = serde_json::from_value(payload.clone())
            .map_err(|e| AppError::ValidationError(format!("Malformed sync payload: {}", e)))?;

        let entity = self
            .fetcher
            .fetch_entity(payload.domain_type, &payload.entity_id)
            .await?;
        self.repository.save(&entity).await?;

        // Awaited so the job is not marked completed while dependents are
        // still stale.
        let outcome = self
            .invalidation
            .invalidate(payload.domain_type, &payload.entity_id, true)
            .await?;

        log_info!(
            "Synced {}:{} ({} cache keys invalidated)",
            payload.domain_type,
            payload.entity_id,
            outcome.keys_removed
        );
        Ok(())
    }
}

/// Sweep a whole domain: drop its cached entries and delete persisted
/// entities that vanished upstream.
pub struct CleanupHandler {
    repository: Arc<dyn EntityRepository>,
    store: Arc<dyn CacheStore>,
    keys: CacheKeys,
}

impl CleanupHandler {
    pub fn new(
        repository: Arc<dyn EntityRepository>,
        store: Arc<dyn CacheStore>,
        keys: CacheKeys,
    ) -> Self {
        Self {
            repository,
            store,
            keys,
        }
    }
}

#[async_trait]
impl JobHandler for CleanupHandler {
    async fn handle(&self, payload: &Value) -> AppResult<()> {
        let payload: CleanupPayload = serde_json::from_value(payload.clone())
            .map_err(|e| AppError::ValidationError(format!("Malformed cleanup payload: {}", e)))?;

        let stale = self.repository.stale_ids(payload.domain_type).await?;
        for entity_id in &stale {
            self.repository
                .delete(payload.domain_type, entity_id)
                .await?;
        }
        if !stale.is_empty() {
            log_warn!(
                "Cleanup removed {} stale {} entities",
                stale.len(),
                payload.domain_type
            );
        }

        let pattern = self.keys.domain_pattern(payload.domain_type);
        let matched = self.store.keys_matching(&pattern).await?;
        let removed = self.store.delete_many(&matched).await?;
        log_debug!(
            "Cleanup swept {} cached {} entries",
            removed,
            payload.domain_type
        );
        Ok(())
    }
}
