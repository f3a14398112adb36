use crate::modules::cache::domain::{CacheKeys, CacheStore, DomainType};
use crate::modules::invalidation::registry::DependencyRegistry;
use crate::shared::errors::AppResult;
use crate::{log_debug, log_warn};
use std::collections::HashSet;
use std::sync::Arc;

/// One invalidation unit: the primary key of the changed entity plus every
/// resolved dependent key. Built per call and discarded after execution.
#[derive(Debug, Clone)]
pub struct InvalidationRequest {
    pub primary_key: String,
    pub related_keys: Vec<String>,
    pub cascade: bool,
}

impl InvalidationRequest {
    fn into_keys(self) -> Vec<String> {
        let mut keys = Vec::with_capacity(1 + self.related_keys.len());
        keys.push(self.primary_key);
        keys.extend(self.related_keys);
        keys
    }
}

/// Summary of one `invalidate` call, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationOutcome {
    /// Cache keys actually removed from the store.
    pub keys_removed: u64,
    /// `(domainType, entityId)` pairs visited, each at most once.
    pub entries_visited: usize,
}

/// Dependency-graph-driven cache invalidation.
///
/// Given a changed entity, consults the registry for its dependents, resolves
/// their key patterns to concrete keys and deletes them. Deletes are
/// idempotent soft-state removal: a failure mid-way is reported to the caller
/// but already-deleted keys are not restored, since a torn invalidation set
/// self-heals on the next cache read.
pub struct InvalidationEngine {
    store: Arc<dyn CacheStore>,
    registry: DependencyRegistry,
    keys: CacheKeys,
}

impl InvalidationEngine {
    pub fn new(store: Arc<dyn CacheStore>, registry: DependencyRegistry, keys: CacheKeys) -> Self {
        Self {
            store,
            registry,
            keys,
        }
    }

    /// Invalidate the cache entry for `(domain, entity_id)` and every entry
    /// derived from it.
    ///
    /// `cascade` is explicit at every call site; there is no hidden default.
    /// With `cascade = false` only the primary key and dependent entries
    /// scoped to this entity are cleared. With `cascade = true` the full
    /// transitive closure of dependent domain types is swept, visiting each
    /// `(domainType, entityId)` pair at most once even on cyclic registries.
    ///
    /// An entity with no cached keys is a no-op, not an error.
    pub async fn invalidate(
        &self,
        domain: DomainType,
        entity_id: &str,
        cascade: bool,
    ) -> AppResult<InvalidationOutcome> {
        let mut outcome = InvalidationOutcome::default();
        let mut visited: HashSet<(DomainType, String)> = HashSet::new();
        let mut pending = vec![(domain, entity_id.to_string())];

        while let Some((current, id)) = pending.pop() {
            if !visited.insert((current, id.clone())) {
                continue;
            }

            let request = self
                .build_request(current, &id, cascade, &mut pending)
                .await?;

            log_debug!(
                "Invalidating {}:{} ({} related key(s), cascade: {})",
                current,
                id,
                request.related_keys.len(),
                cascade
            );

            match self.store.delete_many(&request.into_keys()).await {
                Ok(removed) => outcome.keys_removed += removed,
                Err(e) => {
                    // No rollback: stale survivors are recoverable on the
                    // next read-through.
                    log_warn!("Invalidation of {}:{} failed mid-delete: {}", current, id, e);
                    return Err(e);
                }
            }

            outcome.entries_visited += 1;
        }

        log_debug!(
            "Invalidation of {}:{} removed {} key(s) across {} entries",
            domain,
            entity_id,
            outcome.keys_removed,
            outcome.entries_visited
        );

        Ok(outcome)
    }

    /// Resolve the key patterns for one `(domainType, entityId)` pair and,
    /// when cascading, queue its dependents for their own pass.
    async fn build_request(
        &self,
        domain: DomainType,
        entity_id: &str,
        cascade: bool,
        pending: &mut Vec<(DomainType, String)>,
    ) -> AppResult<InvalidationRequest> {
        let mut related_keys = Vec::new();

        for &dependent in self.registry.dependents_of(domain) {
            let scoped = self.keys.dependent_pattern(dependent, domain, entity_id);
            related_keys.extend(self.store.keys_matching(&scoped).await?);

            if cascade {
                let wide = self.keys.domain_pattern(dependent);
                related_keys.extend(self.store.keys_matching(&wide).await?);
                pending.push((dependent, entity_id.to_string()));
            }
        }

        related_keys.sort();
        related_keys.dedup();

        Ok(InvalidationRequest {
            primary_key: self.keys.entity(domain, entity_id),
            related_keys,
            cascade,
        })
    }
}
