use serde_json::json;
use sportsync::modules::cache::{CacheKeys, CacheStore, DomainType, MemoryCacheStore};
use sportsync::modules::invalidation::{
    default_registry, DependencyRegistry, InvalidationEngine,
};
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(60);

fn engine_with(store: Arc<MemoryCacheStore>, registry: DependencyRegistry) -> InvalidationEngine {
    InvalidationEngine::new(store, registry, CacheKeys::new("cache"))
}

async fn seed(store: &MemoryCacheStore, keys: &[&str]) {
    for key in keys {
        store.set(key, &json!({"seeded": true}), TTL).await.unwrap();
    }
}

#[tokio::test]
async fn entity_without_dependents_only_removes_its_own_key() {
    let store = Arc::new(MemoryCacheStore::new());
    seed(&store, &["cache:standing:9", "cache:phase:1"]).await;

    let engine = engine_with(store.clone(), default_registry());
    let outcome = engine
        .invalidate(DomainType::Standing, "9", false)
        .await
        .unwrap();

    assert_eq!(outcome.keys_removed, 1);
    assert!(store.get("cache:standing:9").await.unwrap().is_none());
    assert!(store.get("cache:phase:1").await.unwrap().is_some());
}

#[tokio::test]
async fn cascade_removes_primary_and_dependent_entries() {
    let store = Arc::new(MemoryCacheStore::new());
    seed(
        &store,
        &[
            "cache:phase:1",
            "cache:event:5:phase:1",
            "cache:event:8",
            "cache:standing:3",
            "cache:team:2",
        ],
    )
    .await;

    let engine = engine_with(store.clone(), default_registry());
    let outcome = engine
        .invalidate(DomainType::Phase, "1", true)
        .await
        .unwrap();

    // Phase 1 itself, the event scoped to it, and the domain-wide sweeps of
    // its dependents (events and standings). Teams do not derive from phases.
    assert!(store.get("cache:phase:1").await.unwrap().is_none());
    assert!(store.get("cache:event:5:phase:1").await.unwrap().is_none());
    assert!(store.get("cache:event:8").await.unwrap().is_none());
    assert!(store.get("cache:standing:3").await.unwrap().is_none());
    assert!(store.get("cache:team:2").await.unwrap().is_some());

    assert_eq!(outcome.keys_removed, 4);
    // Phase, event, and standing each visited once for entity id 1.
    assert_eq!(outcome.entries_visited, 3);
}

#[tokio::test]
async fn non_cascade_leaves_domain_wide_entries_intact() {
    let store = Arc::new(MemoryCacheStore::new());
    seed(
        &store,
        &["cache:phase:1", "cache:event:5:phase:1", "cache:event:8"],
    )
    .await;

    let engine = engine_with(store.clone(), default_registry());
    engine
        .invalidate(DomainType::Phase, "1", false)
        .await
        .unwrap();

    assert!(store.get("cache:phase:1").await.unwrap().is_none());
    assert!(store.get("cache:event:5:phase:1").await.unwrap().is_none());
    // Events not derived from phase 1 survive a non-cascading call.
    assert!(store.get("cache:event:8").await.unwrap().is_some());
}

#[tokio::test]
async fn cyclic_registry_terminates_with_each_entry_visited_once() {
    let registry = DependencyRegistry::new()
        .with_dependents(DomainType::Phase, &[DomainType::Event])
        .with_dependents(DomainType::Event, &[DomainType::Phase]);

    let store = Arc::new(MemoryCacheStore::new());
    seed(&store, &["cache:phase:1", "cache:event:1"]).await;

    let engine = engine_with(store.clone(), registry);
    let outcome = engine
        .invalidate(DomainType::Phase, "1", true)
        .await
        .unwrap();

    assert_eq!(outcome.entries_visited, 2);
    assert!(store.get("cache:phase:1").await.unwrap().is_none());
    assert!(store.get("cache:event:1").await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_entity_id_is_a_noop_not_an_error() {
    let store = Arc::new(MemoryCacheStore::new());
    seed(&store, &["cache:phase:1"]).await;

    let engine = engine_with(store.clone(), default_registry());
    let outcome = engine
        .invalidate(DomainType::Phase, "404", false)
        .await
        .unwrap();

    assert_eq!(outcome.keys_removed, 0);
    assert!(store.get("cache:phase:1").await.unwrap().is_some());
}

#[tokio::test]
async fn repeated_invalidation_is_idempotent() {
    let store = Arc::new(MemoryCacheStore::new());
    seed(&store, &["cache:phase:1"]).await;

    let engine = engine_with(store.clone(), default_registry());
    let first = engine
        .invalidate(DomainType::Phase, "1", false)
        .await
        .unwrap();
    let second = engine
        .invalidate(DomainType::Phase, "1", false)
        .await
        .unwrap();

    assert_eq!(first.keys_removed, 1);
    assert_eq!(second.keys_removed, 0);
}
