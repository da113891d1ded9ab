//! Pushed version changes, start/close, and restarts over a durable record.

use std::sync::Arc;

use tempfile::TempDir;
use vitrine_core::constants::{CACHE_CONTROL_DOCUMENT, CATEGORIES_COLLECTION, METADATA_COLLECTION};
use vitrine_core::{ManualClock, VitrineConfig};
use vitrine_storage::cache::{CatalogCache, LmdbVersionStore, RemoteVersionOracle};
use vitrine_storage::{DocumentCatalogSource, InMemoryDocumentStore};
use vitrine_test_utils::{
    assert_completed, init_test_tracing, seed_standard_catalog, set_remote_version, settle,
    wait_until, Harness,
};

#[tokio::test]
async fn push_triggers_refresh_without_any_read() {
    init_test_tracing();
    let h = Harness::new("4", "4").await;
    h.cache.start().await.unwrap();

    set_remote_version(&h.store, "5");
    wait_until(|| h.versions.sets() == 1).await;

    assert_eq!(h.local_token().await.as_str(), "5");
    assert_eq!(h.source.total_fetches(), 4);
}

#[tokio::test]
async fn repeated_push_of_applied_token_is_ignored() {
    init_test_tracing();
    let h = Harness::new("4", "4").await;
    h.cache.start().await.unwrap();

    set_remote_version(&h.store, "5");
    wait_until(|| h.versions.sets() == 1).await;

    set_remote_version(&h.store, "5");
    set_remote_version(&h.store, "5");
    settle().await;
    assert_eq!(h.source.total_fetches(), 4);
    assert_eq!(h.versions.sets(), 1);
}

#[tokio::test]
async fn start_twice_subscribes_once() {
    init_test_tracing();
    let h = Harness::new("1", "1").await;
    h.cache.start().await.unwrap();
    h.cache.start().await.unwrap();
    assert_eq!(h.store.listener_count(METADATA_COLLECTION, CACHE_CONTROL_DOCUMENT), 1);
}

#[tokio::test]
async fn close_stops_push_and_background_checks() {
    init_test_tracing();
    let h = Harness::new("1", "1").await;
    assert_completed(&h.cache.refresh_all().await);
    let fetches = h.source.total_fetches();

    h.cache.start().await.unwrap();
    h.cache.close();
    assert_eq!(h.store.listener_count(METADATA_COLLECTION, CACHE_CONTROL_DOCUMENT), 0);

    set_remote_version(&h.store, "2");
    settle().await;
    assert_eq!(h.source.total_fetches(), fetches);

    // The snapshot is still served, but no freshness check follows.
    let categories = h.cache.categories().await.unwrap();
    assert_eq!(categories.len(), 3);
    settle().await;
    assert_eq!(h.source.total_fetches(), fetches);
    assert_eq!(h.local_token().await.as_str(), "1");

    // Closed caches stay closed.
    h.cache.start().await.unwrap();
    assert_eq!(h.store.listener_count(METADATA_COLLECTION, CACHE_CONTROL_DOCUMENT), 0);
}

#[tokio::test]
async fn dropping_the_cache_ends_the_subscription() {
    init_test_tracing();
    let h = Harness::new("1", "1").await;
    let store = h.store.clone();
    h.cache.start().await.unwrap();
    assert_eq!(store.listener_count(METADATA_COLLECTION, CACHE_CONTROL_DOCUMENT), 1);

    drop(h);
    settle().await;
    assert_eq!(store.listener_count(METADATA_COLLECTION, CACHE_CONTROL_DOCUMENT), 0);
}

#[tokio::test]
async fn restart_with_unchanged_version_skips_refresh() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let config = VitrineConfig::new().with_version_store_path(dir.path().join("version"));
    let store = Arc::new(InMemoryDocumentStore::new());
    seed_standard_catalog(&store, "7");

    let build = |versions: Arc<LmdbVersionStore>| {
        let clock = Arc::new(ManualClock::at_epoch());
        let source = Arc::new(DocumentCatalogSource::with_config(store.clone(), &config));
        let oracle = Arc::new(
            RemoteVersionOracle::with_config(store.clone(), &config).with_clock(clock),
        );
        CatalogCache::new(source, versions, oracle)
    };

    let versions = Arc::new(LmdbVersionStore::from_config(&config).unwrap());
    let cache = build(versions.clone());
    let outcome = cache.check_and_refresh().await.expect("first launch refreshes");
    assert!(assert_completed(&outcome).is_complete());
    drop(cache);
    match Arc::try_unwrap(versions) {
        Ok(versions) => versions.close(),
        Err(_) => panic!("version store still shared"),
    }

    let category_reads = store.reads_of(CATEGORIES_COLLECTION);
    let versions = Arc::new(LmdbVersionStore::from_config(&config).unwrap());
    let cache = build(versions);
    assert!(cache.check_and_refresh().await.is_none());
    assert_eq!(store.reads_of(CATEGORIES_COLLECTION), category_reads);
}
