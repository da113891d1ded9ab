//! Version-gated refresh decisions against the standard catalog.

use std::sync::Arc;
use std::time::Duration;

use vitrine_core::constants::METADATA_COLLECTION;
use vitrine_storage::cache::{Categories, FeaturedProducts};
use vitrine_test_utils::{
    assert_completed, init_test_tracing, rename_category, set_remote_version, settle, wait_until,
    CollectionKind, Harness, FEATURED_COUNT,
};

#[tokio::test]
async fn matching_tokens_skip_refresh_entirely() {
    init_test_tracing();
    let h = Harness::new("3", "3").await;

    assert!(h.cache.check_and_refresh().await.is_none());
    assert_eq!(h.source.total_fetches(), 0);
    assert_eq!(h.versions.sets(), 0);
}

#[tokio::test]
async fn newer_remote_token_refreshes_and_is_recorded() {
    init_test_tracing();
    let h = Harness::new("3", "4").await;

    let outcome = h.cache.check_and_refresh().await.expect("refresh should run");
    let report = assert_completed(&outcome);
    assert!(report.is_complete());
    assert_eq!(report.applied_token.as_ref().map(|t| t.as_str()), Some("4"));
    assert_eq!(h.local_token().await.as_str(), "4");
    assert_eq!(h.source.total_fetches(), 4);
    assert_eq!(h.versions.sets(), 1);
}

#[tokio::test]
async fn freshness_check_is_idempotent_after_refresh() {
    init_test_tracing();
    let h = Harness::new("3", "4").await;
    h.cache.refresh_all().await;
    let metadata_reads = h.store.reads_of(METADATA_COLLECTION);

    for _ in 0..5 {
        assert!(!h.cache.coordinator().should_refresh().await);
    }
    // The post-refresh read is still inside the memo window.
    assert_eq!(h.store.reads_of(METADATA_COLLECTION), metadata_reads);
}

#[tokio::test]
async fn memo_window_hides_remote_bump_until_expiry() {
    init_test_tracing();
    let h = Harness::new("3", "3").await;
    assert!(!h.cache.coordinator().should_refresh().await);

    set_remote_version(&h.store, "4");
    h.clock.advance(Duration::from_secs(299));
    assert!(!h.cache.coordinator().should_refresh().await);

    h.clock.advance(Duration::from_secs(1));
    assert!(h.cache.coordinator().should_refresh().await);
}

#[tokio::test]
async fn unreadable_local_record_counts_as_initial() {
    init_test_tracing();
    let h = Harness::new("3", "3").await;
    h.versions.fail_reads(true);
    assert!(h.cache.coordinator().should_refresh().await);
}

#[tokio::test]
async fn miss_fetches_one_view_then_refreshes_in_background() {
    init_test_tracing();
    let h = Harness::new("0", "1").await;

    let read = h.cache.read::<Categories>().await.unwrap();
    assert!(read.was_cache_miss());
    let names: Vec<&str> = read.value().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Rings", "Chains", "Earrings"]);
    assert_eq!(h.source.fetches(CollectionKind::Categories), 1);
    assert_eq!(h.source.fetches(CollectionKind::FeaturedProducts), 0);

    wait_until(|| h.versions.sets() == 1).await;
    assert_eq!(h.local_token().await.as_str(), "1");
    for kind in CollectionKind::ALL {
        assert!(h.cache.is_populated(kind));
    }
}

#[tokio::test]
async fn offline_reads_serve_last_good_snapshot() {
    init_test_tracing();
    let h = Harness::new("0", "1").await;
    assert_completed(&h.cache.refresh_all().await);
    let before = h.cache.featured_products().await.unwrap();
    assert_eq!(before.len(), FEATURED_COUNT);
    settle().await;

    h.store.set_offline(true);
    h.clock.advance(Duration::from_secs(600));

    let read = h.cache.read::<FeaturedProducts>().await.unwrap();
    assert!(read.was_cache_hit());
    assert!(Arc::ptr_eq(read.value(), &before));

    // The background check fails open and the refresh fails everywhere;
    // nothing is replaced and the recorded version stays put.
    settle().await;
    let after = h.cache.featured_products().await.unwrap();
    assert!(Arc::ptr_eq(&after, &before));
    assert_eq!(h.local_token().await.as_str(), "1");
}

#[tokio::test]
async fn failed_view_keeps_previous_snapshot() {
    init_test_tracing();
    let h = Harness::new("0", "1").await;
    assert_completed(&h.cache.refresh_all().await);
    let featured_before = h.cache.featured_products().await.unwrap();
    h.cache.close();

    rename_category(&h.store, "rings", "Bands", 1);
    set_remote_version(&h.store, "2");
    h.source.fail(CollectionKind::FeaturedProducts);

    let outcome = h.cache.refresh_all().await;
    let report = assert_completed(&outcome);
    assert_eq!(report.refreshed.len(), 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, CollectionKind::FeaturedProducts);
    assert_eq!(report.applied_token.as_ref().map(|t| t.as_str()), Some("2"));

    let categories = h.cache.categories().await.unwrap();
    assert_eq!(categories[0].name, "Bands");
    let featured_after = h.cache.featured_products().await.unwrap();
    assert!(Arc::ptr_eq(&featured_before, &featured_after));
    assert_eq!(h.local_token().await.as_str(), "2");
}

#[tokio::test]
async fn partial_refresh_records_version_and_stops_refetching() {
    init_test_tracing();
    let h = Harness::new("1", "2").await;
    h.source.fail(CollectionKind::Collections);

    let outcome = h.cache.check_and_refresh().await.expect("refresh should run");
    let report = assert_completed(&outcome);
    assert!(!report.is_complete());
    assert_eq!(report.applied_token.as_ref().map(|t| t.as_str()), Some("2"));
    assert_eq!(h.local_token().await.as_str(), "2");
    let fetches = h.source.total_fetches();

    for _ in 0..3 {
        assert!(h.cache.check_and_refresh().await.is_none());
    }
    assert_eq!(h.source.total_fetches(), fetches);
    assert!(!h.cache.is_populated(CollectionKind::Collections));

    // The failed view is picked up by the next version change.
    h.source.restore(CollectionKind::Collections);
    set_remote_version(&h.store, "3");
    h.cache.coordinator().oracle().invalidate();
    let outcome = h.cache.check_and_refresh().await.expect("new version refreshes");
    assert!(assert_completed(&outcome).is_complete());
    assert!(h.cache.is_populated(CollectionKind::Collections));
}

#[tokio::test]
async fn persistence_failure_retriggers_refresh() {
    init_test_tracing();
    let h = Harness::new("1", "2").await;
    h.versions.fail_writes(true);

    let outcome = h.cache.refresh_all().await;
    assert!(assert_completed(&outcome).applied_token.is_none());
    assert_eq!(h.local_token().await.as_str(), "1");
    assert!(h.cache.coordinator().should_refresh().await);

    h.versions.fail_writes(false);
    let outcome = h.cache.check_and_refresh().await.expect("refresh should run");
    assert!(assert_completed(&outcome).applied_token.is_some());
    assert_eq!(h.local_token().await.as_str(), "2");
}
