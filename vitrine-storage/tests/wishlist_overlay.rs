//! Favorite flags follow the signed-in user's wishlist.

use vitrine_core::constants::{recently_viewed_collection, wishlist_collection};
use vitrine_test_utils::{
    assert_completed, assert_favorites, assert_not_signed_in, assert_transient, init_test_tracing,
    product_id, wish, Harness, ProductId, UserId, FEATURED_COUNT,
};

async fn signed_in(user: &str) -> Harness {
    let h = Harness::new("0", "1").await;
    h.cache.close();
    h.cache.sign_in(UserId::from(user)).await;
    assert_completed(&h.cache.refresh_all().await);
    h
}

#[tokio::test]
async fn add_is_visible_without_round_trip() {
    init_test_tracing();
    let h = signed_in("u1").await;
    let p1 = product_id(1);

    h.cache.add_to_wishlist(&p1).await.unwrap();
    let reads = h.store.total_reads();

    assert!(h.cache.is_member(&p1).await.unwrap());
    assert_eq!(h.store.total_reads(), reads);

    let featured = h.cache.featured_products().await.unwrap();
    assert_favorites(&featured, &["p01"]);

    // An authoritative reload agrees with the local patch.
    h.cache.overlay().refresh(&UserId::from("u1")).await.unwrap();
    assert!(h.cache.is_member(&p1).await.unwrap());
}

#[tokio::test]
async fn remove_clears_the_flag() {
    init_test_tracing();
    let store_user = "u1";
    let h = Harness::new("0", "1").await;
    h.cache.close();
    wish(&h.store, store_user, "p03");
    h.cache.sign_in(UserId::from(store_user)).await;
    assert_completed(&h.cache.refresh_all().await);
    assert_favorites(&h.cache.featured_products().await.unwrap(), &["p03"]);

    h.cache.remove_from_wishlist(&product_id(3)).await.unwrap();
    assert!(!h.cache.is_member(&product_id(3)).await.unwrap());
    assert_favorites(&h.cache.featured_products().await.unwrap(), &[]);
}

#[tokio::test]
async fn failed_write_leaves_local_state_alone() {
    init_test_tracing();
    let h = signed_in("u1").await;
    h.store.fail_collection(&wishlist_collection("u1"));

    let result = h.cache.add_to_wishlist(&product_id(2)).await;
    assert_transient(&result);
    assert!(h.cache.overlay().members().is_empty());
    assert_favorites(&h.cache.featured_products().await.unwrap(), &[]);
}

#[tokio::test]
async fn toggle_flips_membership() {
    init_test_tracing();
    let h = signed_in("u1").await;
    let p5 = product_id(5);

    assert!(h.cache.toggle_wishlist(&p5).await.unwrap());
    assert_favorites(&h.cache.featured_products().await.unwrap(), &["p05"]);
    assert!(!h.cache.toggle_wishlist(&p5).await.unwrap());
    assert_favorites(&h.cache.featured_products().await.unwrap(), &[]);
}

#[tokio::test]
async fn switching_users_never_leaks_membership() {
    init_test_tracing();
    let h = Harness::new("0", "1").await;
    h.cache.close();
    wish(&h.store, "alice", "p01");
    wish(&h.store, "bob", "p02");

    h.cache.sign_in(UserId::from("alice")).await;
    assert_completed(&h.cache.refresh_all().await);
    assert_favorites(&h.cache.featured_products().await.unwrap(), &["p01"]);

    h.cache.sign_in(UserId::from("bob")).await;
    assert_favorites(&h.cache.featured_products().await.unwrap(), &["p02"]);
    assert!(!h.cache.is_member(&product_id(1)).await.unwrap());
    assert_eq!(h.cache.overlay().bound_user(), Some(UserId::from("bob")));

    h.cache.sign_out();
    assert_favorites(&h.cache.featured_products().await.unwrap(), &[]);
    assert!(h.cache.overlay().members().is_empty());
    assert_not_signed_in(&h.cache.add_to_wishlist(&product_id(1)).await);
}

#[tokio::test]
async fn wishlist_is_refreshed_before_featured_products() {
    init_test_tracing();
    let h = Harness::new("0", "1").await;
    h.cache.close();
    h.cache.sign_in(UserId::from("u1")).await;
    let reads_before = h.source.wishlist_reads();

    // Added by another device; only the bulk reload can see it.
    wish(&h.store, "u1", "p07");
    h.cache.overlay().set_member(&UserId::from("u1"), &product_id(7), false);

    assert_completed(&h.cache.refresh_all().await);
    assert_eq!(h.source.wishlist_reads(), reads_before + 1);
    assert_favorites(&h.cache.featured_products().await.unwrap(), &["p07"]);
}

#[tokio::test]
async fn signed_in_refresh_reads_the_wishlist_once() {
    init_test_tracing();
    let h = signed_in("u1").await;
    let collection = wishlist_collection("u1");
    let reads = h.store.reads_of(&collection);

    assert_completed(&h.cache.refresh_all().await);
    assert_eq!(h.store.reads_of(&collection), reads + 1);
    assert_eq!(h.cache.featured_products().await.unwrap().len(), FEATURED_COUNT);
}

#[tokio::test]
async fn pass_through_reads_are_annotated() {
    init_test_tracing();
    let h = Harness::new("0", "1").await;
    h.cache.close();
    wish(&h.store, "u1", "p01");
    wish(&h.store, "u1", "p13");
    h.cache.sign_in(UserId::from("u1")).await;

    let details = h.cache.product_details(&product_id(1)).await.unwrap();
    assert!(details.is_favorite);
    assert_eq!(details.currency, "Rs");
    assert_eq!(details.image_url, "gs://catalog/p01.jpg");

    let similar = h
        .cache
        .products_by_category("rings", Some(&product_id(1)))
        .await
        .unwrap();
    assert!(similar.iter().all(|p| p.id != product_id(1)));
    assert_eq!(similar.len(), 11);
    assert_favorites(&similar, &["p13"]);

    let wishlist = h.cache.wishlist_products().await.unwrap();
    let ids: Vec<ProductId> = wishlist.iter().map(|p| p.id.clone()).collect();
    assert_eq!(ids, vec![product_id(1), product_id(13)]);
    assert!(wishlist.iter().all(|p| p.is_favorite));
}

#[tokio::test]
async fn signed_out_reads_have_no_favorites() {
    init_test_tracing();
    let h = Harness::new("0", "1").await;
    h.cache.close();
    wish(&h.store, "u1", "p01");

    let details = h.cache.product_details(&product_id(1)).await.unwrap();
    assert!(!details.is_favorite);
    assert_not_signed_in(&h.cache.wishlist_products().await);
}

#[tokio::test]
async fn product_views_are_recorded_for_the_session() {
    init_test_tracing();
    let h = Harness::new("0", "1").await;
    h.cache.close();
    let viewed = recently_viewed_collection("u1");

    h.cache.record_product_view(&product_id(4)).await;
    assert_eq!(h.store.document_count(&viewed), 0);

    h.cache.sign_in(UserId::from("u1")).await;
    h.cache.record_product_view(&product_id(4)).await;
    assert_eq!(h.store.document_count(&viewed), 1);

    // Failures never reach the caller.
    h.store.set_offline(true);
    h.cache.record_product_view(&product_id(5)).await;
    h.store.set_offline(false);
    assert_eq!(h.store.document_count(&viewed), 1);
}
