//! VITRINE Test Utilities
//!
//! Shared test infrastructure for the VITRINE workspace:
//! - Instrumented collaborators (fetch counting, gating, failure injection)
//! - Proptest generators for catalog types
//! - Fixtures that seed a standard catalog and wire up a cache
//! - Custom assertions for VITRINE results

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;

pub use vitrine_core::{
    CarouselItem, Category, Clock, Collection, LocalVersionRecord, ManualClock, PersistenceError,
    Product, ProductId, StoreError, UserId, VersionToken, VitrineError, VitrineResult,
    WishlistError,
};
pub use vitrine_storage::cache::{
    CatalogCache, CollectionKind, InMemoryVersionStore, RefreshOutcome, RefreshReport,
    RemoteVersionOracle, VersionStore,
};
pub use vitrine_storage::{CatalogSource, DocumentCatalogSource, InMemoryDocumentStore};

/// Initialize test logging. Safe to call from every test.
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vitrine=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Let spawned background work run to completion on the current runtime.
pub async fn settle() {
    for _ in 0..200 {
        tokio::task::yield_now().await;
    }
}

/// Yield until `condition` holds. Panics if it never does.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

// ============================================================================
// INSTRUMENTED COLLABORATORS
// ============================================================================

#[derive(Debug, Default)]
struct ViewCounters {
    categories: AtomicUsize,
    featured_products: AtomicUsize,
    collections: AtomicUsize,
    carousel_items: AtomicUsize,
}

impl ViewCounters {
    fn counter(&self, kind: CollectionKind) -> &AtomicUsize {
        match kind {
            CollectionKind::Categories => &self.categories,
            CollectionKind::FeaturedProducts => &self.featured_products,
            CollectionKind::Collections => &self.collections,
            CollectionKind::CarouselItems => &self.carousel_items,
        }
    }
}

/// [`CatalogSource`] wrapper that counts view fetches and can hold them at a
/// gate or fail them on demand.
///
/// Product and wishlist calls are passed through untouched.
pub struct InstrumentedSource {
    inner: Arc<dyn CatalogSource>,
    fetches: ViewCounters,
    entered: AtomicUsize,
    gate: watch::Sender<bool>,
    failing: Mutex<HashSet<CollectionKind>>,
    wishlist_reads: AtomicUsize,
}

impl InstrumentedSource {
    pub fn new(inner: Arc<dyn CatalogSource>) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner,
            fetches: ViewCounters::default(),
            entered: AtomicUsize::new(0),
            gate,
            failing: Mutex::new(HashSet::new()),
            wishlist_reads: AtomicUsize::new(0),
        }
    }

    /// Completed and in-flight fetches of one view.
    pub fn fetches(&self, kind: CollectionKind) -> usize {
        self.fetches.counter(kind).load(Ordering::SeqCst)
    }

    /// Fetches across all four views.
    pub fn total_fetches(&self) -> usize {
        CollectionKind::ALL.iter().map(|k| self.fetches(*k)).sum()
    }

    /// View fetches that have started (including ones waiting at the gate).
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Bulk wishlist reads passed through.
    pub fn wishlist_reads(&self) -> usize {
        self.wishlist_reads.load(Ordering::SeqCst)
    }

    /// Make view fetches wait until [`open_gate`](Self::open_gate).
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn fail(&self, kind: CollectionKind) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind);
    }

    pub fn restore(&self, kind: CollectionKind) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind);
    }

    async fn enter(&self, kind: CollectionKind) -> VitrineResult<()> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.fetches.counter(kind).fetch_add(1, Ordering::SeqCst);

        let mut open = self.gate.subscribe();
        let _ = open.wait_for(|open| *open).await;

        let failing = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&kind);
        if failing {
            return Err(StoreError::Unavailable {
                reason: format!("{kind} fetch failed"),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogSource for InstrumentedSource {
    async fn categories(&self) -> VitrineResult<Vec<Category>> {
        self.enter(CollectionKind::Categories).await?;
        self.inner.categories().await
    }

    async fn featured_products(&self) -> VitrineResult<Vec<Product>> {
        self.enter(CollectionKind::FeaturedProducts).await?;
        self.inner.featured_products().await
    }

    async fn collections(&self) -> VitrineResult<Vec<Collection>> {
        self.enter(CollectionKind::Collections).await?;
        self.inner.collections().await
    }

    async fn carousel_items(&self) -> VitrineResult<Vec<CarouselItem>> {
        self.enter(CollectionKind::CarouselItems).await?;
        self.inner.carousel_items().await
    }

    async fn product(&self, id: &ProductId) -> VitrineResult<Product> {
        self.inner.product(id).await
    }

    async fn products_by_category(&self, category_id: &str) -> VitrineResult<Vec<Product>> {
        self.inner.products_by_category(category_id).await
    }

    async fn products_by_ids(&self, ids: &[ProductId]) -> VitrineResult<Vec<Product>> {
        self.inner.products_by_ids(ids).await
    }

    async fn wishlist(&self, user: &UserId) -> VitrineResult<HashSet<ProductId>> {
        self.wishlist_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.wishlist(user).await
    }

    async fn wishlist_contains(&self, user: &UserId, product: &ProductId) -> VitrineResult<bool> {
        self.inner.wishlist_contains(user, product).await
    }

    async fn add_to_wishlist(&self, user: &UserId, product: &ProductId) -> VitrineResult<()> {
        self.inner.add_to_wishlist(user, product).await
    }

    async fn remove_from_wishlist(&self, user: &UserId, product: &ProductId) -> VitrineResult<()> {
        self.inner.remove_from_wishlist(user, product).await
    }
    async fn record_product_view(&self, user: &UserId, product: &ProductId) -> VitrineResult<()> {
        self.inner.record_product_view(user, product).await
    }
}

/// [`VersionStore`] wrapper that counts writes and can fail on demand.
pub struct InstrumentedVersionStore {
    inner: InMemoryVersionStore,
    sets: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InstrumentedVersionStore {
    pub fn new(inner: InMemoryVersionStore) -> Self {
        Self {
            inner,
            sets: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Successful `set` calls.
    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl VersionStore for InstrumentedVersionStore {
    async fn get(&self) -> VitrineResult<LocalVersionRecord> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PersistenceError::Read {
                reason: "injected read failure".to_string(),
            }
            .into());
        }
        self.inner.get().await
    }

    async fn set(&self, token: &VersionToken) -> VitrineResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Write {
                reason: "injected write failure".to_string(),
            }
            .into());
        }
        self.inner.set(token).await?;
        self.sets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for VITRINE types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_version_token() -> impl Strategy<Value = VersionToken> {
        (0u32..1000).prop_map(|n| VersionToken::new(n.to_string()))
    }

    pub fn arb_product_id() -> impl Strategy<Value = ProductId> {
        "p[0-9]{2}".prop_map(|s| ProductId::new(s))
    }

    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        "[a-z]{3,8}".prop_map(|s| UserId::new(s))
    }

    /// Product ids, possibly with repeats.
    pub fn arb_product_ids(max: usize) -> impl Strategy<Value = Vec<ProductId>> {
        prop::collection::vec(arb_product_id(), 0..max)
    }

    /// A product decoded from a generated document.
    pub fn arb_product() -> impl Strategy<Value = Product> {
        (arb_product_id(), "[A-Z][a-z]{2,10}", 0.0f64..100_000.0).prop_map(|(id, name, price)| {
            Product::from_document(&vitrine_core::Document::from_json(
                id.as_str(),
                serde_json::json!({ "name": name, "price": price }),
            ))
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! A standard seeded catalog and a fully wired cache around it.

    use super::*;
    use serde_json::json;
    use vitrine_core::constants::{
        wishlist_collection, CACHE_CONTROL_DOCUMENT, CAROUSEL_ITEMS_COLLECTION,
        CATEGORIES_COLLECTION, CATEGORY_PRODUCTS_COLLECTION, FEATURED_LIST_DOCUMENT,
        FEATURED_PRODUCTS_COLLECTION, METADATA_COLLECTION, PRODUCTS_COLLECTION,
        THEMED_COLLECTIONS_COLLECTION,
    };

    /// Products in the standard catalog: `p01` to `p24`.
    pub const PRODUCT_COUNT: usize = 24;

    /// Featured products in the standard catalog: `p01` to `p12`, more than
    /// one id batch.
    pub const FEATURED_COUNT: usize = 12;

    pub fn product_id(n: usize) -> ProductId {
        ProductId::new(format!("p{n:02}"))
    }

    pub fn featured_ids() -> Vec<ProductId> {
        (1..=FEATURED_COUNT).map(product_id).collect()
    }

    /// Seed categories, products, the featured list, themed collections,
    /// carousel slides, one category listing and the remote version.
    pub fn seed_standard_catalog(store: &InMemoryDocumentStore, remote_version: &str) {
        for (id, name, order) in [("rings", "Rings", 1), ("chains", "Chains", 2), ("earrings", "Earrings", 3)] {
            store.put_json(
                CATEGORIES_COLLECTION,
                id,
                json!({ "name": name, "order": order, "image_url": format!("gs://catalog/{id}.jpg") }),
            );
        }
        // Unordered drafts never show up in the ordered listing.
        store.put_json(CATEGORIES_COLLECTION, "drafts", json!({ "name": "Drafts" }));

        for n in 1..=PRODUCT_COUNT {
            let id = product_id(n);
            let category = if n % 2 == 0 { "chains" } else { "rings" };
            store.put_json(
                PRODUCTS_COLLECTION,
                id.as_str(),
                json!({
                    "id": id.as_str(),
                    "name": format!("Piece {n}"),
                    "price": 1000.0 * n as f64,
                    "category_id": category,
                    "material": "gold",
                    "images": [format!("gs://catalog/{}.jpg", id.as_str())],
                }),
            );
        }

        let featured: Vec<String> = featured_ids().into_iter().map(ProductId::into_inner).collect();
        store.put_json(
            FEATURED_PRODUCTS_COLLECTION,
            FEATURED_LIST_DOCUMENT,
            json!({ "product_ids": featured }),
        );

        let rings: Vec<String> = (1..=PRODUCT_COUNT)
            .filter(|n| n % 2 == 1)
            .map(|n| product_id(n).into_inner())
            .collect();
        store.put_json(CATEGORY_PRODUCTS_COLLECTION, "rings", json!({ "product_ids": rings }));

        store.put_json(
            THEMED_COLLECTIONS_COLLECTION,
            "bridal",
            json!({ "name": "Bridal", "order": 1, "imageUrl": "gs://catalog/bridal.jpg", "description": "For the day" }),
        );
        store.put_json(
            THEMED_COLLECTIONS_COLLECTION,
            "everyday",
            json!({ "name": "Everyday", "order": 2, "imageUrl": "gs://catalog/everyday.jpg", "description": "Light pieces" }),
        );

        store.put_json(
            CAROUSEL_ITEMS_COLLECTION,
            "sale",
            json!({ "title": "Festive sale", "subtitle": "Up to 20% off", "buttonText": "Shop", "imageUrl": "gs://catalog/sale.jpg" }),
        );
        store.put_json(
            CAROUSEL_ITEMS_COLLECTION,
            "new",
            json!({ "title": "New arrivals", "subtitle": "", "buttonText": "Explore", "imageUrl": "gs://catalog/new.jpg" }),
        );

        set_remote_version(store, remote_version);
    }

    /// Publish a new remote version (notifies subscribers).
    pub fn set_remote_version(store: &InMemoryDocumentStore, version: &str) {
        store.put_json(METADATA_COLLECTION, CACHE_CONTROL_DOCUMENT, json!({ "version": version }));
    }

    /// Rename a category remotely, as an admin edit would.
    pub fn rename_category(store: &InMemoryDocumentStore, id: &str, name: &str, order: i64) {
        store.put_json(CATEGORIES_COLLECTION, id, json!({ "name": name, "order": order }));
    }

    /// Put `product` on `user`'s wishlist directly in the store.
    pub fn wish(store: &InMemoryDocumentStore, user: &str, product: &str) {
        store.put_json(
            &wishlist_collection(user),
            product,
            json!({ "added_at": "2024-01-01T00:00:00Z" }),
        );
    }

    /// A cache over the standard catalog with instrumented collaborators and
    /// a manual clock.
    pub struct Harness {
        pub store: Arc<InMemoryDocumentStore>,
        pub clock: Arc<ManualClock>,
        pub source: Arc<InstrumentedSource>,
        pub versions: Arc<InstrumentedVersionStore>,
        pub oracle: Arc<RemoteVersionOracle>,
        pub cache: CatalogCache,
    }

    impl Harness {
        /// Standard catalog published at `remote`, local record at `local`.
        pub async fn new(local: &str, remote: &str) -> Self {
            let store = Arc::new(InMemoryDocumentStore::new());
            seed_standard_catalog(&store, remote);
            Self::over(store, local).await
        }

        /// Wire a cache over an already seeded store.
        pub async fn over(store: Arc<InMemoryDocumentStore>, local: &str) -> Self {
            let clock = Arc::new(ManualClock::at_epoch());
            let documents = DocumentCatalogSource::new(store.clone()).with_clock(clock.clone());
            let source = Arc::new(InstrumentedSource::new(Arc::new(documents)));

            let versions = InMemoryVersionStore::with_clock(clock.clone());
            let versions = Arc::new(InstrumentedVersionStore::new(versions));
            if local != "0" {
                // Seed the record without counting it as a refresh write.
                if let Err(e) = versions.inner.set(&VersionToken::from(local)).await {
                    panic!("seeding the local version failed: {e}");
                }
            }

            let oracle = Arc::new(RemoteVersionOracle::new(store.clone()).with_clock(clock.clone()));
            let cache = CatalogCache::new(source.clone(), versions.clone(), oracle.clone());

            Self {
                store,
                clock,
                source,
                versions,
                oracle,
                cache,
            }
        }

        pub async fn local_token(&self) -> VersionToken {
            self.cache.coordinator().local_token().await
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for VITRINE results.

    use super::*;

    /// Assert that an outcome is a completed refresh and return its report.
    #[track_caller]
    pub fn assert_completed(outcome: &RefreshOutcome) -> &RefreshReport {
        match outcome.report() {
            Some(report) => report,
            None => panic!("Expected a completed refresh, got: {:?}", outcome),
        }
    }

    /// Assert that a result is a transient store error.
    #[track_caller]
    pub fn assert_transient<T: std::fmt::Debug>(result: &VitrineResult<T>) {
        match result {
            Err(e) if e.is_transient() => {}
            other => panic!("Expected a transient error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_not_signed_in<T: std::fmt::Debug>(result: &VitrineResult<T>) {
        match result {
            Err(VitrineError::Wishlist(WishlistError::NotSignedIn)) => {}
            other => panic!("Expected NotSignedIn, got: {:?}", other),
        }
    }

    /// Assert the featured products' ids and favorite flags.
    #[track_caller]
    pub fn assert_favorites(products: &[Product], expected: &[&str]) {
        let favorites: Vec<&str> = products
            .iter()
            .filter(|p| p.is_favorite)
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(favorites, expected, "Unexpected favorite flags");
    }
}

pub use assertions::*;
pub use fixtures::*;
