//! Version-gated catalog cache.
//!
//! [`CatalogCache`] wraps a [`CatalogSource`] with an in-memory snapshot of
//! the four catalog views. Reads never wait on the network when a view is
//! populated; freshness is checked in the background afterwards. A full
//! refresh is single-flight: concurrent triggers coalesce into the one that
//! is already running.
//!
//! # Lifecycle
//!
//! ```ignore
//! let cache = CatalogCache::new(source, versions, oracle);
//! cache.start().await?;           // react to pushed version changes
//! let featured = cache.featured_products().await?;
//! cache.close();                  // stop background refreshes
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vitrine_core::constants::PRODUCTS_COLLECTION;
use vitrine_core::{
    CarouselItem, Category, Clock, Collection, Product, ProductId, StoreError, UserId,
    VersionToken, VitrineConfig, VitrineError, VitrineResult, WishlistError,
};

use super::collections::{
    CarouselItems, CatalogCollection, CatalogSnapshot, Categories, CollectionKind, Collections,
    FeaturedProducts,
};
use super::freshness::{CacheRead, FreshnessCoordinator};
use super::oracle::RemoteVersionOracle;
use super::single_flight::RefreshGate;
use super::version_store::VersionStore;
use super::wishlist::WishlistOverlay;
use crate::document_store::{DocumentStore, Subscription};
use crate::source::{CatalogSource, DocumentCatalogSource};

/// What a completed full refresh did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Views replaced with fresh data.
    pub refreshed: Vec<CollectionKind>,
    /// Views left unchanged because their fetch failed.
    pub failed: Vec<(CollectionKind, VitrineError)>,
    /// Token recorded as applied. `None` if the token could not be read or
    /// persisted.
    pub applied_token: Option<VersionToken>,
}

impl RefreshReport {
    /// True if every view was refreshed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, kind: CollectionKind, result: VitrineResult<()>) {
        match result {
            Ok(()) => self.refreshed.push(kind),
            Err(e) => self.failed.push((kind, e)),
        }
    }
}

/// Result of [`CatalogCache::refresh_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Another refresh was already running; this call did nothing.
    Coalesced,
    /// This call ran the refresh.
    Completed(RefreshReport),
}

impl RefreshOutcome {
    /// True if this call joined a refresh already in flight.
    pub fn is_coalesced(&self) -> bool {
        matches!(self, Self::Coalesced)
    }

    /// The report of a refresh this call ran.
    pub fn report(&self) -> Option<&RefreshReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Coalesced => None,
        }
    }
}

struct CatalogCacheInner {
    source: Arc<dyn CatalogSource>,
    coordinator: FreshnessCoordinator,
    overlay: WishlistOverlay,
    snapshot: CatalogSnapshot,
    gate: RefreshGate,
    clock: Arc<dyn Clock>,
    session: RwLock<Option<UserId>>,
    subscription: Mutex<Option<Subscription>>,
    closed: AtomicBool,
}

impl CatalogCacheInner {
    fn session_user(&self) -> Option<UserId> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_session(&self, user: &UserId) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            == Some(user)
    }

    /// Fetch one view and replace it. On failure the view is left as is.
    async fn refresh_one<C: CatalogCollection>(&self, user: Option<&UserId>) -> VitrineResult<()> {
        match C::load(self.source.as_ref(), &self.overlay, user).await {
            Ok(items) => {
                debug!(collection = %C::KIND, count = items.len(), "Replaced cached view");
                C::slot(&self.snapshot).replace(items, self.clock.now());
                Ok(())
            }
            Err(e) => {
                warn!(collection = %C::KIND, error = %e, "Refresh failed, keeping previous data");
                Err(e)
            }
        }
    }

    /// Set the `is_favorite` flag of every cached featured product matching
    /// `product`.
    fn patch_favorite(&self, product: &ProductId, favorite: bool) {
        self.snapshot.featured_products.update(|products| {
            for p in products.iter_mut().filter(|p| p.id == *product) {
                p.is_favorite = favorite;
            }
        });
    }

    /// Recompute `is_favorite` on cached featured products for the current
    /// session.
    async fn reproject_favorites(&self) {
        let Some((products, _)) = self.snapshot.featured_products.get() else {
            return;
        };
        let user = self.session_user();
        let annotated = self
            .overlay
            .annotate(user.as_ref(), products.as_ref().clone())
            .await;
        if self.session_user() != user {
            debug!("Session changed while projecting favorites, skipping");
            return;
        }

        let flags: HashMap<ProductId, bool> = annotated
            .into_iter()
            .map(|p| (p.id, p.is_favorite))
            .collect();
        self.snapshot.featured_products.update(|products| {
            for p in products.iter_mut() {
                if let Some(&favorite) = flags.get(&p.id) {
                    p.is_favorite = favorite;
                }
            }
        });
    }
}

/// In-memory catalog snapshot kept in step with the remote catalog version.
///
/// Cheap to clone; clones share the same snapshot.
#[derive(Clone)]
pub struct CatalogCache {
    inner: Arc<CatalogCacheInner>,
}

impl fmt::Debug for CatalogCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogCache")
            .field("refreshing", &self.inner.gate.is_refreshing())
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .field("user", &self.inner.session_user())
            .finish_non_exhaustive()
    }
}

impl CatalogCache {
    /// Build a cache around `source`. Snapshot timestamps use the oracle's
    /// clock.
    pub fn new(
        source: Arc<dyn CatalogSource>,
        versions: Arc<dyn VersionStore>,
        oracle: Arc<RemoteVersionOracle>,
    ) -> Self {
        let clock = Arc::clone(oracle.clock());
        Self {
            inner: Arc::new(CatalogCacheInner {
                overlay: WishlistOverlay::new(Arc::clone(&source)),
                coordinator: FreshnessCoordinator::new(versions, oracle),
                source,
                snapshot: CatalogSnapshot::default(),
                gate: RefreshGate::new(),
                clock,
                session: RwLock::new(None),
                subscription: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Build a cache reading the catalog and the version token from `store`.
    pub fn from_store(
        store: Arc<dyn DocumentStore>,
        versions: Arc<dyn VersionStore>,
        config: &VitrineConfig,
    ) -> VitrineResult<Self> {
        config.validate()?;
        let source = Arc::new(DocumentCatalogSource::with_config(Arc::clone(&store), config));
        let oracle = Arc::new(RemoteVersionOracle::with_config(store, config));
        Ok(Self::new(source, versions, oracle))
    }

    /// The freshness coordinator deciding when to refresh.
    pub fn coordinator(&self) -> &FreshnessCoordinator {
        &self.inner.coordinator
    }

    /// The wishlist overlay for the signed-in user.
    pub fn overlay(&self) -> &WishlistOverlay {
        &self.inner.overlay
    }

    /// True while a full refresh is running.
    pub fn is_refreshing(&self) -> bool {
        self.inner.gate.is_refreshing()
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// True if the view has been fetched at least once.
    pub fn is_populated(&self, kind: CollectionKind) -> bool {
        self.inner.snapshot.is_populated(kind)
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Read one view.
    ///
    /// A populated view is returned without touching the network. An empty
    /// view is fetched on its own (the other views are not touched) and
    /// stored. Either way a freshness check is then scheduled in the
    /// background. Fails only if the view is empty and the fetch fails.
    pub async fn read<C: CatalogCollection>(&self) -> VitrineResult<CacheRead<Arc<Vec<C::Item>>>> {
        let inner = &self.inner;
        let slot = C::slot(&inner.snapshot);

        let read = match slot.get() {
            Some((items, populated_at)) => {
                debug!(collection = %C::KIND, "Cache hit");
                CacheRead::from_cache(items, populated_at)
            }
            None => {
                debug!(collection = %C::KIND, "Cache miss, fetching view");
                let user = inner.session_user();
                let items = C::load(inner.source.as_ref(), &inner.overlay, user.as_ref()).await?;
                let (items, populated_at) = slot.populate_if_empty(items, inner.clock.now());
                CacheRead::from_source(items, populated_at)
            }
        };

        self.check_in_background();
        Ok(read)
    }

    /// Product categories, by display order.
    pub async fn categories(&self) -> VitrineResult<Arc<Vec<Category>>> {
        Ok(self.read::<Categories>().await?.into_value())
    }

    /// Featured products, annotated with the session's favorite flags.
    pub async fn featured_products(&self) -> VitrineResult<Arc<Vec<Product>>> {
        Ok(self.read::<FeaturedProducts>().await?.into_value())
    }

    /// Themed collections.
    pub async fn collections(&self) -> VitrineResult<Arc<Vec<Collection>>> {
        Ok(self.read::<Collections>().await?.into_value())
    }

    /// Home carousel items.
    pub async fn carousel_items(&self) -> VitrineResult<Arc<Vec<CarouselItem>>> {
        Ok(self.read::<CarouselItems>().await?.into_value())
    }

    // ========================================================================
    // FRESHNESS
    // ========================================================================

    fn check_in_background(&self) {
        if self.is_closed() {
            return;
        }
        match Handle::try_current() {
            Ok(handle) => {
                let cache = self.clone();
                handle.spawn(async move {
                    cache.check_and_refresh().await;
                });
            }
            Err(_) => debug!("No runtime available, skipping background freshness check"),
        }
    }

    /// Refresh if the coordinator says the snapshot is stale. Returns `None`
    /// when no refresh was needed or the cache is closed.
    pub async fn check_and_refresh(&self) -> Option<RefreshOutcome> {
        if self.is_closed() {
            return None;
        }
        if self.inner.coordinator.should_refresh().await {
            Some(self.refresh_all().await)
        } else {
            None
        }
    }

    /// Refresh all four views.
    ///
    /// Returns [`RefreshOutcome::Coalesced`] immediately if a refresh is
    /// already running. Each view is replaced only if its own fetch
    /// succeeds. The wishlist overlay is refreshed before featured products
    /// are fetched. Once all four attempts have finished, failed or not, the
    /// live remote token is recorded as applied. A failed view keeps its
    /// previous snapshot until the next version change.
    pub async fn refresh_all(&self) -> RefreshOutcome {
        let inner = &self.inner;
        let Some(_guard) = inner.gate.try_begin() else {
            debug!("Refresh already in progress, coalescing");
            return RefreshOutcome::Coalesced;
        };

        info!("Starting full catalog refresh");
        let user = inner.session_user();

        let featured = async {
            if let Some(user) = user.as_ref() {
                if let Err(e) = inner.overlay.refresh(user).await {
                    warn!(user = %user, error = %e, "Wishlist refresh failed, falling back to lookups");
                }
            }
            let result = inner.refresh_one::<FeaturedProducts>(user.as_ref()).await;
            if result.is_ok() && inner.session_user() != user {
                inner.reproject_favorites().await;
            }
            result
        };

        let (categories, featured, collections, carousel) = tokio::join!(
            inner.refresh_one::<Categories>(user.as_ref()),
            featured,
            inner.refresh_one::<Collections>(user.as_ref()),
            inner.refresh_one::<CarouselItems>(user.as_ref()),
        );

        let mut report = RefreshReport::default();
        report.record(CollectionKind::Categories, categories);
        report.record(CollectionKind::FeaturedProducts, featured);
        report.record(CollectionKind::Collections, collections);
        report.record(CollectionKind::CarouselItems, carousel);

        if !report.is_complete() {
            let failed: Vec<CollectionKind> = report.failed.iter().map(|(kind, _)| *kind).collect();
            warn!(failed = ?failed, "Catalog refresh incomplete, failed views keep previous data");
        }
        report.applied_token = self.apply_remote_token().await;

        info!(
            refreshed = report.refreshed.len(),
            failed = report.failed.len(),
            token = ?report.applied_token,
            "Finished full catalog refresh"
        );
        RefreshOutcome::Completed(report)
    }

    /// Read the live remote token and record it as applied.
    async fn apply_remote_token(&self) -> Option<VersionToken> {
        let coordinator = &self.inner.coordinator;
        let token = match coordinator.oracle().fetch_live_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Could not read remote version after refresh");
                return None;
            }
        };
        match coordinator.record_applied(&token).await {
            Ok(()) => {
                info!(token = %token, "Applied catalog version");
                Some(token)
            }
            Err(e) => {
                warn!(token = %token, error = %e, "Failed to persist applied version");
                None
            }
        }
    }

    // ========================================================================
    // SESSION
    // ========================================================================

    /// The signed-in user, if any.
    pub fn current_user(&self) -> Option<UserId> {
        self.inner.session_user()
    }

    /// Switch the session to `user`: reload the wishlist overlay and
    /// re-project favorites on cached featured products. A failed wishlist
    /// read is logged; membership then falls back to point lookups.
    pub async fn sign_in(&self, user: UserId) {
        let inner = &self.inner;
        *inner.session.write().unwrap_or_else(PoisonError::into_inner) = Some(user.clone());
        info!(user = %user, "Signed in");

        if let Err(e) = inner.overlay.refresh(&user).await {
            warn!(user = %user, error = %e, "Wishlist refresh failed on sign in");
        }
        inner.reproject_favorites().await;
    }

    /// End the session: drop the overlay and clear every favorite flag.
    pub fn sign_out(&self) {
        let inner = &self.inner;
        let previous = inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        inner.overlay.clear();
        inner.snapshot.featured_products.update(|products| {
            for p in products.iter_mut() {
                p.is_favorite = false;
            }
        });
        if let Some(user) = previous {
            info!(user = %user, "Signed out");
        }
    }

    // ========================================================================
    // WISHLIST
    // ========================================================================

    fn require_user(&self) -> VitrineResult<UserId> {
        self.inner
            .session_user()
            .ok_or_else(|| WishlistError::NotSignedIn.into())
    }

    /// Record a membership change locally after the remote write succeeded.
    fn apply_membership(&self, user: &UserId, product: &ProductId, member: bool) {
        let inner = &self.inner;
        if !inner.is_session(user) {
            debug!(user = %user, "Session changed during wishlist write, skipping local patch");
            return;
        }
        inner.overlay.set_member(user, product, member);
        inner.patch_favorite(product, member);
    }

    /// Add `product` to the signed-in user's wishlist. The local overlay and
    /// cached favorite flags change only if the remote write succeeds.
    pub async fn add_to_wishlist(&self, product: &ProductId) -> VitrineResult<()> {
        let user = self.require_user()?;
        self.inner.source.add_to_wishlist(&user, product).await?;
        self.apply_membership(&user, product, true);
        Ok(())
    }

    /// Remove `product` from the signed-in user's wishlist. Local state
    /// changes only if the remote write succeeds.
    pub async fn remove_from_wishlist(&self, product: &ProductId) -> VitrineResult<()> {
        let user = self.require_user()?;
        self.inner.source.remove_from_wishlist(&user, product).await?;
        self.apply_membership(&user, product, false);
        Ok(())
    }

    /// Flip membership of `product`. Returns the new membership.
    pub async fn toggle_wishlist(&self, product: &ProductId) -> VitrineResult<bool> {
        if self.is_member(product).await? {
            self.remove_from_wishlist(product).await?;
            Ok(false)
        } else {
            self.add_to_wishlist(product).await?;
            Ok(true)
        }
    }

    /// Whether `product` is on the signed-in user's wishlist. Always false
    /// when signed out.
    pub async fn is_member(&self, product: &ProductId) -> VitrineResult<bool> {
        match self.inner.session_user() {
            Some(user) => self.inner.overlay.is_member(&user, product).await,
            None => Ok(false),
        }
    }

    // ========================================================================
    // UNCACHED PRODUCT READS
    // ========================================================================

    /// One product, annotated with the session's favorite flag.
    pub async fn product_details(&self, id: &ProductId) -> VitrineResult<Product> {
        let inner = &self.inner;
        let product = inner.source.product(id).await?;
        let user = inner.session_user();
        let mut annotated = inner.overlay.annotate(user.as_ref(), vec![product]).await;
        annotated.pop().ok_or_else(|| {
            StoreError::NotFound {
                collection: PRODUCTS_COLLECTION.to_string(),
                id: id.to_string(),
            }
            .into()
        })
    }

    /// Record that the signed-in user opened `product`. Does nothing when
    /// signed out. A failed write is logged and otherwise ignored.
    pub async fn record_product_view(&self, product: &ProductId) {
        let Some(user) = self.inner.session_user() else {
            return;
        };
        if let Err(e) = self.inner.source.record_product_view(&user, product).await {
            warn!(user = %user, product = %product, error = %e, "Failed to record product view");
        }
    }

    /// Products in a category, optionally leaving one out (the product being
    /// viewed, for "similar items").
    pub async fn products_by_category(
        &self,
        category_id: &str,
        exclude: Option<&ProductId>,
    ) -> VitrineResult<Vec<Product>> {
        let inner = &self.inner;
        let products: Vec<Product> = inner
            .source
            .products_by_category(category_id)
            .await?
            .into_iter()
            .filter(|p| Some(&p.id) != exclude)
            .collect();
        let user = inner.session_user();
        Ok(inner.overlay.annotate(user.as_ref(), products).await)
    }

    /// Every product on the signed-in user's wishlist, ordered by id.
    pub async fn wishlist_products(&self) -> VitrineResult<Vec<Product>> {
        let user = self.require_user()?;
        let mut ids: Vec<ProductId> = self.inner.source.wishlist(&user).await?.into_iter().collect();
        ids.sort();
        let products = self.inner.source.products_by_ids(&ids).await?;
        Ok(products.into_iter().map(|p| p.with_favorite(true)).collect())
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Subscribe to pushed version changes. A pushed token that differs from
    /// the applied one triggers a full refresh. Calling `start` again while
    /// subscribed does nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(&self) -> VitrineResult<()> {
        let inner = &self.inner;
        if self.is_closed() {
            warn!("Cache is closed, not subscribing to version changes");
            return Ok(());
        }

        let mut slot = inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            debug!("Already subscribed to version changes");
            return Ok(());
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<VersionToken>();
        let subscription = inner.coordinator.on_remote_change(move |token| {
            if tx.send(token).is_err() {
                debug!("Push listener gone, dropping version change");
            }
        })?;
        *slot = Some(subscription);
        drop(slot);

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(token) = rx.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                CatalogCache { inner }.on_remote_version(token).await;
            }
            debug!("Push listener stopped");
        });

        info!("Subscribed to catalog version changes");
        Ok(())
    }

    async fn on_remote_version(&self, token: VersionToken) {
        if self.is_closed() {
            return;
        }
        if self.inner.coordinator.is_stale_against(&token).await {
            info!(token = %token, "Remote catalog version changed");
            self.refresh_all().await;
        } else {
            debug!(token = %token, "Pushed version already applied");
        }
    }

    /// Stop reacting to pushed changes and stop scheduling background
    /// refreshes. Reads keep serving the snapshot.
    pub fn close(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let subscription = inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        info!("Catalog cache closed");
    }
}
