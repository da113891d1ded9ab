//! Catalog source: uncached reads and wishlist writes against the remote store.
//!
//! [`CatalogSource`] is the plain fetcher capability the cache wraps. It
//! knows nothing about freshness or snapshots; every call goes to the
//! remote store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use vitrine_core::constants::{
    recently_viewed_collection, wishlist_collection, ADDED_AT_FIELD, CAROUSEL_ITEMS_COLLECTION,
    CATEGORIES_COLLECTION, CATEGORY_PRODUCTS_COLLECTION, FEATURED_LIST_DOCUMENT,
    FEATURED_PRODUCTS_COLLECTION, ORDER_FIELD, PRODUCTS_COLLECTION, PRODUCT_IDS_FIELD,
    THEMED_COLLECTIONS_COLLECTION, VIEWED_AT_FIELD,
};
use vitrine_core::{
    CarouselItem, Category, Clock, Collection, Fields, Product, ProductId, StoreError, SystemClock,
    UserId, VitrineConfig, VitrineResult,
};

use crate::document_store::DocumentStore;

/// Uncached catalog reads and wishlist writes.
///
/// Products returned from this trait always carry `is_favorite = false`;
/// the favorite projection is applied by the cache layer.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    // ========================================================================
    // CATALOG VIEWS
    // ========================================================================

    /// All categories, in display order.
    async fn categories(&self) -> VitrineResult<Vec<Category>>;

    /// Featured products, in the order of the featured list.
    async fn featured_products(&self) -> VitrineResult<Vec<Product>>;

    /// Themed collections, in display order.
    async fn collections(&self) -> VitrineResult<Vec<Collection>>;

    /// Promotional carousel slides.
    async fn carousel_items(&self) -> VitrineResult<Vec<CarouselItem>>;

    // ========================================================================
    // PRODUCT READS
    // ========================================================================

    /// A single product. Missing products are a `StoreError::NotFound`.
    async fn product(&self, id: &ProductId) -> VitrineResult<Product>;

    /// Products listed under a category.
    async fn products_by_category(&self, category_id: &str) -> VitrineResult<Vec<Product>>;

    /// Products by id, in the order given. Unknown ids are skipped.
    async fn products_by_ids(&self, ids: &[ProductId]) -> VitrineResult<Vec<Product>>;

    // ========================================================================
    // WISHLIST
    // ========================================================================

    /// All products on a user's wishlist.
    async fn wishlist(&self, user: &UserId) -> VitrineResult<HashSet<ProductId>>;

    /// Authoritative membership check for one product.
    async fn wishlist_contains(&self, user: &UserId, product: &ProductId) -> VitrineResult<bool>;

    async fn add_to_wishlist(&self, user: &UserId, product: &ProductId) -> VitrineResult<()>;

    async fn remove_from_wishlist(&self, user: &UserId, product: &ProductId) -> VitrineResult<()>;

    // ========================================================================
    // ACTIVITY
    // ========================================================================

    /// Note that `user` opened `product`. Repeat views overwrite the entry.
    async fn record_product_view(&self, user: &UserId, product: &ProductId) -> VitrineResult<()>;
}

/// [`CatalogSource`] backed by a [`DocumentStore`].
#[derive(Clone)]
pub struct DocumentCatalogSource {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    id_batch_limit: usize,
}

impl DocumentCatalogSource {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_config(store, &VitrineConfig::default())
    }

    pub fn with_config(store: Arc<dyn DocumentStore>, config: &VitrineConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            id_batch_limit: config.id_batch_limit.max(1),
        }
    }

    /// Use a different clock for wishlist timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Product ids listed on an index document (featured list, category).
    async fn product_ids_on(&self, collection: &str, id: &str) -> VitrineResult<Vec<ProductId>> {
        let doc = self.store.get_document(collection, id).await?;
        Ok(doc
            .map(|d| {
                d.get_str_list(PRODUCT_IDS_FIELD)
                    .into_iter()
                    .map(ProductId::from)
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl CatalogSource for DocumentCatalogSource {
    async fn categories(&self) -> VitrineResult<Vec<Category>> {
        let docs = self
            .store
            .query_collection(CATEGORIES_COLLECTION, Some(ORDER_FIELD))
            .await?;
        let categories: Vec<Category> = docs.iter().map(Category::from_document).collect();
        debug!(count = categories.len(), "Fetched categories");
        Ok(categories)
    }

    async fn featured_products(&self) -> VitrineResult<Vec<Product>> {
        let ids = self
            .product_ids_on(FEATURED_PRODUCTS_COLLECTION, FEATURED_LIST_DOCUMENT)
            .await?;
        if ids.is_empty() {
            debug!("No featured product ids found");
            return Ok(Vec::new());
        }
        let products = self.products_by_ids(&ids).await?;
        debug!(count = products.len(), "Fetched featured products");
        Ok(products)
    }

    async fn collections(&self) -> VitrineResult<Vec<Collection>> {
        let docs = self
            .store
            .query_collection(THEMED_COLLECTIONS_COLLECTION, Some(ORDER_FIELD))
            .await?;
        let collections: Vec<Collection> = docs.iter().map(Collection::from_document).collect();
        debug!(count = collections.len(), "Fetched themed collections");
        Ok(collections)
    }

    async fn carousel_items(&self) -> VitrineResult<Vec<CarouselItem>> {
        let docs = self
            .store
            .query_collection(CAROUSEL_ITEMS_COLLECTION, None)
            .await?;
        let items: Vec<CarouselItem> = docs.iter().map(CarouselItem::from_document).collect();
        debug!(count = items.len(), "Fetched carousel items");
        Ok(items)
    }

    async fn product(&self, id: &ProductId) -> VitrineResult<Product> {
        let doc = self
            .store
            .get_document(PRODUCTS_COLLECTION, id.as_str())
            .await?
            .ok_or_else(|| StoreError::NotFound {
                collection: PRODUCTS_COLLECTION.to_string(),
                id: id.to_string(),
            })?;
        Ok(Product::from_document(&doc))
    }

    async fn products_by_category(&self, category_id: &str) -> VitrineResult<Vec<Product>> {
        let ids = self
            .product_ids_on(CATEGORY_PRODUCTS_COLLECTION, category_id)
            .await?;
        self.products_by_ids(&ids).await
    }

    async fn products_by_ids(&self, ids: &[ProductId]) -> VitrineResult<Vec<Product>> {
        let mut found: HashMap<ProductId, Product> = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(self.id_batch_limit) {
            let batch: Vec<String> = chunk.iter().map(|id| id.to_string()).collect();
            let docs = self.store.query_by_ids(PRODUCTS_COLLECTION, &batch).await?;
            for doc in &docs {
                let product = Product::from_document(doc);
                found.insert(product.id.clone(), product);
            }
        }

        let mut seen = HashSet::with_capacity(ids.len());
        Ok(ids
            .iter()
            .filter(|id| seen.insert((*id).clone()))
            .filter_map(|id| found.remove(id))
            .collect())
    }

    async fn wishlist(&self, user: &UserId) -> VitrineResult<HashSet<ProductId>> {
        let docs = self
            .store
            .query_collection(&wishlist_collection(user.as_str()), None)
            .await?;
        Ok(docs.into_iter().map(|d| ProductId::new(d.id)).collect())
    }

    async fn wishlist_contains(&self, user: &UserId, product: &ProductId) -> VitrineResult<bool> {
        let doc = self
            .store
            .get_document(&wishlist_collection(user.as_str()), product.as_str())
            .await?;
        Ok(doc.is_some())
    }

    async fn add_to_wishlist(&self, user: &UserId, product: &ProductId) -> VitrineResult<()> {
        let mut fields = Fields::new();
        fields.insert(
            ADDED_AT_FIELD.to_string(),
            Value::String(self.clock.now().to_rfc3339()),
        );
        self.store
            .set_document(&wishlist_collection(user.as_str()), product.as_str(), fields)
            .await?;
        debug!(user = %user, product = %product, "Added product to wishlist");
        Ok(())
    }

    async fn remove_from_wishlist(&self, user: &UserId, product: &ProductId) -> VitrineResult<()> {
        self.store
            .delete_document(&wishlist_collection(user.as_str()), product.as_str())
            .await?;
        debug!(user = %user, product = %product, "Removed product from wishlist");
        Ok(())
    }

    async fn record_product_view(&self, user: &UserId, product: &ProductId) -> VitrineResult<()> {
        let mut fields = Fields::new();
        fields.insert(
            VIEWED_AT_FIELD.to_string(),
            Value::String(self.clock.now().to_rfc3339()),
        );
        self.store
            .set_document(&recently_viewed_collection(user.as_str()), product.as_str(), fields)
            .await?;
        debug!(user = %user, product = %product, "Recorded product view");
        Ok(())
    }
}
