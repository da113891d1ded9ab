//! The four cached catalog views and their in-memory snapshot.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use vitrine_core::{CarouselItem, Category, Collection, Product, Timestamp, UserId, VitrineResult};

use super::wishlist::WishlistOverlay;
use crate::source::CatalogSource;

/// Boxed future returned by [`CatalogCollection::load`].
pub type LoadFuture<'a, T> = Pin<Box<dyn Future<Output = VitrineResult<Vec<T>>> + Send + 'a>>;

/// Identifies one of the cached views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionKind {
    Categories,
    FeaturedProducts,
    Collections,
    CarouselItems,
}

impl CollectionKind {
    /// Every view, in refresh order.
    pub const ALL: [CollectionKind; 4] = [
        CollectionKind::Categories,
        CollectionKind::FeaturedProducts,
        CollectionKind::Collections,
        CollectionKind::CarouselItems,
    ];

    /// Name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Categories => "categories",
            CollectionKind::FeaturedProducts => "featured_products",
            CollectionKind::Collections => "collections",
            CollectionKind::CarouselItems => "carousel_items",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct SlotEntry<T> {
    items: Arc<Vec<T>>,
    populated_at: Timestamp,
}

/// One cached view: empty until first populated, then replaced wholesale.
///
/// Readers get an `Arc` to an immutable sequence; replacement never mutates
/// a sequence a reader already holds.
#[derive(Debug)]
pub struct Slot<T> {
    entry: RwLock<Option<SlotEntry<T>>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            entry: RwLock::new(None),
        }
    }
}

impl<T: Clone> Slot<T> {
    /// Current contents and when they were populated, if any.
    pub fn get(&self) -> Option<(Arc<Vec<T>>, Timestamp)> {
        self.entry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|e| (Arc::clone(&e.items), e.populated_at))
    }

    /// True once the slot holds a snapshot.
    pub fn is_populated(&self) -> bool {
        self.entry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Swap in a new snapshot. Readers holding the old one keep it.
    pub fn replace(&self, items: Vec<T>, populated_at: Timestamp) {
        *self.entry.write().unwrap_or_else(PoisonError::into_inner) = Some(SlotEntry {
            items: Arc::new(items),
            populated_at,
        });
    }

    /// Store `items` unless the slot was populated meanwhile. Returns what the
    /// slot holds afterwards.
    pub fn populate_if_empty(&self, items: Vec<T>, populated_at: Timestamp) -> (Arc<Vec<T>>, Timestamp) {
        let mut entry = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        let current = entry.get_or_insert_with(|| SlotEntry {
            items: Arc::new(items),
            populated_at,
        });
        (Arc::clone(&current.items), current.populated_at)
    }

    /// Patch the populated sequence in place (copy on write). Does nothing
    /// if the slot is empty. Keeps the population time.
    pub fn update<F>(&self, patch: F)
    where
        F: FnOnce(&mut Vec<T>),
    {
        let mut entry = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = entry.as_mut() {
            patch(Arc::make_mut(&mut current.items));
        }
    }
}

/// In-memory snapshot of all four views. The views are independent.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    pub categories: Slot<Category>,
    pub featured_products: Slot<Product>,
    pub collections: Slot<Collection>,
    pub carousel_items: Slot<CarouselItem>,
}

impl CatalogSnapshot {
    /// True if the view for `kind` is populated.
    pub fn is_populated(&self, kind: CollectionKind) -> bool {
        match kind {
            CollectionKind::Categories => self.categories.is_populated(),
            CollectionKind::FeaturedProducts => self.featured_products.is_populated(),
            CollectionKind::Collections => self.collections.is_populated(),
            CollectionKind::CarouselItems => self.carousel_items.is_populated(),
        }
    }
}

/// A cached catalog view: where it lives in the snapshot and how to fetch it.
pub trait CatalogCollection: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;

    const KIND: CollectionKind;

    fn slot(snapshot: &CatalogSnapshot) -> &Slot<Self::Item>;

    /// Fetch the whole view from the source. Views of products are annotated
    /// with favorites for `user` through `overlay`.
    fn load<'a>(
        source: &'a dyn CatalogSource,
        overlay: &'a WishlistOverlay,
        user: Option<&'a UserId>,
    ) -> LoadFuture<'a, Self::Item>;
}

/// Categories, in display order.
#[derive(Debug, Clone, Copy)]
pub struct Categories;

/// Featured products, annotated with favorites.
#[derive(Debug, Clone, Copy)]
pub struct FeaturedProducts;

/// Themed collections, in display order.
#[derive(Debug, Clone, Copy)]
pub struct Collections;

/// Carousel slides.
#[derive(Debug, Clone, Copy)]
pub struct CarouselItems;

impl CatalogCollection for Categories {
    type Item = Category;
    const KIND: CollectionKind = CollectionKind::Categories;

    fn slot(snapshot: &CatalogSnapshot) -> &Slot<Category> {
        &snapshot.categories
    }

    fn load<'a>(
        source: &'a dyn CatalogSource,
        _overlay: &'a WishlistOverlay,
        _user: Option<&'a UserId>,
    ) -> LoadFuture<'a, Category> {
        Box::pin(source.categories())
    }
}

impl CatalogCollection for FeaturedProducts {
    type Item = Product;
    const KIND: CollectionKind = CollectionKind::FeaturedProducts;

    fn slot(snapshot: &CatalogSnapshot) -> &Slot<Product> {
        &snapshot.featured_products
    }

    fn load<'a>(
        source: &'a dyn CatalogSource,
        overlay: &'a WishlistOverlay,
        user: Option<&'a UserId>,
    ) -> LoadFuture<'a, Product> {
        Box::pin(async move {
            let products = source.featured_products().await?;
            Ok(overlay.annotate(user, products).await)
        })
    }
}

impl CatalogCollection for Collections {
    type Item = Collection;
    const KIND: CollectionKind = CollectionKind::Collections;

    fn slot(snapshot: &CatalogSnapshot) -> &Slot<Collection> {
        &snapshot.collections
    }

    fn load<'a>(
        source: &'a dyn CatalogSource,
        _overlay: &'a WishlistOverlay,
        _user: Option<&'a UserId>,
    ) -> LoadFuture<'a, Collection> {
        Box::pin(source.collections())
    }
}

impl CatalogCollection for CarouselItems {
    type Item = CarouselItem;
    const KIND: CollectionKind = CollectionKind::CarouselItems;

    fn slot(snapshot: &CatalogSnapshot) -> &Slot<CarouselItem> {
        &snapshot.carousel_items
    }

    fn load<'a>(
        source: &'a dyn CatalogSource,
        _overlay: &'a WishlistOverlay,
        _user: Option<&'a UserId>,
    ) -> LoadFuture<'a, CarouselItem> {
        Box::pin(source.carousel_items())
    }
}
