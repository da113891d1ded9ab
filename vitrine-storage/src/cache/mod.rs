//! Catalog cache layer.
//!
//! Leaf to root:
//!
//! - [`VersionStore`]: the durable record of the catalog version applied
//!   locally ([`LmdbVersionStore`], [`InMemoryVersionStore`]).
//! - [`RemoteVersionOracle`]: the remote version token, memoized for a
//!   wall-clock window, plus push notifications of changes.
//! - [`FreshnessCoordinator`]: local vs. remote token comparison.
//! - [`WishlistOverlay`]: per-user favorite membership.
//! - [`CatalogCache`]: the snapshot of the four catalog views with
//!   read-through access and single-flight refresh.
//!
//! Reads return [`CacheRead<T>`], which says whether the value came from the
//! snapshot and when it was populated.
//!
//! # Example
//!
//! ```ignore
//! let cache = CatalogCache::from_store(store, versions, &VitrineConfig::from_env())?;
//! cache.start().await?;
//!
//! let read = cache.read::<FeaturedProducts>().await?;
//! if read.was_cache_hit() {
//!     tracing::debug!(age = ?read.staleness(), "Served featured products from cache");
//! }
//! ```

pub mod catalog;
pub mod collections;
pub mod freshness;
pub mod oracle;
pub mod single_flight;
pub mod version_store;
pub mod wishlist;

pub use catalog::{CatalogCache, RefreshOutcome, RefreshReport};
pub use collections::{
    CarouselItems, CatalogCollection, CatalogSnapshot, Categories, CollectionKind, Collections,
    FeaturedProducts, Slot,
};
pub use freshness::{CacheRead, FreshnessCoordinator};
pub use oracle::RemoteVersionOracle;
pub use single_flight::{RefreshGate, RefreshGuard};
pub use version_store::{InMemoryVersionStore, LmdbVersionStore, VersionStore};
pub use wishlist::WishlistOverlay;
