//! VITRINE Storage - Catalog Source and Cache
//!
//! The remote document store contract, the uncached catalog source built on
//! it, and the version-gated catalog cache in [`cache`].

pub mod cache;
pub mod document_store;
pub mod source;

pub use cache::{
    CacheRead, CatalogCache, CollectionKind, FreshnessCoordinator, InMemoryVersionStore,
    LmdbVersionStore, RefreshOutcome, RefreshReport, RemoteVersionOracle, VersionStore,
    WishlistOverlay,
};
pub use document_store::{DocumentListener, DocumentStore, InMemoryDocumentStore, Subscription};
pub use source::{CatalogSource, DocumentCatalogSource};
