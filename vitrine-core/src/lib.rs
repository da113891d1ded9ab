//! VITRINE Core - Catalog Types
//!
//! Plain data structures shared by the storage and cache layers: catalog
//! entities, identifiers, the remote document model, errors, configuration
//! and the clock abstraction. No I/O happens in this crate.

pub mod clock;
pub mod config;
pub mod constants;
pub mod document;
pub mod entities;
pub mod error;
pub mod identity;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::VitrineConfig;
pub use document::{Document, Fields};
pub use entities::{CarouselItem, Category, Collection, Product};
pub use error::{
    ConfigError, PersistenceError, StoreError, VitrineError, VitrineResult, WishlistError,
};
pub use identity::{LocalVersionRecord, ProductId, Timestamp, UserId, VersionToken};
