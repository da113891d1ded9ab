//! Error types for VITRINE operations

use thiserror::Error;

/// Remote document store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Remote store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Batch of {got} ids exceeds the per-query limit of {limit}")]
    BatchTooLarge { limit: usize, got: usize },

    #[error("Malformed document {collection}/{id}: {reason}")]
    Malformed {
        collection: String,
        id: String,
        reason: String,
    },

    #[error("Write to {collection}/{id} rejected: {reason}")]
    Rejected {
        collection: String,
        id: String,
        reason: String,
    },
}

/// Local persistence errors (version store).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Failed to open local store: {reason}")]
    Open { reason: String },

    #[error("Failed to read local store: {reason}")]
    Read { reason: String },

    #[error("Failed to write local store: {reason}")]
    Write { reason: String },

    #[error("Corrupt local record: {reason}")]
    Corrupt { reason: String },
}

/// Wishlist operation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WishlistError {
    #[error("No user is signed in")]
    NotSignedIn,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all VITRINE errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VitrineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Wishlist error: {0}")]
    Wishlist(#[from] WishlistError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl VitrineError {
    /// Returns true for errors caused by the remote store being unreachable.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(StoreError::Unavailable { .. }))
    }
}

/// Result type alias for VITRINE operations.
pub type VitrineResult<T> = Result<T, VitrineError>;
