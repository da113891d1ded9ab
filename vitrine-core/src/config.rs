//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_VERSION_MEMO_WINDOW_SECS, DEFAULT_VERSION_STORE_MAP_SIZE_MB,
    DEFAULT_VERSION_STORE_PATH, MAX_IDS_PER_QUERY, MAX_VERSION_STORE_MAP_SIZE_MB,
};
use crate::error::{ConfigError, VitrineResult};

/// Configuration for the catalog cache and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VitrineConfig {
    /// How long a remote version token read is reused before the control
    /// record is read again (default: 5 minutes).
    pub version_memo_window: Duration,

    /// Ids per "id in set" query. The remote store caps this at 10.
    pub id_batch_limit: usize,

    /// Directory of the LMDB version store.
    pub version_store_path: PathBuf,

    /// LMDB map size in megabytes.
    pub version_store_map_size_mb: usize,
}

impl Default for VitrineConfig {
    fn default() -> Self {
        Self {
            version_memo_window: Duration::from_secs(DEFAULT_VERSION_MEMO_WINDOW_SECS),
            id_batch_limit: MAX_IDS_PER_QUERY,
            version_store_path: PathBuf::from(DEFAULT_VERSION_STORE_PATH),
            version_store_map_size_mb: DEFAULT_VERSION_STORE_MAP_SIZE_MB,
        }
    }
}

impl VitrineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create VitrineConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `VITRINE_VERSION_MEMO_WINDOW_SECS`: Remote token memo window (default: 300)
    /// - `VITRINE_ID_BATCH_LIMIT`: Ids per batched query (default: 10)
    /// - `VITRINE_VERSION_STORE_PATH`: Version store directory (default: .vitrine/version)
    /// - `VITRINE_VERSION_STORE_MAP_SIZE_MB`: LMDB map size (default: 1)
    ///
    /// Unparseable values fall back to the defaults; call [`validate`](Self::validate)
    /// to reject out-of-range ones.
    pub fn from_env() -> Self {
        let version_memo_window = Duration::from_secs(
            std::env::var("VITRINE_VERSION_MEMO_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_VERSION_MEMO_WINDOW_SECS),
        );

        let id_batch_limit = std::env::var("VITRINE_ID_BATCH_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(MAX_IDS_PER_QUERY);

        let version_store_path = std::env::var("VITRINE_VERSION_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_VERSION_STORE_PATH));

        let version_store_map_size_mb = std::env::var("VITRINE_VERSION_STORE_MAP_SIZE_MB")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_VERSION_STORE_MAP_SIZE_MB);

        Self {
            version_memo_window,
            id_batch_limit,
            version_store_path,
            version_store_map_size_mb,
        }
    }

    pub fn with_memo_window(mut self, window: Duration) -> Self {
        self.version_memo_window = window;
        self
    }

    pub fn with_id_batch_limit(mut self, limit: usize) -> Self {
        self.id_batch_limit = limit;
        self
    }

    pub fn with_version_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.version_store_path = path.into();
        self
    }

    pub fn with_version_store_map_size(mut self, mb: usize) -> Self {
        self.version_store_map_size_mb = mb;
        self
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - version_memo_window > 0
    /// - id_batch_limit in [1, 10]
    /// - version_store_path is not empty
    /// - version_store_map_size_mb in [1, MAX_VERSION_STORE_MAP_SIZE_MB]
    pub fn validate(&self) -> VitrineResult<()> {
        if self.version_memo_window.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "version_memo_window".to_string(),
                value: format!("{:?}", self.version_memo_window),
                reason: "must be positive".to_string(),
            }
            .into());
        }

        if self.id_batch_limit == 0 || self.id_batch_limit > MAX_IDS_PER_QUERY {
            return Err(ConfigError::InvalidValue {
                field: "id_batch_limit".to_string(),
                value: self.id_batch_limit.to_string(),
                reason: format!("must be between 1 and {MAX_IDS_PER_QUERY}"),
            }
            .into());
        }

        if self.version_store_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "version_store_path".to_string(),
            }
            .into());
        }

        if self.version_store_map_size_mb == 0
            || self.version_store_map_size_mb > MAX_VERSION_STORE_MAP_SIZE_MB
        {
            return Err(ConfigError::InvalidValue {
                field: "version_store_map_size_mb".to_string(),
                value: self.version_store_map_size_mb.to_string(),
                reason: format!("must be between 1 and {MAX_VERSION_STORE_MAP_SIZE_MB}"),
            }
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VitrineError;

    #[test]
    fn test_default_config_is_valid() {
        let config = VitrineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.version_memo_window, Duration::from_secs(300));
        assert_eq!(config.id_batch_limit, 10);
    }

    #[test]
    fn test_builder() {
        let config = VitrineConfig::new()
            .with_memo_window(Duration::from_secs(30))
            .with_id_batch_limit(5)
            .with_version_store_path("/tmp/vitrine")
            .with_version_store_map_size(4);

        assert_eq!(config.version_memo_window, Duration::from_secs(30));
        assert_eq!(config.id_batch_limit, 5);
        assert_eq!(config.version_store_path, PathBuf::from("/tmp/vitrine"));
        assert_eq!(config.version_store_map_size_mb, 4);
    }

    #[test]
    fn test_rejects_batch_limit_above_store_cap() {
        let err = VitrineConfig::new()
            .with_id_batch_limit(11)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            VitrineError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "id_batch_limit"
        ));
    }

    #[test]
    fn test_rejects_zero_values() {
        assert!(VitrineConfig::new()
            .with_memo_window(Duration::ZERO)
            .validate()
            .is_err());
        assert!(VitrineConfig::new().with_id_batch_limit(0).validate().is_err());
        assert!(VitrineConfig::new()
            .with_version_store_map_size(0)
            .validate()
            .is_err());
        assert!(VitrineConfig::new()
            .with_version_store_path("")
            .validate()
            .is_err());
    }

    #[test]
    fn test_rejects_oversized_map() {
        let err = VitrineConfig::new()
            .with_version_store_map_size(MAX_VERSION_STORE_MAP_SIZE_MB + 1)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            VitrineError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "version_store_map_size_mb"
        ));
        assert!(VitrineConfig::new()
            .with_version_store_map_size(MAX_VERSION_STORE_MAP_SIZE_MB)
            .validate()
            .is_ok());
    }
}
