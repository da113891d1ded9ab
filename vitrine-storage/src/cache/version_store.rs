//! Persistent record of the catalog version applied to the local snapshot.
//!
//! The record survives process restarts so a relaunch with an unchanged
//! remote token skips the full refresh. Failures here are local I/O
//! failures and are always surfaced; callers decide how to degrade.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions with a single writer and many readers:
//! - Read transactions for `get`
//! - Write transactions for `set`

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tokio::sync::RwLock;
use vitrine_core::{
    Clock, LocalVersionRecord, PersistenceError, SystemClock, VersionToken, VitrineConfig,
    VitrineResult,
};

/// Name of the LMDB database holding the record.
const VERSION_DB_NAME: &str = "cache_version";

/// Key of the single record.
const RECORD_KEY: &[u8] = b"local_version";

/// Durable store for the [`LocalVersionRecord`].
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Read the applied record, or the default (`"0"` at the epoch) if
    /// nothing has been written yet.
    async fn get(&self) -> VitrineResult<LocalVersionRecord>;

    /// Record `token` as applied, stamped with the current time.
    async fn set(&self, token: &VersionToken) -> VitrineResult<()>;
}

/// In-memory version store. Not durable; useful for tests and sessions
/// that should always start cold.
#[derive(Debug)]
pub struct InMemoryVersionStore {
    record: RwLock<Option<LocalVersionRecord>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryVersionStore {
    fn default() -> Self {
        Self {
            record: RwLock::new(None),
            clock: Arc::new(SystemClock),
        }
    }
}

impl InMemoryVersionStore {
    /// Store holding the initial record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store stamping writes with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            record: RwLock::new(None),
            clock,
        }
    }

    /// Start from an already-applied token.
    pub fn with_token(token: impl Into<VersionToken>) -> Self {
        let store = Self::default();
        let record = LocalVersionRecord::new(token.into(), store.clock.now());
        Self {
            record: RwLock::new(Some(record)),
            ..store
        }
    }
}

#[async_trait]
impl VersionStore for InMemoryVersionStore {
    async fn get(&self) -> VitrineResult<LocalVersionRecord> {
        Ok(self.record.read().await.clone().unwrap_or_default())
    }

    async fn set(&self, token: &VersionToken) -> VitrineResult<()> {
        let record = LocalVersionRecord::new(token.clone(), self.clock.now());
        *self.record.write().await = Some(record);
        Ok(())
    }
}

/// LMDB-backed version store.
///
/// # Example
///
/// ```ignore
/// use vitrine_storage::cache::{LmdbVersionStore, VersionStore};
///
/// let store = LmdbVersionStore::open("/var/lib/app/version", 1)?;
/// store.set(&"7".into()).await?;
/// assert_eq!(store.get().await?.token.as_str(), "7");
/// ```
pub struct LmdbVersionStore {
    env: Env,
    db: Database<Bytes, Bytes>,
    clock: Arc<dyn Clock>,
}

impl LmdbVersionStore {
    /// Open (creating if needed) the store in `path`.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if:
    /// - `map_size_mb` does not fit in a byte count
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - The database cannot be created
    pub fn open<P: AsRef<Path>>(path: P, map_size_mb: usize) -> VitrineResult<Self> {
        let map_size = map_size_mb
            .max(1)
            .checked_mul(1024 * 1024)
            .ok_or_else(|| PersistenceError::Open {
                reason: format!("map size of {map_size_mb} MiB overflows"),
            })?;

        std::fs::create_dir_all(&path).map_err(|e| PersistenceError::Open {
            reason: e.to_string(),
        })?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| PersistenceError::Open {
            reason: e.to_string(),
        })?;

        let mut wtxn = env.write_txn().map_err(|e| PersistenceError::Open {
            reason: e.to_string(),
        })?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some(VERSION_DB_NAME))
            .map_err(|e| PersistenceError::Open {
                reason: e.to_string(),
            })?;
        wtxn.commit().map_err(|e| PersistenceError::Open {
            reason: e.to_string(),
        })?;

        Ok(Self {
            env,
            db,
            clock: Arc::new(SystemClock),
        })
    }

    /// Open the store at the configured path and map size.
    pub fn from_config(config: &VitrineConfig) -> VitrineResult<Self> {
        Self::open(&config.version_store_path, config.version_store_map_size_mb)
    }

    /// Stamp writes with `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Flush and close the environment so the path can be reopened.
    pub fn close(self) {
        self.env.prepare_for_closing().wait();
    }
}

#[async_trait]
impl VersionStore for LmdbVersionStore {
    async fn get(&self) -> VitrineResult<LocalVersionRecord> {
        let rtxn = self.env.read_txn().map_err(|e| PersistenceError::Read {
            reason: e.to_string(),
        })?;

        let bytes = self
            .db
            .get(&rtxn, RECORD_KEY)
            .map_err(|e| PersistenceError::Read {
                reason: e.to_string(),
            })?;

        match bytes {
            Some(bytes) => {
                let record: LocalVersionRecord =
                    serde_json::from_slice(bytes).map_err(|e| PersistenceError::Corrupt {
                        reason: e.to_string(),
                    })?;
                Ok(record)
            }
            None => Ok(LocalVersionRecord::default()),
        }
    }

    async fn set(&self, token: &VersionToken) -> VitrineResult<()> {
        let record = LocalVersionRecord::new(token.clone(), self.clock.now());
        let bytes = serde_json::to_vec(&record).map_err(|e| PersistenceError::Write {
            reason: e.to_string(),
        })?;

        let mut wtxn = self.env.write_txn().map_err(|e| PersistenceError::Write {
            reason: e.to_string(),
        })?;
        self.db
            .put(&mut wtxn, RECORD_KEY, &bytes)
            .map_err(|e| PersistenceError::Write {
                reason: e.to_string(),
            })?;
        wtxn.commit().map_err(|e| PersistenceError::Write {
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use vitrine_core::{ManualClock, VitrineError};

    #[tokio::test]
    async fn test_in_memory_defaults_then_set() {
        let clock = Arc::new(ManualClock::at_epoch());
        clock.advance(Duration::from_secs(42));
        let store = InMemoryVersionStore::with_clock(clock);

        let initial = store.get().await.unwrap();
        assert_eq!(initial, LocalVersionRecord::default());

        store.set(&VersionToken::from("3")).await.unwrap();
        let record = store.get().await.unwrap();
        assert_eq!(record.token.as_str(), "3");
        assert_eq!(record.applied_at.timestamp(), 42);
    }

    #[tokio::test]
    async fn test_in_memory_with_token() {
        let store = InMemoryVersionStore::with_token("9");
        assert_eq!(store.get().await.unwrap().token.as_str(), "9");
    }

    #[tokio::test]
    async fn test_lmdb_default_record() {
        let dir = TempDir::new().unwrap();
        let store = LmdbVersionStore::open(dir.path(), 1).unwrap();
        let record = store.get().await.unwrap();
        assert!(record.token.is_initial());
        assert_eq!(record.applied_at.timestamp(), 0);
    }

    #[tokio::test]
    async fn test_lmdb_survives_reopen() {
        let dir = TempDir::new().unwrap();

        let store = LmdbVersionStore::open(dir.path(), 1).unwrap();
        store.set(&VersionToken::from("4")).await.unwrap();
        store.close();

        let reopened = LmdbVersionStore::open(dir.path(), 1).unwrap();
        let record = reopened.get().await.unwrap();
        assert_eq!(record.token.as_str(), "4");
        assert!(record.applied_at.timestamp() > 0);
    }

    #[tokio::test]
    async fn test_lmdb_corrupt_record_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = LmdbVersionStore::open(dir.path(), 1).unwrap();

        let mut wtxn = store.env.write_txn().unwrap();
        store.db.put(&mut wtxn, RECORD_KEY, b"not json").unwrap();
        wtxn.commit().unwrap();

        let err = store.get().await.unwrap_err();
        assert!(matches!(
            err,
            VitrineError::Persistence(PersistenceError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_lmdb_oversized_map_is_an_open_error() {
        let dir = TempDir::new().unwrap();
        let result = LmdbVersionStore::open(dir.path().join("huge"), usize::MAX);
        assert!(matches!(
            result.err(),
            Some(VitrineError::Persistence(PersistenceError::Open { .. }))
        ));
        assert!(!dir.path().join("huge").exists());
    }

    #[tokio::test]
    async fn test_lmdb_from_config() {
        let dir = TempDir::new().unwrap();
        let config = VitrineConfig::new().with_version_store_path(dir.path().join("nested"));
        let store = LmdbVersionStore::from_config(&config).unwrap();
        store.set(&VersionToken::from("1")).await.unwrap();
        assert_eq!(store.get().await.unwrap().token.as_str(), "1");
    }
}
