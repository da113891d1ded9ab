//! Freshness decisions for the catalog snapshot.
//!
//! [`FreshnessCoordinator`] compares the locally applied version token with
//! the remote one and decides whether a full refresh is warranted.
//! [`CacheRead`] is what collection reads hand back: the value plus where it
//! came from and when it was populated.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};
use vitrine_core::{Timestamp, VersionToken, VitrineResult};

use super::oracle::RemoteVersionOracle;
use super::version_store::VersionStore;
use crate::document_store::Subscription;

/// Result of a cache read, carrying staleness metadata.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    /// When the slot was populated.
    cached_at: Timestamp,
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    /// A read served from the in-memory snapshot.
    pub fn from_cache(value: T, cached_at: Timestamp) -> Self {
        Self {
            value,
            cached_at,
            was_cache_hit: true,
        }
    }

    /// A read that had to go to the source because the slot was empty.
    pub fn from_source(value: T, cached_at: Timestamp) -> Self {
        Self {
            value,
            cached_at,
            was_cache_hit: false,
        }
    }

    /// Take the value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Borrow the value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// When the value was stored in the cache.
    pub fn cached_at(&self) -> Timestamp {
        self.cached_at
    }

    /// True if served from memory without a fetch.
    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    /// True if the value had to be fetched.
    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }

    /// Age of the data relative to `now`. Zero if `now` precedes the
    /// population time.
    pub fn staleness_at(&self, now: Timestamp) -> Duration {
        (now - self.cached_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Age of the data relative to the system clock.
    pub fn staleness(&self) -> Duration {
        self.staleness_at(Utc::now())
    }

    /// Transform the value, keeping hit and timestamp metadata.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            was_cache_hit: self.was_cache_hit,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Decides when the local snapshot is behind the remote catalog.
///
/// Fails open: when the remote token cannot be read the answer is "refresh",
/// and when the local record cannot be read it is treated as never applied.
pub struct FreshnessCoordinator {
    versions: Arc<dyn VersionStore>,
    oracle: Arc<RemoteVersionOracle>,
}

impl FreshnessCoordinator {
    /// Compare the token in `versions` with the one `oracle` reports.
    pub fn new(versions: Arc<dyn VersionStore>, oracle: Arc<RemoteVersionOracle>) -> Self {
        Self { versions, oracle }
    }

    /// The remote side of the comparison.
    pub fn oracle(&self) -> &Arc<RemoteVersionOracle> {
        &self.oracle
    }

    /// The locally applied token; `"0"` if the record cannot be read.
    pub async fn local_token(&self) -> VersionToken {
        match self.versions.get().await {
            Ok(record) => record.token,
            Err(e) => {
                warn!(error = %e, "Failed to read local version, treating as initial");
                VersionToken::initial()
            }
        }
    }

    /// True if the remote token differs from the local one, or if the remote
    /// token could not be read.
    pub async fn should_refresh(&self) -> bool {
        let local = self.local_token().await;
        match self.oracle.current_token().await {
            Ok(remote) => {
                let stale = remote != local;
                debug!(local = %local, remote = %remote, stale, "Checked catalog freshness");
                stale
            }
            Err(e) => {
                warn!(error = %e, local = %local, "Remote version unavailable, assuming stale");
                true
            }
        }
    }

    /// True if `remote` differs from the local token. Does not consult the
    /// oracle.
    pub async fn is_stale_against(&self, remote: &VersionToken) -> bool {
        self.local_token().await != *remote
    }

    /// Record `token` as applied.
    pub async fn record_applied(&self, token: &VersionToken) -> VitrineResult<()> {
        self.versions.set(token).await
    }

    /// Forward pushed version changes to `handler`.
    pub fn on_remote_change<F>(&self, handler: F) -> VitrineResult<Subscription>
    where
        F: Fn(VersionToken) + Send + Sync + 'static,
    {
        self.oracle.subscribe(handler)
    }
}
