//! Remote version oracle.
//!
//! Reads the published catalog version from the cache control record. Reads
//! are memoized for a wall-clock window so that frequent freshness checks
//! (one per collection read) cost at most one remote read per window.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};
use vitrine_core::constants::{CACHE_CONTROL_DOCUMENT, METADATA_COLLECTION, VERSION_FIELD};
use vitrine_core::{Clock, Document, SystemClock, Timestamp, VersionToken, VitrineConfig, VitrineResult};

use crate::document_store::{DocumentStore, Subscription};

/// A remote token together with when it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MemoizedToken {
    token: VersionToken,
    read_at: Timestamp,
}

type Memo = Arc<Mutex<Option<MemoizedToken>>>;

/// Source of the remote catalog version token.
pub struct RemoteVersionOracle {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
    memo: Memo,
}

impl fmt::Debug for RemoteVersionOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteVersionOracle")
            .field("window", &self.window)
            .field("memo", &self.memo)
            .finish_non_exhaustive()
    }
}

/// Extract the token from a control record. A missing record or field reads
/// as the initial token.
fn token_from(doc: Option<&Document>) -> VersionToken {
    doc.and_then(|d| d.get_str(VERSION_FIELD))
        .map(VersionToken::from)
        .unwrap_or_default()
}

fn remember(memo: &Memo, token: VersionToken, read_at: Timestamp) {
    *memo.lock().unwrap_or_else(PoisonError::into_inner) = Some(MemoizedToken { token, read_at });
}

impl RemoteVersionOracle {
    /// Oracle with the default memo window and the system clock.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_config(store, &VitrineConfig::default())
    }

    /// Oracle using the configured memo window.
    pub fn with_config(store: Arc<dyn DocumentStore>, config: &VitrineConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            window: config.version_memo_window,
            memo: Arc::new(Mutex::new(None)),
        }
    }

    /// Replace the clock used for the memo window.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The clock timing the memo window.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// How long a read token is reused.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// The memoized token, if it was read within the window.
    ///
    /// A read stamped in the future (clock moved backwards) counts as expired.
    fn memoized(&self) -> Option<VersionToken> {
        let memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = memo.as_ref()?;
        let elapsed = (self.clock.now() - entry.read_at).to_std().ok()?;
        (elapsed < self.window).then(|| entry.token.clone())
    }

    /// The remote token, memoized for the configured window.
    ///
    /// Errors are reported, never papered over with a stale memo.
    pub async fn current_token(&self) -> VitrineResult<VersionToken> {
        if let Some(token) = self.memoized() {
            debug!(token = %token, "Using memoized remote version");
            return Ok(token);
        }
        self.fetch_live_token().await
    }

    /// Read the token from the remote store, bypassing and then refreshing
    /// the memo.
    pub async fn fetch_live_token(&self) -> VitrineResult<VersionToken> {
        let doc = self
            .store
            .get_document(METADATA_COLLECTION, CACHE_CONTROL_DOCUMENT)
            .await?;
        let token = token_from(doc.as_ref());
        remember(&self.memo, token.clone(), self.clock.now());
        debug!(token = %token, "Read remote version");
        Ok(token)
    }

    /// Forget the memoized token so the next read goes to the store.
    pub fn invalidate(&self) {
        *self.memo.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Register `on_change` for every pushed update of the control record.
    ///
    /// The callback runs on whatever thread the store delivers on and may
    /// see the same token more than once. Deleted records are ignored.
    pub fn subscribe<F>(&self, on_change: F) -> VitrineResult<Subscription>
    where
        F: Fn(VersionToken) + Send + Sync + 'static,
    {
        let memo = Arc::clone(&self.memo);
        let clock = Arc::clone(&self.clock);
        self.store.subscribe(
            METADATA_COLLECTION,
            CACHE_CONTROL_DOCUMENT,
            Arc::new(move |doc: Option<Document>| {
                let Some(doc) = doc else {
                    warn!("Cache control record deleted, ignoring");
                    return;
                };
                let token = token_from(Some(&doc));
                remember(&memo, token.clone(), clock.now());
                debug!(token = %token, "Remote version pushed");
                on_change(token);
            }),
        )
    }
}
