//! Wall-clock abstraction.
//!
//! Memoization windows are keyed off wall-clock time. Components take an
//! `Arc<dyn Clock>` so tests can drive time explicitly.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::identity::Timestamp;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    base: DateTime<Utc>,
    elapsed_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            elapsed_ms: AtomicI64::new(0),
        }
    }

    /// Clock anchored at the Unix epoch.
    pub fn at_epoch() -> Self {
        Self::new(DateTime::UNIX_EPOCH)
    }

    pub fn advance(&self, duration: Duration) {
        let ms = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        self.elapsed_ms.fetch_add(ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.base + chrono::Duration::milliseconds(self.elapsed_ms.load(Ordering::Relaxed))
    }
}
