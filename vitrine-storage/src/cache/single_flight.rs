//! Single-flight gate for the full catalog refresh.

use std::sync::atomic::{AtomicBool, Ordering};

/// Admits at most one holder at a time. Contenders are turned away rather
/// than queued.
#[derive(Debug, Default)]
pub struct RefreshGate {
    in_progress: AtomicBool,
}

impl RefreshGate {
    /// An idle gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the gate, or `None` if someone is already inside.
    ///
    /// The gate reopens when the returned guard drops, including when the
    /// future holding it is cancelled.
    pub fn try_begin(&self) -> Option<RefreshGuard<'_>> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshGuard { gate: self })
    }

    /// True while a guard is held.
    pub fn is_refreshing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }
}

/// Proof of holding the [`RefreshGate`].
#[derive(Debug)]
#[must_use = "the gate reopens as soon as the guard is dropped"]
pub struct RefreshGuard<'a> {
    gate: &'a RefreshGate,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.gate.in_progress.store(false, Ordering::Release);
    }
}
