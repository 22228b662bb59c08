//! Items and source counters.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One unit of data produced by a source, identified by its position in
/// `[0, n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Item(pub usize);

impl Item {
    /// Get the item index.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Counters {
    waits_started: AtomicUsize,
    items_yielded: AtomicUsize,
}

/// Shared counters for a source.
///
/// Cloned out before the source is moved into a render context so the
/// session can still observe progress.
#[derive(Debug, Clone, Default)]
pub struct SourceStats {
    counters: Arc<Counters>,
}

impl SourceStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a per-item wait began.
    pub fn record_wait(&self) {
        self.counters.waits_started.fetch_add(1, Ordering::SeqCst);
    }

    /// Record that an item was handed out.
    pub fn record_item(&self) {
        self.counters.items_yielded.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of waits that have started.
    pub fn waits_started(&self) -> usize {
        self.counters.waits_started.load(Ordering::SeqCst)
    }

    /// Number of items yielded.
    pub fn items_yielded(&self) -> usize {
        self.counters.items_yielded.load(Ordering::SeqCst)
    }
}
