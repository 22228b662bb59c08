//! Cooperative delayed range.

use std::time::Duration;

use async_trait::async_trait;
use edge_core::{CancelToken, StreamConfig, StreamError};

use crate::item::{Item, SourceStats};
use crate::permutation::Permutation;
use crate::source::ItemSource;

/// Yields a shuffled `[0, n)`, sleeping on the async timer before each item.
///
/// The wait suspends the calling task without holding a worker thread.
/// Cancelling the token interrupts an in-flight wait and prevents any
/// further wait from starting.
#[derive(Debug)]
pub struct DelayedRange {
    permutation: Permutation,
    delay: Duration,
    cancel: CancelToken,
    stats: SourceStats,
}

impl DelayedRange {
    /// Create a source over a freshly shuffled `[0, n)`.
    pub fn new(n: usize, delay: Duration) -> Self {
        Self::from_permutation(Permutation::random(n), delay)
    }

    /// Create a source with a deterministic order.
    pub fn seeded(n: usize, delay: Duration, seed: u64) -> Self {
        Self::from_permutation(Permutation::seeded(n, seed), delay)
    }

    /// Create a source from a session configuration.
    pub fn from_config(config: &StreamConfig) -> Self {
        Self::from_permutation(
            Permutation::from_seed(config.items, config.seed),
            config.delay(),
        )
    }

    /// Create a source over an existing permutation.
    pub fn from_permutation(permutation: Permutation, delay: Duration) -> Self {
        Self {
            permutation,
            delay,
            cancel: CancelToken::new(),
            stats: SourceStats::new(),
        }
    }

    /// Attach a session's cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Share counters with the caller.
    pub fn with_stats(mut self, stats: SourceStats) -> Self {
        self.stats = stats;
        self
    }

    /// Get a handle to this source's counters.
    pub fn stats(&self) -> SourceStats {
        self.stats.clone()
    }

    /// Get the per-item delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait]
impl ItemSource for DelayedRange {
    async fn next_item(&mut self) -> Result<Option<Item>, StreamError> {
        if self.cancel.is_cancelled() {
            return Err(StreamError::Cancelled);
        }
        if self.permutation.is_exhausted() {
            return Ok(None);
        }

        self.stats.record_wait();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(StreamError::Cancelled),
            _ = tokio::time::sleep(self.delay) => {}
        }

        let item = self.permutation.advance();
        if item.is_some() {
            self.stats.record_item();
        }
        Ok(item)
    }
}
