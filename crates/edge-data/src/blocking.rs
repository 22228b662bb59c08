//! Blocking delayed range.

use std::time::Duration;

use edge_core::{CancelToken, StreamConfig, StreamError};

use crate::item::{Item, SourceStats};
use crate::permutation::Permutation;
use crate::source::BlockingItemSource;

/// Yields a shuffled `[0, n)`, parking the calling thread before each item.
///
/// Produces the same order as [`DelayedRange`](crate::DelayedRange) for the
/// same seed.
#[derive(Debug)]
pub struct BlockingDelayedRange {
    permutation: Permutation,
    delay: Duration,
    cancel: CancelToken,
    stats: SourceStats,
}

impl BlockingDelayedRange {
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
}

impl BlockingItemSource for BlockingDelayedRange {
    fn next_item(&mut self) -> Result<Option<Item>, StreamError> {
        if self.cancel.is_cancelled() {
            return Err(StreamError::Cancelled);
        }
        if self.permutation.is_exhausted() {
            return Ok(None);
        }

        self.stats.record_wait();
        if self.cancel.wait_timeout(self.delay) {
            return Err(StreamError::Cancelled);
        }

        let item = self.permutation.advance();
        if item.is_some() {
            self.stats.record_item();
        }
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use futures::StreamExt;

    use super::*;
    use crate::delayed::DelayedRange;
    use crate::source::{into_stream, BlockingIter};

    #[test]
    fn test_blocks_for_each_item() {
        let delay = Duration::from_millis(10);
        let start = Instant::now();
        let items: Vec<_> = BlockingIter::new(BlockingDelayedRange::new(4, delay))
            .map(|r| r.unwrap().index())
            .collect();

        assert!(start.elapsed() >= delay * 4);
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_matches_cooperative_order() {
        let blocking: Vec<_> = BlockingIter::new(BlockingDelayedRange::seeded(
            16,
            Duration::ZERO,
            99,
        ))
        .map(|r| r.unwrap())
        .collect();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let cooperative: Vec<_> = runtime.block_on(
            into_stream(DelayedRange::seeded(16, Duration::ZERO, 99))
                .map(|r| r.unwrap())
                .collect(),
        );

        assert_eq!(blocking, cooperative);
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let cancel = CancelToken::new();
        let mut source =
            BlockingDelayedRange::new(3, Duration::from_secs(30)).with_cancel(cancel.clone());

        let remote = cancel.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        let start = Instant::now();
        assert_eq!(source.next_item(), Err(StreamError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(source.next_item(), Err(StreamError::Cancelled));
        assert_eq!(source.stats().waits_started(), 1);
        handle.join().unwrap();
    }
}
