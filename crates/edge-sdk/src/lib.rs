//! Public SDK for incremental document streaming.
//!
//! This crate re-exports the platform crates:
//!
//! ```ignore
//! use edge_sdk::prelude::*;
//!
//! let template = Arc::new(
//!     Template::builder("items.html")
//!         .text("<ul>")
//!         .for_each(ITEMS_BINDING, |body| body.text("<li>").item().text("</li>"))
//!         .text("</ul>")
//!         .build(),
//! );
//! let config = StreamConfig::new(5, Duration::from_secs(1));
//! let (handle, body) = StreamSession::new(template, config)?.into_stream();
//! ```

pub use edge_core;
pub use edge_data;
pub use edge_executor;
pub use edge_observability;
pub use edge_streaming;

/// Prelude for convenient imports.
pub mod prelude {
    pub use edge_core::{
        AbortReason, CancelToken, ExecutionModel, FlushThreshold, LifecycleObserver, RequestId,
        SessionPhase, StreamConfig, StreamError,
    };
    pub use edge_data::{
        BlockingDelayedRange, BlockingItemSource, DelayedRange, Item, ItemSource, Permutation,
    };
    pub use edge_executor::{
        SessionHandle, SessionReport, SessionStream, StreamSession, ITEMS_BINDING,
    };
    pub use edge_observability::{
        LogFormat, LogLevel, SessionMetrics, StreamCounters, StructuredLogger,
    };
    pub use edge_streaming::{AutoEscape, Chunk, RenderContext, Template};
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::StreamExt;

    use super::prelude::*;

    #[tokio::test(start_paused = true)]
    async fn test_prelude_covers_a_session() {
        let template = Arc::new(
            Template::builder("items.html")
                .for_each(ITEMS_BINDING, |body| body.item().text(","))
                .build(),
        );
        let config = StreamConfig::new(3, Duration::from_millis(10)).with_seed(1);

        let (handle, body) = StreamSession::new(template, config).unwrap().into_stream();
        let bytes: Vec<u8> = body
            .map(|chunk| chunk.unwrap().into_bytes())
            .concat()
            .await;

        let mut seen: Vec<&str> = std::str::from_utf8(&bytes)
            .unwrap()
            .trim_end_matches(',')
            .split(',')
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec!["0", "1", "2"]);
        assert_eq!(handle.phase(), SessionPhase::Completed);
    }
}
