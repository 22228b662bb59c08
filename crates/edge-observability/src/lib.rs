//! Observability for stream sessions.
//!
//! - `StructuredLogger` - session-scoped structured logs emitted through `tracing`
//! - `MetricsCollector` / `SessionMetrics` - per-session timing and volume
//! - `StreamCounters` - process-wide counters fed by lifecycle events

mod logging;
mod metrics;

pub use logging::*;
pub use metrics::*;

// Re-export RequestId and TimingContext from edge-core for convenience
pub use edge_core::{RequestId, TimingContext};
