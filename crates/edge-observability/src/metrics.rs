//! Session timing metrics and process-wide counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use edge_core::{AbortReason, LifecycleObserver, RequestId, SessionPhase};
use serde::{Deserialize, Serialize};

/// Metrics for a single stream session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Request ID for correlation.
    pub request_id: String,
    /// Workload name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workload: Option<String>,
    /// Execution model the session ran under.
    pub execution: String,
    /// Items yielded by the source.
    pub items: usize,
    /// Fragments rendered.
    pub fragments: usize,
    /// Chunks written to the transport.
    pub chunks: usize,
    /// Bytes written to the transport.
    pub bytes: usize,
    /// Time to first chunk (microseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_first_chunk_us: Option<u64>,
    /// Total session duration (microseconds).
    pub total_duration_us: u64,
    /// Terminal phase: `completed` or `aborted:<reason>`.
    pub outcome: String,
}

/// Collector for session metrics.
#[derive(Debug)]
pub struct MetricsCollector {
    request_id: RequestId,
    workload: Option<String>,
    execution: String,
    start: Instant,
    first_chunk: Option<Instant>,
    items: usize,
    fragments: usize,
    chunks: usize,
    bytes: usize,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            workload: None,
            execution: String::new(),
            start: Instant::now(),
            first_chunk: None,
            items: 0,
            fragments: 0,
            chunks: 0,
            bytes: 0,
        }
    }

    /// Set workload name.
    pub fn set_workload(&mut self, workload: impl Into<String>) {
        self.workload = Some(workload.into());
    }

    /// Set the execution model label.
    pub fn set_execution(&mut self, execution: impl ToString) {
        self.execution = execution.to_string();
    }

    /// Record one chunk handed to the transport.
    pub fn record_chunk(&mut self, bytes: usize, fragments: usize) {
        if self.first_chunk.is_none() {
            self.first_chunk = Some(Instant::now());
        }
        self.chunks += 1;
        self.bytes += bytes;
        self.fragments += fragments;
    }

    /// Record the number of items the source yielded.
    pub fn set_items(&mut self, items: usize) {
        self.items = items;
    }

    /// Get time-to-first-chunk so far.
    pub fn time_to_first_chunk(&self) -> Option<Duration> {
        self.first_chunk.map(|t| t.duration_since(self.start))
    }

    /// Get total elapsed time.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Finalize and return the metrics.
    pub fn finalize(&self, phase: SessionPhase) -> SessionMetrics {
        let outcome = match phase {
            SessionPhase::Aborted(reason) => format!("aborted:{}", reason),
            other => other.to_string(),
        };

        SessionMetrics {
            request_id: self.request_id.to_string(),
            workload: self.workload.clone(),
            execution: self.execution.clone(),
            items: self.items,
            fragments: self.fragments,
            chunks: self.chunks,
            bytes: self.bytes,
            time_to_first_chunk_us: self
                .first_chunk
                .map(|t| t.duration_since(self.start).as_micros() as u64),
            total_duration_us: self.start.elapsed().as_micros() as u64,
            outcome,
        }
    }
}

impl SessionMetrics {
    /// Check if the session ran to completion.
    pub fn is_completed(&self) -> bool {
        self.outcome == "completed"
    }

    /// Format as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Format as human-readable summary.
    pub fn to_summary(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Session: {} ({})", self.request_id, self.outcome));
        lines.push(format!(
            "  Items: {}  Fragments: {}  Chunks: {}  Bytes: {}",
            self.items, self.fragments, self.chunks, self.bytes
        ));

        if let Some(ttfc) = self.time_to_first_chunk_us {
            lines.push(format!(
                "  Time to first chunk: {}us ({:.2}ms)",
                ttfc,
                ttfc as f64 / 1000.0
            ));
        }

        lines.push(format!(
            "  Total: {}us ({:.2}ms)",
            self.total_duration_us,
            self.total_duration_us as f64 / 1000.0
        ));

        lines.join("\n")
    }
}

/// Process-wide session counters.
///
/// Fed through [`LifecycleObserver`]; share one instance behind an `Arc`.
#[derive(Debug, Default)]
pub struct StreamCounters {
    started: AtomicU64,
    completed: AtomicU64,
    aborted: AtomicU64,
    disconnected: AtomicU64,
    bytes: AtomicU64,
}

/// Point-in-time copy of [`StreamCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountersSnapshot {
    pub sessions_started: u64,
    pub sessions_active: u64,
    pub sessions_completed: u64,
    pub sessions_aborted: u64,
    pub sessions_disconnected: u64,
    pub bytes_sent: u64,
}

impl StreamCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add to the bytes-sent total.
    pub fn record_bytes(&self, bytes: usize) {
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Take a snapshot.
    pub fn snapshot(&self) -> CountersSnapshot {
        let started = self.started.load(Ordering::Relaxed);
        let completed = self.completed.load(Ordering::Relaxed);
        let aborted = self.aborted.load(Ordering::Relaxed);
        let disconnected = self.disconnected.load(Ordering::Relaxed);

        CountersSnapshot {
            sessions_started: started,
            sessions_active: started.saturating_sub(completed + aborted + disconnected),
            sessions_completed: completed,
            sessions_aborted: aborted,
            sessions_disconnected: disconnected,
            bytes_sent: self.bytes.load(Ordering::Relaxed),
        }
    }
}

impl LifecycleObserver for StreamCounters {
    fn on_phase(&self, phase: SessionPhase, _elapsed: Duration) {
        let counter = match phase {
            SessionPhase::Initialized => &self.started,
            SessionPhase::Rendering => return,
            SessionPhase::Completed => &self.completed,
            // Client-driven terminations are expected and counted apart.
            SessionPhase::Aborted(AbortReason::Disconnected | AbortReason::Cancelled) => {
                &self.disconnected
            }
            SessionPhase::Aborted(_) => &self.aborted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn on_chunk(&self, bytes: usize) {
        self.record_bytes(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_accumulates_chunks() {
        let mut collector = MetricsCollector::new(RequestId::from_string("r"));
        collector.set_execution("cooperative");
        collector.record_chunk(10, 1);
        collector.record_chunk(25, 3);
        collector.set_items(3);

        let metrics = collector.finalize(SessionPhase::Completed);
        assert_eq!(metrics.chunks, 2);
        assert_eq!(metrics.bytes, 35);
        assert_eq!(metrics.fragments, 4);
        assert_eq!(metrics.items, 3);
        assert!(metrics.time_to_first_chunk_us.is_some());
        assert!(metrics.is_completed());
    }

    #[test]
    fn test_outcome_names_abort_reason() {
        let collector = MetricsCollector::new(RequestId::from_string("r"));
        let metrics = collector.finalize(SessionPhase::Aborted(AbortReason::SourceFailure));
        assert_eq!(metrics.outcome, "aborted:source_failure");
        assert!(metrics.time_to_first_chunk_us.is_none());
        assert!(metrics.to_summary().contains("aborted:source_failure"));
    }

    #[test]
    fn test_counters_track_lifecycle() {
        let counters = StreamCounters::new();
        for _ in 0..3 {
            counters.on_phase(SessionPhase::Initialized, Duration::ZERO);
        }
        counters.on_phase(SessionPhase::Rendering, Duration::ZERO);
        counters.on_phase(SessionPhase::Completed, Duration::ZERO);
        counters.on_phase(
            SessionPhase::Aborted(AbortReason::Disconnected),
            Duration::ZERO,
        );
        counters.on_chunk(100);
        counters.record_bytes(28);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.sessions_started, 3);
        assert_eq!(snapshot.sessions_active, 1);
        assert_eq!(snapshot.sessions_completed, 1);
        assert_eq!(snapshot.sessions_disconnected, 1);
        assert_eq!(snapshot.sessions_aborted, 0);
        assert_eq!(snapshot.bytes_sent, 128);
    }
}
