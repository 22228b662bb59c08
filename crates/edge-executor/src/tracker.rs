//! Shared lifecycle bookkeeping for one session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use edge_core::{
    AbortReason, CancelToken, LifecycleObserver, RequestId, SessionPhase, SessionState, StreamError,
};
use edge_data::SourceStats;
use edge_observability::{MetricsCollector, SessionMetrics, StructuredLogger};

struct TrackerState {
    state: SessionState,
    metrics: MetricsCollector,
    ended: Option<SessionMetrics>,
    error: Option<StreamError>,
}

/// Phase, metrics and cancellation for one session, shared between the
/// driving side and any [`SessionHandle`].
pub(crate) struct Tracker {
    inner: Mutex<TrackerState>,
    cancel: CancelToken,
    stats: SourceStats,
    observer: Option<Arc<dyn LifecycleObserver>>,
    logger: StructuredLogger,
}

impl Tracker {
    pub(crate) fn new(
        metrics: MetricsCollector,
        stats: SourceStats,
        observer: Option<Arc<dyn LifecycleObserver>>,
        logger: StructuredLogger,
    ) -> Self {
        let tracker = Self {
            inner: Mutex::new(TrackerState {
                state: SessionState::new(),
                metrics,
                ended: None,
                error: None,
            }),
            cancel: CancelToken::new(),
            stats,
            observer,
            logger,
        };
        tracker.notify(SessionPhase::Initialized, 0);
        tracker
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, phase: SessionPhase, elapsed_us: u64) {
        if let Some(observer) = &self.observer {
            observer.on_phase(phase, std::time::Duration::from_micros(elapsed_us));
        }
    }

    pub(crate) fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub(crate) fn stats(&self) -> &SourceStats {
        &self.stats
    }

    pub(crate) fn phase(&self) -> SessionPhase {
        self.lock().state.phase()
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.phase().is_terminal()
    }

    /// Enter (or re-enter) `Rendering` for the next pull cycle.
    pub(crate) fn begin(&self) {
        let mut inner = self.lock();
        let first = inner.state.phase() == SessionPhase::Initialized;
        if inner.state.transition(SessionPhase::Rendering).is_ok() && first {
            drop(inner);
            self.notify(SessionPhase::Rendering, self.logger.elapsed_us());
            self.logger.debug("session rendering");
        }
    }

    pub(crate) fn record_chunk(&self, bytes: usize, fragments: usize) {
        self.lock().metrics.record_chunk(bytes, fragments);
        if let Some(observer) = &self.observer {
            observer.on_chunk(bytes);
        }
    }

    /// Move to a terminal phase. The first call wins; later calls are no-ops.
    pub(crate) fn finish(&self, phase: SessionPhase, error: Option<StreamError>) {
        let mut inner = self.lock();
        if inner.state.transition(phase).is_err() {
            return;
        }
        if matches!(phase, SessionPhase::Aborted(_)) {
            self.cancel.cancel();
        }
        inner.metrics.set_items(self.stats.items_yielded());
        let metrics = inner.metrics.finalize(phase);
        inner.ended = Some(metrics.clone());
        inner.error = error.clone();
        drop(inner);

        self.notify(phase, metrics.total_duration_us);
        self.log_outcome(phase, &metrics, error.as_ref());
    }

    /// Abort from outside the driving side.
    pub(crate) fn abort(&self) {
        self.finish(
            SessionPhase::Aborted(AbortReason::Cancelled),
            Some(StreamError::Cancelled),
        );
    }

    fn log_outcome(&self, phase: SessionPhase, metrics: &SessionMetrics, error: Option<&StreamError>) {
        let builder = match (phase, error) {
            (SessionPhase::Completed, _) => self.logger.info_builder("session completed"),
            (_, Some(err)) if err.is_client_termination() => {
                self.logger.info_builder("session ended by client")
            }
            (_, None) => self.logger.info_builder("session ended by client"),
            (_, Some(err)) => self
                .logger
                .warn_builder("session aborted")
                .field("error", err.to_string())
                .field("error_kind", err.kind()),
        };

        builder
            .field("outcome", metrics.outcome.clone())
            .field("execution", metrics.execution.clone())
            .field_u64("items", metrics.items as u64)
            .field_u64("chunks", metrics.chunks as u64)
            .field_u64("bytes", metrics.bytes as u64)
            .field_u64("total_us", metrics.total_duration_us)
            .emit();
    }

    pub(crate) fn report(&self) -> SessionReport {
        let inner = self.lock();
        let phase = inner.state.phase();
        SessionReport {
            phase,
            metrics: inner
                .ended
                .clone()
                .unwrap_or_else(|| inner.metrics.finalize(phase)),
            error: inner.error.clone(),
        }
    }
}

/// Ends the session as a client disconnect when dropped before the session
/// reached a terminal phase.
pub(crate) struct DisconnectGuard(pub(crate) Arc<Tracker>);

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.0
            .finish(SessionPhase::Aborted(AbortReason::Disconnected), None);
    }
}

/// Outcome of a driven session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Terminal phase.
    pub phase: SessionPhase,
    /// Timing and volume.
    pub metrics: SessionMetrics,
    /// What ended the session early, if anything.
    pub error: Option<StreamError>,
}

impl SessionReport {
    /// Check if the session ran to completion.
    pub fn is_completed(&self) -> bool {
        self.phase == SessionPhase::Completed
    }

    /// Convert into a `Result`, keeping the metrics on success.
    pub fn into_result(self) -> Result<SessionMetrics, StreamError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.metrics),
        }
    }
}

/// Observer-side view of a running session.
///
/// Cloneable; every clone refers to the same session.
#[derive(Clone)]
pub struct SessionHandle {
    id: RequestId,
    tracker: Arc<Tracker>,
}

impl SessionHandle {
    pub(crate) fn new(id: RequestId, tracker: Arc<Tracker>) -> Self {
        Self { id, tracker }
    }

    /// Get the session's request id.
    pub fn request_id(&self) -> &RequestId {
        &self.id
    }

    /// Get the current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.tracker.phase()
    }

    /// Check if the session reached a terminal phase.
    pub fn is_finished(&self) -> bool {
        self.tracker.is_terminal()
    }

    /// Abort the session. No new item wait starts after this returns.
    pub fn abort(&self) {
        self.tracker.abort();
    }

    /// Source counters for this session.
    pub fn stats(&self) -> SourceStats {
        self.tracker.stats().clone()
    }

    /// Snapshot of the session's outcome so far.
    pub fn report(&self) -> SessionReport {
        self.tracker.report()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("phase", &self.phase())
            .finish()
    }
}
