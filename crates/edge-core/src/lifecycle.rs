//! Stream session lifecycle tracking.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::error::StreamError;

/// Why a session ended without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The item source could not produce the next item.
    SourceFailure,
    /// Template evaluation failed.
    RenderFailure,
    /// A transport write failed.
    TransportFailure,
    /// The client went away.
    Disconnected,
    /// The session owner aborted explicitly.
    Cancelled,
}

impl AbortReason {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceFailure => "source_failure",
            Self::RenderFailure => "render_failure",
            Self::TransportFailure => "transport_failure",
            Self::Disconnected => "disconnected",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<&StreamError> for AbortReason {
    fn from(err: &StreamError) -> Self {
        match err {
            StreamError::SourceFailure(_) => Self::SourceFailure,
            StreamError::RenderFailure(_) | StreamError::InvalidConfig(_) => Self::RenderFailure,
            StreamError::TransportFailure(_) => Self::TransportFailure,
            StreamError::Disconnected => Self::Disconnected,
            StreamError::Cancelled => Self::Cancelled,
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phases for a stream session.
///
/// `Initialized → Rendering → {Completed | Aborted}`. `Rendering` is
/// re-entered on every pull cycle; both terminal phases release the source,
/// the render context and the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Session built, nothing pulled yet.
    Initialized,
    /// At least one pull cycle has started.
    Rendering,
    /// Fragment sequence exhausted and flushed.
    Completed,
    /// Ended early on error, disconnect or abort.
    Aborted(AbortReason),
}

impl SessionPhase {
    /// Check if the phase is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted(_))
    }

    /// Check whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Initialized, Rendering)
                | (Rendering, Rendering)
                | (Rendering, Completed)
                | (Initialized, Aborted(_))
                | (Rendering, Aborted(_))
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::Rendering => write!(f, "rendering"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted(reason) => write!(f, "aborted({})", reason),
        }
    }
}

/// Rejected lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid session transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: SessionPhase,
    pub to: SessionPhase,
}

/// Current phase plus transition validation.
#[derive(Debug, Clone)]
pub struct SessionState {
    phase: SessionPhase,
}

impl SessionState {
    /// Create a state in `Initialized`.
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Initialized,
        }
    }

    /// Get the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: SessionPhase) -> Result<(), InvalidTransition> {
        if !self.phase.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Timing context for observability.
#[derive(Debug, Clone)]
pub struct TimingContext {
    start: Instant,
    marks: HashMap<String, Instant>,
}

impl TimingContext {
    /// Create a new timing context.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: HashMap::new(),
        }
    }

    /// Record a timing mark.
    pub fn mark(&mut self, name: &str) {
        self.marks.insert(name.to_string(), Instant::now());
    }

    /// Record a mark only the first time it is reached.
    pub fn mark_once(&mut self, name: &str) {
        self.marks
            .entry(name.to_string())
            .or_insert_with(Instant::now);
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the offset of a mark from the start.
    pub fn since_start(&self, name: &str) -> Option<Duration> {
        self.marks.get(name).map(|t| t.duration_since(self.start))
    }

    /// Get time to the first chunk handed to the transport.
    pub fn time_to_first_chunk(&self) -> Option<Duration> {
        self.since_start("first_chunk")
    }
}

impl Default for TimingContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer trait for lifecycle events.
pub trait LifecycleObserver: Send + Sync {
    /// Called when a lifecycle phase occurs.
    fn on_phase(&self, phase: SessionPhase, elapsed: Duration);

    /// Called after a chunk is handed to the transport.
    fn on_chunk(&self, _bytes: usize) {}
}
