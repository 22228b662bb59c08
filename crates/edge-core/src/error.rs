//! Failure taxonomy for stream sessions.

/// Error type for stream session operations.
///
/// Every variant is terminal for the session it occurs in. Output that was
/// already flushed stays sent; nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("Source failure: {0}")]
    SourceFailure(String),

    #[error("Render failure: {0}")]
    RenderFailure(String),

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Client disconnected")]
    Disconnected,

    #[error("Session cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StreamError {
    /// Check if the error is an expected, client-driven termination rather
    /// than an application failure.
    pub fn is_client_termination(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Cancelled)
    }

    /// Short machine-readable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceFailure(_) => "source_failure",
            Self::RenderFailure(_) => "render_failure",
            Self::TransportFailure(_) => "transport_failure",
            Self::Disconnected => "disconnected",
            Self::Cancelled => "cancelled",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_termination() {
        assert!(StreamError::Disconnected.is_client_termination());
        assert!(StreamError::Cancelled.is_client_termination());
        assert!(!StreamError::SourceFailure("db down".into()).is_client_termination());
        assert!(!StreamError::TransportFailure("reset".into()).is_client_termination());
    }

    #[test]
    fn test_display() {
        let err = StreamError::RenderFailure("unbound variable `title`".into());
        assert_eq!(err.to_string(), "Render failure: unbound variable `title`");
        assert_eq!(err.kind(), "render_failure");
    }
}
