//! Streaming errors.

use chunkline_core::CoreError;
use thiserror::Error;

/// Errors that can occur while driving a fragment stream.
///
/// Backend-reported errors, error-shaped tool results and completion
/// anomalies are data, not errors: they surface as events. Only failures of
/// the surrounding plumbing end up here.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The fragment source failed (transport, upstream SDK).
    #[error("Source error: {0}")]
    Source(String),

    /// A fragment payload could not be decoded.
    #[error("Failed to decode fragment: {0}")]
    Decode(#[from] CoreError),

    /// Parse error for SSE event.
    #[error("Failed to parse SSE event: {0}")]
    ParseSse(String),

    /// SSE buffer grew past its limit without an event boundary.
    #[error("SSE buffer overflow")]
    BufferOverflow,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The event sink is closed.
    #[error("Send error: {0}")]
    Send(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl StreamError {
    /// Check if the stream can keep going after this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::ParseSse(_))
    }

    /// Create a source error from any error.
    pub fn source<E: std::fmt::Display>(err: E) -> Self {
        Self::Source(err.to_string())
    }
}

/// Result type for streaming operations.
pub type StreamResult<T> = Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StreamError::source("connection reset");
        assert_eq!(err.to_string(), "Source error: connection reset");
        assert_eq!(StreamError::BufferOverflow.to_string(), "SSE buffer overflow");
    }

    #[test]
    fn test_recoverable() {
        assert!(StreamError::Decode(CoreError::MissingType).is_recoverable());
        assert!(StreamError::ParseSse("bad".into()).is_recoverable());
        assert!(!StreamError::Source("gone".into()).is_recoverable());
        assert!(!StreamError::Send("closed".into()).is_recoverable());
    }
}
