// src/utils/errors.rs
//! Error taxonomy for the harvest daemon
//!
//! Every fallible operation in the crate returns [`Result`]. The variants map
//! onto the fault classes the pipeline reacts to differently:
//!
//! - **ConnectionFailed**: the target cannot be reached (retried)
//! - **RecordingFailed**: the recording could not be created, started, cloned,
//!   streamed or copied (bounded retry, then the session is recreated)
//! - **ProtocolShape**: a remote call answered with an unexpected shape
//!   (never retried, fatal)
//! - **ConversionFailed**: a mapper rejected an event (isolated to that event)
//! - **CleanupFailed**: a snapshot file could not be removed

use thiserror::Error;

/// Result type alias for daemon operations
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Errors raised by the harvest pipeline
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Recording failed: {0}")]
    RecordingFailed(String),

    #[error("Unexpected response from {operation}: expected {expected}, got {actual}")]
    ProtocolShape {
        operation: String,
        expected: &'static str,
        actual: String,
    },

    #[error("{operation} gave up after {attempts} attempts: {source}")]
    BackoffExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<DaemonError>,
    },

    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Cleanup failed: {0}")]
    CleanupFailed(String),

    #[error("Raw event queue closed")]
    QueueClosed,

    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    /// Whether a retry loop may try the failed operation again.
    pub fn is_retryable(&self) -> bool {
        !self.is_fatal()
    }

    /// Faults that must terminate the daemon instead of degrading.
    pub fn is_fatal(&self) -> bool {
        match self {
            DaemonError::ProtocolShape { .. } | DaemonError::BackoffExhausted { .. } => true,
            DaemonError::ConfigError(_) => true,
            _ => false,
        }
    }

    /// Shorthand for a shape mismatch on `operation`.
    pub fn shape(operation: &str, expected: &'static str, actual: impl Into<String>) -> Self {
        DaemonError::ProtocolShape {
            operation: operation.to_string(),
            expected,
            actual: actual.into(),
        }
    }

    /// Collapse any recoverable fault into the single session fault the
    /// controller answers with a reconnect. Fatal faults pass through.
    pub fn into_session_fault(self) -> Self {
        match self {
            DaemonError::RecordingFailed(_) => self,
            e if e.is_fatal() => e,
            other => DaemonError::RecordingFailed(other.to_string()),
        }
    }
}

impl From<config::ConfigError> for DaemonError {
    fn from(e: config::ConfigError) -> Self {
        DaemonError::ConfigError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_errors_are_fatal() {
        let err = DaemonError::shape("newRecording", "long", "bytes");
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("newRecording"));
    }

    #[test]
    fn test_connection_errors_are_retryable() {
        let err = DaemonError::ConnectionFailed("refused".into());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_into_session_fault() {
        let io = DaemonError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert!(matches!(io.into_session_fault(), DaemonError::RecordingFailed(_)));

        let shape = DaemonError::shape("cloneRecording", "long", "text");
        assert!(matches!(
            shape.into_session_fault(),
            DaemonError::ProtocolShape { .. }
        ));
    }
}
