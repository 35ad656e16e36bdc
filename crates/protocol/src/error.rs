//! Error types shared between the daemon and its clients.

use thiserror::Error;

/// Session error type covering every failure mode an operation can surface.
///
/// The taxonomy is deliberately small: each variant tells the relay (and
/// through it the client) whether the failure was local, a connectivity
/// problem, or a remote-side rejection. Nothing here is ever retried
/// automatically.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed input detected locally: bad path, empty bulk list,
    /// unparsable permission mode. Never reaches the remote host.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An operation was attempted while the session is not ready.
    #[error("not connected")]
    NotConnected,

    /// Transport or authentication failure while establishing the
    /// connection. Terminal for the session.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Failure opening a specific channel after the connection was
    /// otherwise ready.
    #[error("{channel} channel failed: {reason}")]
    Channel {
        /// Which channel failed ("shell", "exec" or "sftp").
        channel: &'static str,
        /// Underlying cause.
        reason: String,
    },

    /// Remote-side failure of a specific operation. Carries the remote
    /// diagnostic text when one was available.
    #[error("operation failed: {0}")]
    Operation(String),
}

impl SessionError {
    /// Stable machine-readable tag for the wire, one per variant.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Validation(_) => "validation",
            SessionError::NotConnected => "not-connected",
            SessionError::Connection(_) => "connection",
            SessionError::Channel { .. } => "channel",
            SessionError::Operation(_) => "operation",
        }
    }
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = SessionError::Validation("invalid path".to_string());
        assert_eq!(err.to_string(), "validation failed: invalid path");
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_not_connected_error_display() {
        let err = SessionError::NotConnected;
        assert_eq!(err.to_string(), "not connected");
        assert_eq!(err.kind(), "not-connected");
    }

    #[test]
    fn test_connection_error_display() {
        let err = SessionError::Connection("authentication rejected".to_string());
        assert_eq!(err.to_string(), "connection failed: authentication rejected");
        assert_eq!(err.kind(), "connection");
    }

    #[test]
    fn test_channel_error_display() {
        let err = SessionError::Channel {
            channel: "sftp",
            reason: "subsystem request rejected".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "sftp channel failed: subsystem request rejected"
        );
        assert_eq!(err.kind(), "channel");
    }

    #[test]
    fn test_operation_error_display() {
        let err = SessionError::Operation("rm: permission denied".to_string());
        assert_eq!(err.to_string(), "operation failed: rm: permission denied");
        assert_eq!(err.kind(), "operation");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SessionError>();
    }
}
