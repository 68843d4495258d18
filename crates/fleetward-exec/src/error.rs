//! Error types for fleetward-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during remote execution
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Failed to connect to remote host
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connecting did not finish in time
    #[error("connection timed out after {timeout:?}")]
    ConnectTimeout {
        /// Connect timeout that was exceeded
        timeout: Duration,
    },

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The established session broke while a command was in flight
    #[error("session lost: {0}")]
    SessionLost(String),

    /// Command timed out
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// SSH key error
    #[error("SSH key error: {0}")]
    SshKeyError(String),

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error during local execution
    #[error("I/O error: {0}")]
    IoError(String),

    /// Connection not established
    #[error("not connected")]
    NotConnected,
}

impl ExecError {
    /// Whether the error means the session is gone and no further command
    /// of the batch can run on it
    #[must_use]
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            ExecError::ConnectionFailed(_)
                | ExecError::ConnectTimeout { .. }
                | ExecError::AuthenticationFailed(_)
                | ExecError::SessionLost(_)
                | ExecError::NotConnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_loss_classification() {
        assert!(ExecError::SessionLost("eof".into()).is_connection_loss());
        assert!(ExecError::NotConnected.is_connection_loss());
        assert!(
            !ExecError::Timeout {
                timeout: Duration::from_secs(1)
            }
            .is_connection_loss()
        );
        assert!(!ExecError::SpawnError("no sh".into()).is_connection_loss());
    }
}
