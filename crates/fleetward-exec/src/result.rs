//! Result types for command execution

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exit code recorded for commands that never produced one
pub const NO_EXIT_CODE: i32 = -1;

/// Result of a single command execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Command line as submitted
    pub command: String,
    /// Exit status code (0 for success, -1 when the command did not finish)
    pub exit_code: i32,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// Whether the command exited with status 0
    pub success: bool,
    /// Time taken to execute
    pub duration: Duration,
}

impl CommandResult {
    /// Result of a command that ran to completion
    pub fn completed(
        command: impl Into<String>,
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            success: exit_code == 0,
            duration,
        }
    }

    /// Result for a command that could not run or did not finish
    ///
    /// `reason` ends up in stderr.
    pub fn failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            exit_code: NO_EXIT_CODE,
            stdout: String::new(),
            stderr: reason.into(),
            success: false,
            duration: Duration::ZERO,
        }
    }
}

/// Connection information for SSH
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Host address
    pub host: String,
    /// Port (default 22)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username
    pub user: String,
    /// Upper bound for TCP connect plus SSH handshake and authentication
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

impl ConnectionInfo {
    /// Create new connection info
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            user: user.into(),
            connect_timeout: default_connect_timeout(),
        }
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_sets_success_from_exit_code() {
        let ok = CommandResult::completed("true", 0, "", "", Duration::from_millis(3));
        let bad = CommandResult::completed("false", 1, "", "", Duration::from_millis(3));

        assert!(ok.success);
        assert!(!bad.success);
        assert_eq!(bad.exit_code, 1);
    }

    #[test]
    fn test_failed_result_carries_reason() {
        let result = CommandResult::failed("docker-compose pull", "connection failed: refused");

        assert!(!result.success);
        assert_eq!(result.exit_code, NO_EXIT_CODE);
        assert_eq!(result.stderr, "connection failed: refused");
        assert!(result.stdout.is_empty());
    }

    #[test]
    fn test_result_serializes_command_and_status() {
        let result = CommandResult::completed("uptime", 0, "up 3 days", "", Duration::ZERO);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["command"], "uptime");
        assert_eq!(json["exit_code"], 0);
        assert_eq!(json["success"], true);
    }

    #[test]
    fn test_connection_info_defaults() {
        let info = ConnectionInfo::new("10.0.0.5", "ubuntu").with_port(2222);

        assert_eq!(info.port, 2222);
        assert_eq!(info.user, "ubuntu");
        assert_eq!(info.connect_timeout, Duration::from_secs(30));
    }
}
