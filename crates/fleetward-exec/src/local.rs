//! Loopback execution through `sh -c`

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::error::ExecError;
use crate::result::{CommandResult, NO_EXIT_CODE};
use crate::traits::{RemoteExecutor, bounded};

/// Runs commands on this machine
///
/// Stands in for an SSH session on hosts that resolve to loopback. Each
/// command gets its own shell, as it would over SSH.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn spawn_shell(cmd: &str) -> Result<CommandResult, ExecError> {
        let started = Instant::now();

        // killed if the caller drops us on timeout
        let output = Command::new("sh")
            .args(["-c", cmd])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    ExecError::SpawnError(e.to_string())
                }
                _ => ExecError::IoError(e.to_string()),
            })?;

        let result = CommandResult::completed(
            cmd,
            output.status.code().unwrap_or(NO_EXIT_CODE),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
            started.elapsed(),
        );

        if result.success {
            debug!(command = %cmd, duration = ?result.duration, "local command finished");
        } else {
            warn!(command = %cmd, exit_code = result.exit_code, "local command failed");
        }
        Ok(result)
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        Self::spawn_shell(cmd).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        bounded(cmd, timeout, Self::spawn_shell(cmd)).await
    }

    fn executor_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_code_and_streams() {
        let executor = LocalExecutor::new();

        let result = executor
            .run("echo deployed; echo warning >&2; exit 3")
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout.trim(), "deployed");
        assert_eq!(result.stderr.trim(), "warning");
    }

    #[tokio::test]
    async fn test_each_command_gets_a_fresh_shell() {
        let executor = LocalExecutor::new();

        executor.run("cd / && export MARKER=1").await.unwrap();
        let result = executor.run("echo \"${MARKER:-unset}\"").await.unwrap();

        assert!(result.success);
        assert_eq!(result.stdout.trim(), "unset");
    }

    #[tokio::test]
    async fn test_time_limit() {
        let executor = LocalExecutor::new();

        let result = executor
            .run_with_timeout("sleep 5", Duration::from_millis(100))
            .await;

        assert!(matches!(result, Err(ExecError::Timeout { .. })));
    }
}
