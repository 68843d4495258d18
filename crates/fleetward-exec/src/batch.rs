//! Ordered command batches over one session
//!
//! A batch never aborts on a command's own failure. Only losing the session
//! stops it, and then every command that did not run is reported as failed
//! with the connection error, so the result always has one entry per
//! submitted command.

use std::time::Duration;

use tracing::{error, info, instrument, warn};

use crate::result::CommandResult;
use crate::traits::RemoteExecutor;

/// Outcome of one batch
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// One result per submitted command, in submission order
    pub results: Vec<CommandResult>,
    /// Set when the session could not be opened or dropped mid-batch
    pub connection_error: Option<String>,
}

impl BatchResult {
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }

    #[must_use]
    pub fn lost_connection(&self) -> bool {
        self.connection_error.is_some()
    }
}

/// Run `commands` in order on one session of `executor`
///
/// Each command is bounded by `command_timeout`. The session is closed
/// before returning, whatever happened.
#[instrument(
    skip(executor, commands),
    fields(executor = executor.executor_type(), commands = commands.len())
)]
pub async fn execute_batch(
    executor: &dyn RemoteExecutor,
    commands: &[String],
    command_timeout: Duration,
) -> BatchResult {
    let mut batch = BatchResult {
        results: Vec::with_capacity(commands.len()),
        connection_error: None,
    };

    if let Err(e) = executor.connect().await {
        let reason = e.to_string();
        error!(error = %reason, "session could not be established");
        batch
            .results
            .extend(commands.iter().map(|cmd| CommandResult::failed(cmd, &reason)));
        batch.connection_error = Some(reason);
        // a half-open session may still be held
        if let Err(e) = executor.disconnect().await {
            warn!(error = %e, "failed to close session");
        }
        return batch;
    }

    for (index, cmd) in commands.iter().enumerate() {
        match executor.run_with_timeout(cmd, command_timeout).await {
            Ok(result) => {
                if !result.success {
                    warn!(
                        command = %cmd,
                        exit_code = result.exit_code,
                        "command failed, continuing batch"
                    );
                }
                batch.results.push(result);
            }
            Err(e) if e.is_connection_loss() => {
                let reason = e.to_string();
                error!(
                    command = %cmd,
                    error = %reason,
                    not_run = commands.len() - index,
                    "session lost mid-batch"
                );
                batch.results.extend(
                    commands[index..]
                        .iter()
                        .map(|cmd| CommandResult::failed(cmd, &reason)),
                );
                batch.connection_error = Some(reason);
                break;
            }
            Err(e) => {
                warn!(command = %cmd, error = %e, "command did not complete");
                batch.results.push(CommandResult::failed(cmd, e.to_string()));
            }
        }
    }

    if let Err(e) = executor.disconnect().await {
        warn!(error = %e, "failed to close session");
    }

    info!(
        total = batch.results.len(),
        failed = batch.failed_count(),
        "batch finished"
    );

    batch
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::ExecError;
    use crate::local::LocalExecutor;

    /// Scripted executor: connect may fail, command `drop_at` (0-based)
    /// loses the session, commands containing "slow" time out
    #[derive(Default)]
    struct ScriptedExecutor {
        refuse_connect: bool,
        drop_at: Option<usize>,
        executed: Mutex<Vec<String>>,
        disconnects: AtomicUsize,
    }

    #[async_trait]
    impl RemoteExecutor for ScriptedExecutor {
        async fn connect(&self) -> Result<(), ExecError> {
            if self.refuse_connect {
                Err(ExecError::ConnectionFailed("connection refused".to_string()))
            } else {
                Ok(())
            }
        }

        async fn disconnect(&self) -> Result<(), ExecError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
            let mut executed = self.executed.lock().unwrap();
            if self.drop_at == Some(executed.len()) {
                return Err(ExecError::SessionLost("broken pipe".to_string()));
            }
            executed.push(cmd.to_string());
            if cmd.contains("slow") {
                return Err(ExecError::Timeout {
                    timeout: Duration::from_secs(60),
                });
            }
            let code = i32::from(cmd.starts_with("false"));
            Ok(CommandResult::completed(cmd, code, "out", "", Duration::ZERO))
        }

        async fn run_with_timeout(
            &self,
            cmd: &str,
            _timeout: Duration,
        ) -> Result<CommandResult, ExecError> {
            self.run(cmd).await
        }

        fn executor_type(&self) -> &'static str {
            "scripted"
        }
    }

    fn commands(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("step-{i}")).collect()
    }

    #[tokio::test]
    async fn test_connect_failure_synthesizes_every_command() {
        let executor = ScriptedExecutor {
            refuse_connect: true,
            ..Default::default()
        };

        let batch = execute_batch(&executor, &commands(4), Duration::from_secs(1)).await;

        assert_eq!(batch.results.len(), 4);
        assert!(batch.lost_connection());
        assert!(batch.results.iter().all(|r| r.exit_code == -1 && !r.success));
        assert!(batch.results[0].stderr.contains("connection refused"));
        assert!(executor.executed.lock().unwrap().is_empty());
        assert_eq!(executor.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_session_drop_mid_batch() {
        // third of five commands hits the dropped session
        let executor = ScriptedExecutor {
            drop_at: Some(2),
            ..Default::default()
        };
        let cmds = commands(5);

        let batch = execute_batch(&executor, &cmds, Duration::from_secs(1)).await;

        assert_eq!(batch.results.len(), 5);
        assert!(batch.results[..2].iter().all(|r| r.success));
        for (result, cmd) in batch.results[2..].iter().zip(&cmds[2..]) {
            assert_eq!(&result.command, cmd);
            assert_eq!(result.exit_code, -1);
            assert!(result.stderr.contains("broken pipe"));
        }
        assert_eq!(executor.executed.lock().unwrap().len(), 2);
        assert_eq!(executor.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_and_timed_out_commands_do_not_stop_batch() {
        let executor = ScriptedExecutor::default();
        let cmds = vec![
            "false step".to_string(),
            "slow step".to_string(),
            "echo done".to_string(),
        ];

        let batch = execute_batch(&executor, &cmds, Duration::from_secs(1)).await;

        assert_eq!(batch.results.len(), 3);
        assert!(!batch.lost_connection());
        assert_eq!(batch.results[0].exit_code, 1);
        assert_eq!(batch.results[1].exit_code, -1);
        assert!(batch.results[1].stderr.contains("timed out"));
        assert!(batch.results[2].success);
        assert_eq!(batch.failed_count(), 2);
    }

    #[tokio::test]
    async fn test_local_batch_with_timeout() {
        let executor = LocalExecutor::new();
        let cmds = vec![
            "echo first".to_string(),
            "sleep 5".to_string(),
            "echo last".to_string(),
        ];

        let batch = execute_batch(&executor, &cmds, Duration::from_millis(200)).await;

        assert_eq!(batch.results.len(), 3);
        assert_eq!(batch.results[0].stdout.trim(), "first");
        assert!(!batch.results[1].success);
        assert_eq!(batch.results[2].stdout.trim(), "last");
    }
}
