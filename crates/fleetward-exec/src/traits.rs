//! Remote executor trait

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::CommandResult;

/// A command runner bound to one host
///
/// `connect`/`disconnect` bracket a batch. Executors without a persistent
/// session keep the default no-op implementations.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Establish the session used by subsequent commands
    async fn connect(&self) -> Result<(), ExecError> {
        Ok(())
    }

    /// Close the session, if any
    async fn disconnect(&self) -> Result<(), ExecError> {
        Ok(())
    }

    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError>;

    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    fn is_connected(&self) -> bool {
        true
    }

    fn executor_type(&self) -> &'static str;
}

/// Bound one command by `limit`
///
/// An elapsed limit becomes `ExecError::Timeout`; the command future is
/// dropped, which kills a local child or abandons a remote channel.
pub(crate) async fn bounded<F>(cmd: &str, limit: Duration, run: F) -> Result<CommandResult, ExecError>
where
    F: Future<Output = Result<CommandResult, ExecError>>,
{
    if let Ok(result) = tokio::time::timeout(limit, run).await {
        return result;
    }
    tracing::warn!(command = %cmd, limit = ?limit, "command exceeded its time limit");
    Err(ExecError::Timeout { timeout: limit })
}
