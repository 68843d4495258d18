//! SSH command execution using russh crate

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use russh::keys::PrivateKeyWithHashAlg;
use russh::keys::ssh_key::{self, PrivateKey};
use russh::{Channel, ChannelMsg, Disconnect, client};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::ExecError;
use crate::result::{CommandResult, ConnectionInfo, NO_EXIT_CODE};
use crate::traits::{RemoteExecutor, bounded};

type Session = client::Handle<AcceptingHandler>;

/// Client handler that trusts any host key
#[derive(Debug)]
struct AcceptingHandler;

impl client::Handler for AcceptingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // freshly provisioned hosts have no known_hosts entry
        Ok(true)
    }
}

/// Output gathered from one exec channel
#[derive(Debug, Default)]
struct ChannelOutput {
    exit_code: Option<i32>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    closed: bool,
}

impl ChannelOutput {
    /// Read until the server closes the channel
    ///
    /// The exit status can arrive after EOF, so EOF alone does not end the
    /// read.
    async fn drain(channel: &mut Channel<client::Msg>, cmd: &str) -> Self {
        let mut output = Self::default();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => output.stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext: 1 } => output.stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status } => {
                    output.exit_code = Some(exit_status.cast_signed());
                }
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    warn!(command = %cmd, signal = ?signal_name, "remote command killed by signal");
                    output.record_signal(&format!("{signal_name:?}"));
                }
                ChannelMsg::Close => {
                    output.closed = true;
                    break;
                }
                _ => {}
            }
        }
        output
    }

    fn record_signal(&mut self, signal: &str) {
        if !self.stderr.is_empty() && !self.stderr.ends_with(b"\n") {
            self.stderr.push(b'\n');
        }
        self.stderr
            .extend_from_slice(format!("killed by signal {signal}").as_bytes());
    }

    /// A stream that ends with neither an exit status nor a close means the
    /// session went away under the command.
    fn into_result(self, cmd: &str, duration: Duration) -> Result<CommandResult, ExecError> {
        if !self.closed && self.exit_code.is_none() {
            return Err(ExecError::SessionLost(format!(
                "channel ended before `{cmd}` finished"
            )));
        }

        Ok(CommandResult::completed(
            cmd,
            self.exit_code.unwrap_or(NO_EXIT_CODE),
            String::from_utf8_lossy(&self.stdout),
            String::from_utf8_lossy(&self.stderr),
            duration,
        ))
    }
}

/// SSH command executor
///
/// Holds at most one session. `connect` opens it, each command runs on its
/// own channel of that session, `disconnect` closes it.
pub struct SshExecutor {
    conn_info: ConnectionInfo,
    key: Arc<PrivateKey>,
    session: Mutex<Option<Session>>,
}

impl std::fmt::Debug for SshExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshExecutor")
            .field("conn_info", &self.conn_info)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl SshExecutor {
    /// Create an executor from an already loaded key
    #[must_use]
    pub fn new(conn_info: ConnectionInfo, key: Arc<PrivateKey>) -> Self {
        Self {
            conn_info,
            key,
            session: Mutex::new(None),
        }
    }

    /// TCP connect, handshake and public key authentication
    async fn handshake(&self) -> Result<Session, ExecError> {
        let target = (self.conn_info.host.as_str(), self.conn_info.port);
        let mut session = client::connect(Arc::new(client::Config::default()), target, AcceptingHandler)
            .await
            .map_err(|e| ExecError::ConnectionFailed(e.to_string()))?;

        // RSA keys need the strongest hash the server accepts
        let hash_alg = session
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        let key = PrivateKeyWithHashAlg::new(Arc::clone(&self.key), hash_alg);

        let auth = session
            .authenticate_publickey(&self.conn_info.user, key)
            .await
            .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?;
        if !auth.success() {
            return Err(ExecError::AuthenticationFailed(format!(
                "server rejected key for {}",
                self.conn_info.user
            )));
        }

        Ok(session)
    }

    /// Run `cmd` on a new channel of the open session
    ///
    /// Channel errors, or a channel that ends without an exit status, mean the
    /// session is gone and map to `SessionLost`.
    #[instrument(skip(self, cmd), fields(host = %self.conn_info.host))]
    async fn exec(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(ExecError::NotConnected)?;

        let started = Instant::now();
        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| ExecError::SessionLost(e.to_string()))?;
        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::SessionLost(e.to_string()))?;

        let result = match ChannelOutput::drain(&mut channel, cmd)
            .await
            .into_result(cmd, started.elapsed())
        {
            Ok(result) => result,
            Err(e) => {
                // the session is unusable, drop it
                guard.take();
                return Err(e);
            }
        };

        debug!(
            command = %cmd,
            exit_code = result.exit_code,
            duration = ?result.duration,
            "remote command finished"
        );
        Ok(result)
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    #[instrument(skip(self), fields(host = %self.conn_info.host, port = self.conn_info.port))]
    async fn connect(&self) -> Result<(), ExecError> {
        let mut guard = self.session.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let limit = self.conn_info.connect_timeout;
        let session = tokio::time::timeout(limit, self.handshake())
            .await
            .map_err(|_| ExecError::ConnectTimeout { timeout: limit })??;

        info!(user = %self.conn_info.user, "SSH session established");
        *guard = Some(session);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ExecError> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };

        session
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(|e| ExecError::SessionLost(e.to_string()))?;
        debug!(host = %self.conn_info.host, "SSH session closed");
        Ok(())
    }

    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.connect().await?;
        self.exec(cmd).await
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        // connecting has its own limit
        self.connect().await?;
        bounded(cmd, timeout, self.exec(cmd)).await
    }

    fn is_connected(&self) -> bool {
        // a held lock means a command is using the session
        self.session
            .try_lock()
            .map(|s| s.is_some())
            .unwrap_or(true)
    }

    fn executor_type(&self) -> &'static str {
        "ssh"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(exit_code: Option<i32>, closed: bool) -> ChannelOutput {
        ChannelOutput {
            exit_code,
            stdout: b"partial".to_vec(),
            stderr: Vec::new(),
            closed,
        }
    }

    #[test]
    fn test_closed_channel_completes() {
        let result = output(Some(2), true)
            .into_result("false", Duration::from_millis(5))
            .unwrap();

        assert_eq!(result.exit_code, 2);
        assert_eq!(result.stdout, "partial");
    }

    #[test]
    fn test_exit_status_without_close_completes() {
        let result = output(Some(0), false)
            .into_result("true", Duration::from_millis(5))
            .unwrap();

        assert!(result.success);
    }

    #[test]
    fn test_stream_ending_early_is_session_loss() {
        let err = output(None, false)
            .into_result("docker compose pull", Duration::from_millis(5))
            .unwrap_err();

        assert!(matches!(err, ExecError::SessionLost(_)));
        assert!(err.is_connection_loss());
    }

    #[test]
    fn test_signal_lands_in_stderr() {
        let mut out = output(None, true);
        out.stderr = b"terminating".to_vec();
        out.record_signal("KILL");

        let result = out.into_result("sleep 60", Duration::from_millis(5)).unwrap();

        assert!(!result.success);
        assert_eq!(result.exit_code, NO_EXIT_CODE);
        assert_eq!(result.stderr, "terminating\nkilled by signal KILL");
    }
}
