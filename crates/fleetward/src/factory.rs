//! Host actor factory for creating SSH and local executors

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetward_core::{CoreError, HostActorFactory, HostAddress};
use fleetward_exec::{
    ConnectionInfo, KeySource, LocalExecutor, PrivateKey, RemoteExecutor, SshExecutor,
};
use tokio::sync::OnceCell;

use crate::config::SshConfig;

/// Default implementation of `HostActorFactory`
///
/// The private key is loaded on first use and shared by every executor.
pub struct DefaultHostFactory {
    user: String,
    key_source: KeySource,
    connect_timeout: Duration,
    key: OnceCell<Arc<PrivateKey>>,
}

impl DefaultHostFactory {
    pub fn new(ssh: &SshConfig) -> Self {
        Self {
            user: ssh.user.clone(),
            key_source: ssh.key_source(),
            connect_timeout: ssh.connect_timeout(),
            key: OnceCell::new(),
        }
    }

    async fn key(&self) -> Result<Arc<PrivateKey>, CoreError> {
        self.key
            .get_or_try_init(|| async { self.key_source.load() })
            .await
            .map(Arc::clone)
            .map_err(|e| CoreError::Executor(format!("cannot load SSH key: {e}")))
    }
}

#[async_trait]
impl HostActorFactory for DefaultHostFactory {
    async fn create_executor(
        &self,
        host_id: &str,
        address: &HostAddress,
    ) -> Result<Arc<dyn RemoteExecutor>, CoreError> {
        // For localhost targets, use LocalExecutor
        if address.is_loopback() {
            tracing::debug!(host = host_id, "using local executor");
            return Ok(Arc::new(LocalExecutor::new()));
        }

        let key = self.key().await?;
        let conn_info = ConnectionInfo::new(&address.host, &self.user)
            .with_port(address.port)
            .with_connect_timeout(self.connect_timeout);
        Ok(Arc::new(SshExecutor::new(conn_info, key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_localhost_executor_creation() {
        let factory = DefaultHostFactory::new(&SshConfig::default());

        let executor = factory
            .create_executor("local", &HostAddress::new("127.0.0.1", 22))
            .await
            .unwrap();

        assert_eq!(executor.executor_type(), "local");
    }

    #[tokio::test]
    async fn test_missing_key_is_an_executor_error() {
        let ssh = SshConfig {
            key_path: "/nonexistent/fleetward/id_ed25519".to_string(),
            ..SshConfig::default()
        };
        let factory = DefaultHostFactory::new(&ssh);

        let result = factory
            .create_executor("web-1", &HostAddress::new("10.0.0.11", 22))
            .await;

        assert!(matches!(result, Err(CoreError::Executor(msg)) if msg.contains("SSH key")));
    }
}
