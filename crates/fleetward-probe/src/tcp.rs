//! TCP reachability prober

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{info, instrument, warn};

use crate::error::ProbeError;
use crate::poll::{PollSettings, poll_until};
use crate::traits::{Reachability, ReachabilityProbe};

/// Polls a TCP port until a connect succeeds
#[derive(Debug, Clone)]
pub struct TcpReachability {
    interval: Duration,
    connect_timeout: Duration,
}

impl TcpReachability {
    #[must_use]
    pub fn new(interval: Duration, connect_timeout: Duration) -> Self {
        Self {
            interval,
            connect_timeout,
        }
    }
}

impl Default for TcpReachability {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(5))
    }
}

#[async_trait]
impl ReachabilityProbe for TcpReachability {
    #[instrument(skip(self))]
    async fn wait_reachable(&self, host: &str, port: u16, timeout: Duration) -> Reachability {
        let settings = PollSettings {
            interval: self.interval,
            timeout,
            attempt_timeout: self.connect_timeout,
        };

        let mut attempts = 0;
        let outcome = poll_until(settings, || {
            attempts += 1;
            async move {
                // dropping the stream closes it right away
                TcpStream::connect((host, port)).await?;
                Ok::<(), ProbeError>(())
            }
        })
        .await;

        match outcome {
            Ok(()) => {
                info!(host, port, "port accepting connections");
                Reachability::Reachable { attempts }
            }
            Err(exhausted) => {
                let last_error = exhausted.last_error.map(|e| e.to_string());
                warn!(
                    host,
                    port,
                    attempts = exhausted.attempts,
                    last_error = ?last_error,
                    "port not reachable before deadline"
                );
                Reachability::Unreachable {
                    attempts: exhausted.attempts,
                    last_error,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn test_open_port_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = TcpReachability::new(Duration::from_millis(50), Duration::from_millis(200));

        let reachability = probe
            .wait_reachable("127.0.0.1", port, Duration::from_secs(2))
            .await;

        assert!(reachability.is_reachable());
    }

    #[tokio::test]
    async fn test_closed_port_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let probe = TcpReachability::new(Duration::from_millis(50), Duration::from_millis(100));

        let started = std::time::Instant::now();
        let reachability = probe
            .wait_reachable("127.0.0.1", port, Duration::from_millis(300))
            .await;

        match reachability {
            Reachability::Unreachable { attempts, last_error } => {
                assert!(attempts >= 2);
                assert!(last_error.is_some());
            }
            Reachability::Reachable { .. } => panic!("nothing listens on the port"),
        }
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
