//! HTTP health prober

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, instrument, warn};
use url::Url;

use crate::error::{ProbeError, Result};
use crate::poll::{PollSettings, poll_until};
use crate::traits::{Health, HealthProbe};

/// Polls `http://{host}:{port}{path}` until it answers with a 2xx status
#[derive(Debug, Clone)]
pub struct HttpHealthProber {
    client: Client,
    port: u16,
    interval: Duration,
    attempt_timeout: Duration,
}

impl HttpHealthProber {
    /// Create a prober with its own `reqwest::Client`
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(port: u16, interval: Duration) -> Result<Self> {
        let client = Client::builder().connect_timeout(interval).build()?;
        Ok(Self::with_client(client, port, interval))
    }

    /// Create a prober with a custom `reqwest::Client`
    #[must_use]
    pub fn with_client(client: Client, port: u16, interval: Duration) -> Self {
        Self {
            client,
            port,
            interval,
            attempt_timeout: interval,
        }
    }

    /// Bound a single request independently of the poll interval
    #[must_use]
    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Build the probe URL for a host
    ///
    /// `path` only ever replaces the path and query, never the authority.
    fn url(&self, host: &str, path: &str) -> Result<Url> {
        let authority = if host.contains(':') {
            format!("[{host}]:{}", self.port)
        } else {
            format!("{host}:{}", self.port)
        };
        let mut url = Url::parse(&format!("http://{authority}/"))?;

        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };
        url.set_path(path);
        url.set_query(query);
        Ok(url)
    }

    /// One GET against the endpoint
    async fn probe_once(&self, url: &Url) -> Result<()> {
        let response = self.client.get(url.clone()).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProbeError::Status {
                status: response.status().as_u16(),
            })
        }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProber {
    #[instrument(skip(self), fields(port = self.port))]
    async fn wait_healthy(&self, host: &str, path: &str, timeout: Duration) -> Health {
        let url = match self.url(host, path) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "cannot build health check URL");
                return Health::Unhealthy {
                    attempts: 0,
                    last_error: Some(e.to_string()),
                };
            }
        };

        let settings = PollSettings {
            interval: self.interval,
            timeout,
            attempt_timeout: self.attempt_timeout,
        };

        let mut attempts = 0;
        let outcome = poll_until(settings, || {
            attempts += 1;
            self.probe_once(&url)
        })
        .await;

        match outcome {
            Ok(()) => {
                info!(url = %url, attempts, "service healthy");
                Health::Healthy { attempts }
            }
            Err(exhausted) => {
                let last_error = exhausted.last_error.map(|e| e.to_string());
                warn!(
                    url = %url,
                    attempts = exhausted.attempts,
                    last_error = ?last_error,
                    "service did not become healthy"
                );
                Health::Unhealthy {
                    attempts: exhausted.attempts,
                    last_error,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::get;

    use super::*;

    /// Serve `/health`, failing the first `failures` requests
    async fn spawn_health_server(failures: usize) -> (u16, Arc<AtomicUsize>) {
        async fn health(State((hits, failures)): State<(Arc<AtomicUsize>, usize)>) -> StatusCode {
            if hits.fetch_add(1, Ordering::SeqCst) < failures {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::OK
            }
        }

        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/health", get(health))
            .with_state((hits.clone(), failures));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (port, hits)
    }

    #[test]
    fn test_url_building() {
        let prober = HttpHealthProber::new(8080, Duration::from_secs(5)).unwrap();

        assert_eq!(
            prober.url("10.0.0.5", "/health").unwrap().as_str(),
            "http://10.0.0.5:8080/health"
        );
        assert_eq!(
            prober.url("::1", "/status/ready").unwrap().as_str(),
            "http://[::1]:8080/status/ready"
        );
        assert_eq!(
            prober.url("10.0.0.5", "/health?deep=1").unwrap().as_str(),
            "http://10.0.0.5:8080/health?deep=1"
        );
    }

    #[test]
    fn test_path_cannot_change_host() {
        let prober = HttpHealthProber::new(8080, Duration::from_secs(5)).unwrap();

        let url = prober.url("10.0.0.5", "//elsewhere.example/health").unwrap();

        assert_eq!(url.host_str(), Some("10.0.0.5"));
        assert_eq!(url.port(), Some(8080));
    }

    #[tokio::test]
    async fn test_healthy_after_retries() {
        let (port, hits) = spawn_health_server(2).await;
        let prober = HttpHealthProber::new(port, Duration::from_millis(100)).unwrap();

        let health = prober
            .wait_healthy("127.0.0.1", "/health", Duration::from_secs(5))
            .await;

        assert_eq!(health, Health::Healthy { attempts: 3 });
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_returns_at_healthy_tick_not_deadline() {
        // second tick is healthy; the window is far longer
        let (port, _hits) = spawn_health_server(1).await;
        let prober = HttpHealthProber::new(port, Duration::from_millis(200)).unwrap();

        let started = std::time::Instant::now();
        let health = prober
            .wait_healthy("127.0.0.1", "/health", Duration::from_secs(10))
            .await;

        assert!(health.is_healthy());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_unhealthy_when_window_elapses() {
        let (port, _hits) = spawn_health_server(usize::MAX).await;
        let prober = HttpHealthProber::new(port, Duration::from_millis(100)).unwrap();

        let health = prober
            .wait_healthy("127.0.0.1", "/health", Duration::from_millis(350))
            .await;

        match health {
            Health::Unhealthy { last_error, .. } => {
                assert!(last_error.unwrap().contains("503"));
            }
            Health::Healthy { .. } => panic!("endpoint never reports healthy"),
        }
    }

    #[tokio::test]
    async fn test_unknown_path_is_unhealthy() {
        let (port, _hits) = spawn_health_server(0).await;
        let prober = HttpHealthProber::new(port, Duration::from_millis(100)).unwrap();

        let health = prober
            .wait_healthy("127.0.0.1", "/missing", Duration::from_millis(250))
            .await;

        assert!(!health.is_healthy());
    }
}
