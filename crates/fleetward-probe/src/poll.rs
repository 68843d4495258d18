//! Fixed-cadence polling under a deadline

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep_until, timeout};
use tracing::debug;

use crate::error::ProbeError;

/// Cadence and bounds of a polling loop
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Time between the starts of two consecutive attempts
    pub interval: Duration,
    /// Total budget; no attempt starts or runs past it
    pub timeout: Duration,
    /// Upper bound for a single attempt
    pub attempt_timeout: Duration,
}

/// Every attempt failed before the deadline
#[derive(Debug)]
pub struct Exhausted {
    /// Number of attempts made
    pub attempts: u32,
    /// Error of the last attempt
    pub last_error: Option<ProbeError>,
}

/// Call `attempt` at t=0, t=interval, t=2*interval, ... until it returns
/// `Ok` or the deadline passes
///
/// Returns as soon as an attempt succeeds.
///
/// # Errors
/// Returns `Exhausted` once the deadline passes without a successful attempt
pub async fn poll_until<T, F, Fut>(settings: PollSettings, mut attempt: F) -> Result<T, Exhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let deadline = Instant::now() + settings.timeout;
    let mut attempts = 0;
    let mut last_error = None;

    loop {
        let started = Instant::now();
        if started >= deadline {
            break;
        }

        attempts += 1;
        let slice = settings.attempt_timeout.min(deadline - started);
        match timeout(slice, attempt()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                debug!(attempt = attempts, error = %e, "probe attempt failed");
                last_error = Some(e);
            }
            Err(_) => {
                debug!(attempt = attempts, slice = ?slice, "probe attempt timed out");
                last_error = Some(ProbeError::Timeout);
            }
        }

        let next = started + settings.interval;
        if next >= deadline {
            break;
        }
        sleep_until(next).await;
    }

    Err(Exhausted {
        attempts,
        last_error,
    })
}
