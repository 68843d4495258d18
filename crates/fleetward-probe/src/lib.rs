//! fleetward-probe: Deadline-bounded host probes
//!
//! Health probing over HTTP and SSH-port reachability over raw TCP, both
//! driven by the same fixed-interval polling loop.

pub mod error;
pub mod http;
pub mod poll;
pub mod tcp;
pub mod traits;

pub use error::{ProbeError, Result};
pub use http::HttpHealthProber;
pub use poll::{PollSettings, poll_until};
pub use tcp::TcpReachability;
pub use traits::{Health, HealthProbe, Reachability, ReachabilityProbe};
