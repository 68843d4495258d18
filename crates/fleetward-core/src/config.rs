//! Run settings frozen before an orchestration run starts

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Fleet-level rollout strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One host at a time in plan order, pausing between hosts
    #[default]
    Rolling,
    /// Hosts in bounded parallel batches, no pause
    Simple,
    /// Placeholder: runs with `Simple` semantics, no blue/green pools exist
    #[serde(alias = "blue-green")]
    BlueGreen,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Rolling => "rolling",
            Strategy::Simple => "simple",
            Strategy::BlueGreen => "blue_green",
        };
        f.write_str(name)
    }
}

impl FromStr for Strategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rolling" => Ok(Strategy::Rolling),
            "simple" => Ok(Strategy::Simple),
            "blue_green" | "blue-green" => Ok(Strategy::BlueGreen),
            other => Err(CoreError::ConfigError(format!(
                "unknown deployment strategy: {other}"
            ))),
        }
    }
}

/// Settings shared by every host of a run
#[derive(Debug, Clone)]
pub struct DeploySettings {
    /// Strategy for deploy runs
    pub strategy: Strategy,
    /// Path probed on each host after deploying
    pub health_check_path: String,
    /// Budget for a host to report healthy
    pub health_check_timeout: Duration,
    /// Soak interval between hosts of a rolling run
    pub inter_host_delay: Duration,
    /// Budget for a host to resolve and accept connections on its SSH port
    pub reachability_timeout: Duration,
    /// Poll cadence while waiting for a host to resolve
    pub reachability_interval: Duration,
    /// Upper bound for one remote command
    pub command_timeout: Duration,
    /// Directory on the host that holds application checkouts
    pub app_dir: String,
    /// Git repository of the application
    pub repo_url: String,
    /// Compose binary (`docker-compose` or `docker compose`)
    pub compose_command: String,
    /// Pause after bringing the stack up
    pub startup_pause: Duration,
    /// Hosts run concurrently by non-rolling strategies and configure runs
    pub max_parallel: usize,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            strategy: Strategy::Rolling,
            health_check_path: "/health".to_string(),
            health_check_timeout: Duration::from_secs(10),
            inter_host_delay: Duration::from_secs(30),
            reachability_timeout: Duration::from_secs(300),
            reachability_interval: Duration::from_secs(10),
            command_timeout: Duration::from_secs(60),
            app_dir: "/opt/apps".to_string(),
            repo_url: "https://github.com/your-org/your-app.git".to_string(),
            compose_command: "docker-compose".to_string(),
            startup_pause: Duration::from_secs(10),
            max_parallel: 1,
        }
    }
}

impl DeploySettings {
    /// Name of the checkout directory, taken from the repository URL
    #[must_use]
    pub fn app_name(&self) -> &str {
        let tail = self
            .repo_url
            .trim_end_matches('/')
            .rsplit(['/', ':'])
            .next()
            .unwrap_or("app");
        let name = tail.strip_suffix(".git").unwrap_or(tail);
        if name.is_empty() { "app" } else { name }
    }

    /// Full path of the application checkout on the host
    #[must_use]
    pub fn checkout_dir(&self) -> String {
        format!("{}/{}", self.app_dir.trim_end_matches('/'), self.app_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("rolling".parse::<Strategy>().unwrap(), Strategy::Rolling);
        assert_eq!("Simple".parse::<Strategy>().unwrap(), Strategy::Simple);
        assert_eq!("blue-green".parse::<Strategy>().unwrap(), Strategy::BlueGreen);
        assert!("canary".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_app_name_from_repo_url() {
        let mut settings = DeploySettings::default();
        assert_eq!(settings.app_name(), "your-app");
        assert_eq!(settings.checkout_dir(), "/opt/apps/your-app");

        settings.repo_url = "git@github.com:acme/storefront.git".to_string();
        settings.app_dir = "/srv/".to_string();
        assert_eq!(settings.app_name(), "storefront");
        assert_eq!(settings.checkout_dir(), "/srv/storefront");
    }
}
