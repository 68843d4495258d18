//! Deployment plans

use std::collections::HashSet;
use std::time::Duration;

use crate::config::{DeploySettings, Strategy};
use crate::error::CoreError;

/// Immutable description of one deploy run
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    host_ids: Vec<String>,
    app_version: String,
    strategy: Strategy,
    health_check_path: String,
    inter_host_delay: Duration,
    health_check_timeout: Duration,
}

impl DeploymentPlan {
    /// Build a plan from the run settings
    ///
    /// # Errors
    /// Returns `CoreError::InvalidPlan` if the host list is empty or has
    /// duplicates, the version is empty or not a plain git ref, the health
    /// path is not a plain absolute path, or the health timeout is zero
    pub fn new(
        host_ids: Vec<String>,
        app_version: impl Into<String>,
        settings: &DeploySettings,
    ) -> Result<Self, CoreError> {
        validate_host_ids(&host_ids)?;

        let app_version = app_version.into();
        validate_version(&app_version)?;

        validate_health_path(&settings.health_check_path)?;
        if settings.health_check_timeout.is_zero() {
            return Err(CoreError::InvalidPlan(
                "health check timeout must be positive".to_string(),
            ));
        }

        Ok(Self {
            host_ids,
            app_version,
            strategy: settings.strategy,
            health_check_path: settings.health_check_path.clone(),
            inter_host_delay: settings.inter_host_delay,
            health_check_timeout: settings.health_check_timeout,
        })
    }

    /// Override the strategy taken from the settings
    #[must_use]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn host_ids(&self) -> &[String] {
        &self.host_ids
    }

    pub fn app_version(&self) -> &str {
        &self.app_version
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn health_check_path(&self) -> &str {
        &self.health_check_path
    }

    pub fn inter_host_delay(&self) -> Duration {
        self.inter_host_delay
    }

    pub fn health_check_timeout(&self) -> Duration {
        self.health_check_timeout
    }
}

/// Reject empty, blank or duplicated host ids
///
/// # Errors
/// Returns `CoreError::InvalidPlan` describing the first problem found
pub fn validate_host_ids(host_ids: &[String]) -> Result<(), CoreError> {
    if host_ids.is_empty() {
        return Err(CoreError::InvalidPlan("no host ids given".to_string()));
    }

    let mut seen = HashSet::with_capacity(host_ids.len());
    for id in host_ids {
        if id.trim().is_empty() {
            return Err(CoreError::InvalidPlan("blank host id".to_string()));
        }
        if !seen.insert(id.as_str()) {
            return Err(CoreError::InvalidPlan(format!("duplicate host id: {id}")));
        }
    }
    Ok(())
}

// the version is interpolated into a remote shell command
fn validate_version(version: &str) -> Result<(), CoreError> {
    if version.is_empty() {
        return Err(CoreError::InvalidPlan("app version is empty".to_string()));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/');
    if version.starts_with('-') || !version.chars().all(allowed) {
        return Err(CoreError::InvalidPlan(format!(
            "app version is not a plain git ref: {version}"
        )));
    }
    Ok(())
}

// a leading `//` would name another host
fn validate_health_path(path: &str) -> Result<(), CoreError> {
    if !path.starts_with('/') || path.starts_with("//") {
        return Err(CoreError::InvalidPlan(format!(
            "health check path must be a single absolute path: {path}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(ids: &[&str]) -> Vec<String> {
        ids.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_plan_takes_settings() {
        let settings = DeploySettings {
            strategy: Strategy::Simple,
            inter_host_delay: Duration::from_secs(5),
            ..DeploySettings::default()
        };

        let plan = DeploymentPlan::new(hosts(&["a", "b"]), "v2.0.1", &settings).unwrap();

        assert_eq!(plan.host_ids(), &["a".to_string(), "b".to_string()]);
        assert_eq!(plan.strategy(), Strategy::Simple);
        assert_eq!(plan.inter_host_delay(), Duration::from_secs(5));
        assert_eq!(plan.health_check_path(), "/health");
        assert_eq!(plan.health_check_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_rejects_empty_and_duplicate_hosts() {
        let settings = DeploySettings::default();

        assert!(matches!(
            DeploymentPlan::new(vec![], "v1", &settings),
            Err(CoreError::InvalidPlan(_))
        ));
        assert!(matches!(
            DeploymentPlan::new(hosts(&["a", "b", "a"]), "v1", &settings),
            Err(CoreError::InvalidPlan(msg)) if msg.contains("duplicate")
        ));
    }

    #[test]
    fn test_rejects_shell_metacharacters_in_version() {
        let settings = DeploySettings::default();

        assert!(DeploymentPlan::new(hosts(&["a"]), "v1; rm -rf /", &settings).is_err());
        assert!(DeploymentPlan::new(hosts(&["a"]), "--orphan", &settings).is_err());
        assert!(DeploymentPlan::new(hosts(&["a"]), "", &settings).is_err());
        assert!(DeploymentPlan::new(hosts(&["a"]), "release/2024.10_rc-1", &settings).is_ok());
    }

    #[test]
    fn test_rejects_relative_health_path() {
        let settings = DeploySettings {
            health_check_path: "health".to_string(),
            ..DeploySettings::default()
        };

        assert!(DeploymentPlan::new(hosts(&["a"]), "v1", &settings).is_err());
    }

    #[test]
    fn test_rejects_network_path_as_health_path() {
        let settings = DeploySettings {
            health_check_path: "//elsewhere.example/health".to_string(),
            ..DeploySettings::default()
        };

        let result = DeploymentPlan::new(hosts(&["a"]), "v1", &settings);

        assert!(matches!(result, Err(CoreError::InvalidPlan(msg)) if msg.contains("elsewhere")));
    }
}
