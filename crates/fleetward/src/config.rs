//! Configuration loading and types

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::WrapErr;
use fleetward_core::{DeploySettings, Strategy};
use fleetward_exec::KeySource;
use serde::{Deserialize, Serialize};

/// Top-level configuration for fleetward
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub deployment: DeploymentConfig,
    #[serde(default)]
    pub health: HealthConfig,
    /// Static inventory
    #[serde(default)]
    pub host: Vec<HostEntry>,
    /// Server types by name, e.g. `web_servers`
    #[serde(default)]
    pub server_types: BTreeMap<String, ServerTypeConfig>,
    /// File this config was read from, `None` for built-in defaults
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            ssh: SshConfig::default(),
            deployment: DeploymentConfig::default(),
            health: HealthConfig::default(),
            host: Vec::new(),
            server_types: BTreeMap::new(),
            source: None,
        }
    }
}

/// Remote-shell credentials shared by every host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_user")]
    pub user: String,
    /// Private key file, `~` expands to the home directory
    #[serde(default = "default_key_path")]
    pub key_path: String,
    /// Environment variable holding a base64 key; wins over `key_path`
    #[serde(default)]
    pub key_env: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            key_path: default_key_path(),
            key_env: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl SshConfig {
    pub fn key_source(&self) -> KeySource {
        match &self.key_env {
            Some(var) => KeySource::Env(var.clone()),
            None => KeySource::Path(expand_home(&self.key_path)),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Deploy and configure run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,
    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout_secs: u64,
    #[serde(default = "default_inter_host_delay")]
    pub inter_host_delay_secs: u64,
    #[serde(default = "default_reachability_timeout")]
    pub reachability_timeout_secs: u64,
    #[serde(default = "default_reachability_interval")]
    pub reachability_interval_secs: u64,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_app_dir")]
    pub app_dir: String,
    #[serde(default = "default_repo_url")]
    pub repo_url: String,
    #[serde(default = "default_compose_command")]
    pub compose_command: String,
    #[serde(default = "default_startup_pause")]
    pub startup_pause_secs: u64,
    /// Hosts run at once by `simple`/`blue_green` and configure runs
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            health_check_path: default_health_check_path(),
            health_check_timeout_secs: default_health_check_timeout(),
            inter_host_delay_secs: default_inter_host_delay(),
            reachability_timeout_secs: default_reachability_timeout(),
            reachability_interval_secs: default_reachability_interval(),
            command_timeout_secs: default_command_timeout(),
            app_dir: default_app_dir(),
            repo_url: default_repo_url(),
            compose_command: default_compose_command(),
            startup_pause_secs: default_startup_pause(),
            max_parallel: default_max_parallel(),
        }
    }
}

/// HTTP health probing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_port")]
    pub port: u16,
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_health_attempt_timeout")]
    pub attempt_timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            port: default_health_port(),
            interval_secs: default_health_interval(),
            attempt_timeout_secs: default_health_attempt_timeout(),
        }
    }
}

/// One host of the static inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEntry {
    pub id: String,
    /// Hostname or IP; hosts without one never resolve
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub server_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerTypeConfig {
    /// Hosts handed out when `--count` is not given
    #[serde(default = "default_server_count")]
    pub count: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ssh_user() -> String {
    "ubuntu".to_string()
}

fn default_key_path() -> String {
    "~/.ssh/id_rsa".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_ssh_port() -> u16 {
    22
}

fn default_health_check_path() -> String {
    "/health".to_string()
}

fn default_health_check_timeout() -> u64 {
    10
}

fn default_inter_host_delay() -> u64 {
    30
}

fn default_reachability_timeout() -> u64 {
    300
}

fn default_reachability_interval() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    60
}

fn default_app_dir() -> String {
    "/opt/apps".to_string()
}

fn default_repo_url() -> String {
    "https://github.com/your-org/your-app.git".to_string()
}

fn default_compose_command() -> String {
    "docker-compose".to_string()
}

fn default_startup_pause() -> u64 {
    10
}

fn default_max_parallel() -> usize {
    1
}

fn default_health_port() -> u16 {
    80
}

fn default_health_interval() -> u64 {
    5
}

fn default_health_attempt_timeout() -> u64 {
    5
}

fn default_server_count() -> usize {
    1
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or fails validation
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("cannot read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .wrap_err_with(|| format!("cannot parse config file {}", path.display()))?;
        config.validate()?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Load from an explicit path, or from default paths, or use defaults
    ///
    /// Runs before logging is set up, so callers report `source` themselves.
    ///
    /// # Errors
    /// Returns error if a config file exists but cannot be loaded
    pub fn load_default(explicit: Option<&Path>) -> eyre::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(path) = std::env::var("FLEETWARD_CONFIG") {
            return Self::load(&PathBuf::from(path));
        }

        let mut paths = vec![
            PathBuf::from("fleetward.toml"),
            PathBuf::from("/etc/fleetward/fleetward.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("fleetward/fleetward.toml"));
        }

        for path in paths {
            if path.exists() {
                return Self::load(&path);
            }
        }

        Ok(Config::default())
    }

    /// Reject configs that would break a run halfway
    ///
    /// # Errors
    /// Returns error on duplicate host ids, unknown server types or zero
    /// timeouts
    pub fn validate(&self) -> eyre::Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.host {
            if !seen.insert(entry.id.as_str()) {
                eyre::bail!("duplicate host id in inventory: {}", entry.id);
            }
            if let Some(server_type) = &entry.server_type
                && !self.server_types.contains_key(server_type)
            {
                eyre::bail!(
                    "host {} has undeclared server type {server_type}",
                    entry.id
                );
            }
        }

        let deployment = &self.deployment;
        let timeouts = [
            ("deployment.health_check_timeout_secs", deployment.health_check_timeout_secs),
            ("deployment.reachability_timeout_secs", deployment.reachability_timeout_secs),
            ("deployment.command_timeout_secs", deployment.command_timeout_secs),
            ("ssh.connect_timeout_secs", self.ssh.connect_timeout_secs),
            ("health.attempt_timeout_secs", self.health.attempt_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            eyre::bail!("{name} must be positive");
        }
        if self.health.interval_secs == 0 || deployment.reachability_interval_secs == 0 {
            eyre::bail!("poll intervals must be positive");
        }
        Ok(())
    }

    /// Freeze the deployment section into run settings
    pub fn deploy_settings(&self) -> DeploySettings {
        let d = &self.deployment;
        DeploySettings {
            strategy: d.strategy,
            health_check_path: d.health_check_path.clone(),
            health_check_timeout: Duration::from_secs(d.health_check_timeout_secs),
            inter_host_delay: Duration::from_secs(d.inter_host_delay_secs),
            reachability_timeout: Duration::from_secs(d.reachability_timeout_secs),
            reachability_interval: Duration::from_secs(d.reachability_interval_secs),
            command_timeout: Duration::from_secs(d.command_timeout_secs),
            app_dir: d.app_dir.clone(),
            repo_url: d.repo_url.clone(),
            compose_command: d.compose_command.clone(),
            startup_pause: Duration::from_secs(d.startup_pause_secs),
            max_parallel: d.max_parallel.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
log_level = "debug"

[ssh]
user = "deploy"
key_env = "FLEETWARD_SSH_KEY"

[deployment]
strategy = "blue-green"
inter_host_delay_secs = 5
max_parallel = 3

[health]
port = 8080

[[host]]
id = "web-1"
address = "10.0.0.11"
server_type = "web_servers"

[[host]]
id = "web-2"
server_type = "web_servers"

[server_types.web_servers]
count = 2
"#;

    #[test]
    fn test_parse_sample() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.ssh.user, "deploy");
        assert!(matches!(config.ssh.key_source(), KeySource::Env(var) if var == "FLEETWARD_SSH_KEY"));
        assert_eq!(config.health.port, 8080);
        assert_eq!(config.health.interval_secs, 5);
        assert_eq!(config.host.len(), 2);
        assert_eq!(config.host[0].port, 22);
        assert!(config.host[1].address.is_none());
        assert_eq!(config.server_types["web_servers"].count, 2);

        let settings = config.deploy_settings();
        assert_eq!(settings.strategy, Strategy::BlueGreen);
        assert_eq!(settings.inter_host_delay, Duration::from_secs(5));
        assert_eq!(settings.health_check_timeout, Duration::from_secs(10));
        assert_eq!(settings.max_parallel, 3);
    }

    #[test]
    fn test_defaults_match_deploy_settings() {
        let config = Config::default();
        let settings = config.deploy_settings();
        let defaults = DeploySettings::default();

        assert_eq!(settings.strategy, defaults.strategy);
        assert_eq!(settings.reachability_timeout, defaults.reachability_timeout);
        assert_eq!(settings.command_timeout, defaults.command_timeout);
        assert_eq!(settings.app_dir, defaults.app_dir);
        assert_eq!(config.ssh.user, "ubuntu");
    }

    #[test]
    fn test_rejects_duplicate_hosts() {
        let config: Config = toml::from_str(
            r#"
[[host]]
id = "web-1"

[[host]]
id = "web-1"
"#,
        )
        .unwrap();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_remembers_source() {
        let path = std::env::temp_dir().join(format!("fleetward-config-{}.toml", std::process::id()));
        std::fs::write(&path, SAMPLE).unwrap();

        let config = Config::load(&path).unwrap();

        assert_eq!(config.source.as_deref(), Some(path.as_path()));
        assert!(Config::default().source.is_none());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        for section in [
            "[deployment]\ncommand_timeout_secs = 0\n",
            "[ssh]\nconnect_timeout_secs = 0\n",
            "[health]\nattempt_timeout_secs = 0\n",
        ] {
            let config: Config = toml::from_str(section).unwrap();
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("must be positive"), "{section}");
        }
    }

    #[test]
    fn test_rejects_unknown_strategy() {
        let parsed = toml::from_str::<Config>("[deployment]\nstrategy = \"canary\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_key_path_expands_home() {
        let ssh = SshConfig::default();
        match ssh.key_source() {
            KeySource::Path(path) => assert!(path.ends_with(".ssh/id_rsa")),
            KeySource::Env(_) => panic!("expected a key path"),
        }
    }
}
