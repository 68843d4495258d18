//! Command specs for each host phase
//!
//! Every remote command runs in a fresh shell, so commands that depend on a
//! working directory change into it themselves.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::DeploySettings;

/// Phase a command batch belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Hardening,
    AppInstall,
    Compliance,
    Deploy,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Hardening => "hardening",
            Phase::AppInstall => "app_install",
            Phase::Compliance => "compliance",
            Phase::Deploy => "deploy",
        };
        f.write_str(name)
    }
}

/// Ordered shell commands for one phase, executed verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub phase: Phase,
    pub commands: Vec<String>,
}

impl CommandSpec {
    fn new<I, S>(phase: Phase, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            phase,
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Base OS hardening: packages, firewall, fail2ban, sshd, unattended upgrades
    #[must_use]
    pub fn hardening() -> Self {
        Self::new(
            Phase::Hardening,
            [
                "sudo apt-get update && sudo apt-get upgrade -y",
                "sudo apt-get install -y fail2ban ufw rkhunter",
                "sudo ufw default deny incoming",
                "sudo ufw default allow outgoing",
                "sudo ufw allow ssh",
                "sudo ufw allow 80/tcp",
                "sudo ufw allow 443/tcp",
                "sudo ufw --force enable",
                "sudo systemctl enable fail2ban",
                "sudo systemctl start fail2ban",
                "sudo sed -i 's/PermitRootLogin yes/PermitRootLogin no/' /etc/ssh/sshd_config",
                "sudo systemctl restart sshd",
                "sudo apt-get install -y unattended-upgrades",
                "sudo dpkg-reconfigure -plow unattended-upgrades",
            ],
        )
    }

    /// Container runtime, monitoring tools and application directories
    #[must_use]
    pub fn app_install(settings: &DeploySettings) -> Self {
        let app_dir = settings.app_dir.trim_end_matches('/');
        Self::new(
            Phase::AppInstall,
            [
                "curl -fsSL https://get.docker.com -o get-docker.sh".to_string(),
                "sudo sh get-docker.sh".to_string(),
                "sudo usermod -aG docker $USER".to_string(),
                "sudo curl -L \"https://github.com/docker/compose/releases/download/1.29.2/docker-compose-$(uname -s)-$(uname -m)\" -o /usr/local/bin/docker-compose".to_string(),
                "sudo chmod +x /usr/local/bin/docker-compose".to_string(),
                "sudo apt-get install -y htop iotop nethogs".to_string(),
                format!("sudo mkdir -p {app_dir} /opt/logs /opt/backups"),
                format!("sudo chown $USER:$USER {app_dir} /opt/logs /opt/backups"),
            ],
        )
    }

    /// Read-only audit commands; the host passes when all of them exit 0
    #[must_use]
    pub fn compliance() -> Self {
        Self::new(
            Phase::Compliance,
            [
                "sudo netstat -tuln",
                "sudo systemctl list-units --type=service --state=running",
                "cat /etc/passwd",
                "ls -la /etc/ssh/",
                "ls -la /etc/",
                "sudo rkhunter --check --skip-keypress",
            ],
        )
    }

    /// Enter app dir, clone or pull, checkout, stack down, pull, up, startup pause
    #[must_use]
    pub fn deploy(settings: &DeploySettings, app_version: &str) -> Self {
        let app_dir = settings.app_dir.trim_end_matches('/');
        let name = settings.app_name();
        let checkout = settings.checkout_dir();
        let compose = &settings.compose_command;

        Self::new(
            Phase::Deploy,
            [
                format!("mkdir -p {app_dir} && cd {app_dir}"),
                format!(
                    "cd {app_dir} && (git clone {repo} {name} || (cd {name} && git pull))",
                    repo = settings.repo_url
                ),
                format!("cd {checkout} && git checkout {app_version}"),
                format!("cd {checkout} && {compose} down"),
                format!("cd {checkout} && {compose} pull"),
                format!("cd {checkout} && {compose} up -d"),
                format!("sleep {}", settings.startup_pause.as_secs()),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_deploy_spec_order() {
        let settings = DeploySettings {
            compose_command: "docker compose".to_string(),
            startup_pause: Duration::from_secs(15),
            ..DeploySettings::default()
        };

        let spec = CommandSpec::deploy(&settings, "v1.4.2");

        assert_eq!(spec.phase, Phase::Deploy);
        assert_eq!(spec.len(), 7);
        assert_eq!(spec.commands[0], "mkdir -p /opt/apps && cd /opt/apps");
        assert!(spec.commands[1].contains("git clone https://github.com/your-org/your-app.git"));
        assert!(spec.commands[1].contains("git pull"));
        assert_eq!(
            spec.commands[2],
            "cd /opt/apps/your-app && git checkout v1.4.2"
        );
        assert!(spec.commands[3].ends_with("docker compose down"));
        assert!(spec.commands[4].ends_with("docker compose pull"));
        assert!(spec.commands[5].ends_with("docker compose up -d"));
        assert_eq!(spec.commands[6], "sleep 15");
    }

    #[test]
    fn test_configure_specs() {
        let settings = DeploySettings::default();

        assert_eq!(CommandSpec::hardening().phase, Phase::Hardening);
        assert_eq!(CommandSpec::hardening().len(), 14);
        assert!(
            CommandSpec::app_install(&settings)
                .commands
                .iter()
                .any(|c| c.contains("mkdir -p /opt/apps"))
        );
        assert_eq!(CommandSpec::compliance().len(), 6);
    }
}
