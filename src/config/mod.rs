//! Configuration module for Sshtun
//!
//! This module provides configuration types and parsing for the tunnel.

mod forward;
mod profile;
mod proxy;
mod ssh;

pub use forward::{ForwardDirection, ForwardSpec};
pub use profile::{ConnectionState, Profile, TunnelConfig};
pub use proxy::ProxyConfig;
pub use ssh::{SshSettings, TcpConfig};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Profile selection and feature flags
    #[serde(default)]
    pub tunnel: TunnelConfig,

    /// Stored SSH profiles
    #[serde(default, rename = "profile")]
    pub profiles: Vec<Profile>,

    /// Local proxy configuration
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// SSH client configuration
    #[serde(default)]
    pub ssh: SshSettings,
}

impl Config {
    /// Look up a profile by id
    pub fn profile(&self, id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    /// The profile named by `tunnel.selected_profile_id`
    pub fn selected_profile(&self) -> Option<&Profile> {
        self.profile(&self.tunnel.selected_profile_id)
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for profile in &self.profiles {
            profile.validate().map_err(anyhow::Error::msg)?;
            if !seen.insert(profile.id.as_str()) {
                bail!("duplicate profile id '{}'", profile.id);
            }
        }

        if !self.tunnel.selected_profile_id.is_empty() && self.selected_profile().is_none() {
            bail!(
                "selected profile '{}' does not exist",
                self.tunnel.selected_profile_id
            );
        }

        self.proxy
            .validate()
            .map_err(anyhow::Error::msg)
            .context("invalid [proxy] section")?;
        self.ssh
            .validate()
            .map_err(anyhow::Error::msg)
            .context("invalid [ssh] section")?;
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config =
        toml::from_str(content).with_context(|| "Failed to parse configuration")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config_str = r#"
[tunnel]
selected_profile_id = "home"

[[profile]]
id = "home"
server = "ssh.example.com"
username = "alice"
password = "secret"
"#;

        let config = parse_config(config_str).unwrap();
        let profile = config.selected_profile().unwrap();
        assert_eq!(profile.server, "ssh.example.com");
        assert_eq!(profile.port, 22);
        assert_eq!(config.proxy.port, 1080);
        assert_eq!(config.ssh.retry_delay, 5);
    }

    #[test]
    fn test_parse_full_config() {
        let config_str = r#"
[tunnel]
selected_profile_id = "work"
slow_dns = true
use_pyload_ssl = true

[[profile]]
id = "home"
profile_name = "Home box"
server = "home.example.com"
port = 2222
username = "alice"
password = "one"

[[profile]]
id = "work"
server = "10.0.0.5"
username = "bob"
password = "two"

[proxy]
bind_addr = "0.0.0.0"
port = 9050
idle_timeout = 120
forwards = ["L7000=mail:143", "R8080=localhost:80"]

[ssh]
max_connect_attempts = 0
channel_open_timeout = 5

[ssh.tcp]
nodelay = false
keepalive_secs = 30
"#;

        let config = parse_config(config_str).unwrap();
        assert_eq!(config.profiles.len(), 2);
        assert_eq!(config.selected_profile().unwrap().username, "bob");
        assert!(config.tunnel.slow_dns);
        assert!(config.tunnel.use_payload_ssl);
        assert_eq!(config.proxy.listen_addr(), "0.0.0.0:9050");
        assert_eq!(config.proxy.forwards.len(), 2);
        assert_eq!(config.ssh.attempt_limit(), None);
        assert!(!config.ssh.tcp.nodelay);
        assert_eq!(config.ssh.tcp.keepalive_interval, 10);
    }

    #[test]
    fn test_duplicate_profile_ids_rejected() {
        let config_str = r#"
[[profile]]
id = "a"
server = "one"
username = "u"

[[profile]]
id = "a"
server = "two"
username = "u"
"#;
        let err = parse_config(config_str).unwrap_err();
        assert!(err.to_string().contains("duplicate profile id"));
    }

    #[test]
    fn test_missing_selected_profile_rejected() {
        let config_str = r#"
[tunnel]
selected_profile_id = "ghost"
"#;
        let err = parse_config(config_str).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_bad_forward_rejected() {
        let config_str = r#"
[proxy]
forwards = ["L7000mail:143"]
"#;
        assert!(parse_config(config_str).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sshtun.toml");
        std::fs::write(
            &path,
            "[[profile]]\nid = \"p\"\nserver = \"h\"\nusername = \"u\"\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert!(config.profile("p").is_some());

        let err = load_config(dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
