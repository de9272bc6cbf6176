//! Profile and tunnel flag types
//!
//! A [`Profile`] names an SSH account; [`TunnelConfig`] selects one and
//! carries the feature flags chosen by the front end.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An SSH server account
///
/// Profiles are immutable once built. They are identified by `id`, which
/// must be unique among the profiles of one configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Opaque identifier
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub profile_name: String,

    /// SSH server host name or address
    pub server: String,

    /// SSH server port
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Login user
    pub username: String,

    /// Login password
    #[serde(default)]
    pub password: String,
}

fn default_ssh_port() -> u16 {
    22
}

impl Profile {
    /// Create a profile
    pub fn new(
        id: impl Into<String>,
        profile_name: impl Into<String>,
        server: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Profile {
            id: id.into(),
            profile_name: profile_name.into(),
            server: server.into(),
            port,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Validate the profile
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("profile id must not be empty".to_string());
        }
        if self.server.is_empty() {
            return Err(format!("profile '{}' has no server", self.id));
        }
        if self.port == 0 {
            return Err(format!("profile '{}' port must be in 1-65535", self.id));
        }
        if self.username.is_empty() {
            return Err(format!("profile '{}' has no username", self.id));
        }
        Ok(())
    }

    /// `host:port` of the SSH server, bracketing IPv6 literals
    pub fn server_addr(&self) -> String {
        if self.server.contains(':') && !self.server.starts_with('[') {
            format!("[{}]:{}", self.server, self.port)
        } else {
            format!("{}:{}", self.server, self.port)
        }
    }
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("id", &self.id)
            .field("profile_name", &self.profile_name)
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Lifecycle of a tunnel as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No tunnel running
    #[default]
    Disconnected,
    /// Session being established
    Connecting,
    /// Session up and proxy listening
    Connected,
    /// Last start attempt failed
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Tunnel selection and feature flags
///
/// The overlay flags are accepted and reported but do not change how
/// traffic is carried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Id of the profile to connect with
    #[serde(default)]
    pub selected_profile_id: String,

    /// Payload/SSL overlay requested
    #[serde(default, alias = "use_pyload_ssl")]
    pub use_payload_ssl: bool,

    /// SlowDNS overlay requested
    #[serde(default)]
    pub slow_dns: bool,

    /// V2Ray overlay requested
    #[serde(default)]
    pub v2ray: bool,

    /// Last known state, kept for front ends that persist this struct
    #[serde(default)]
    pub connection_state: ConnectionState,
}

impl TunnelConfig {
    /// Names of the overlay flags that are switched on
    pub fn enabled_overlays(&self) -> Vec<&'static str> {
        let mut overlays = Vec::new();
        if self.use_payload_ssl {
            overlays.push("Payload SSL");
        }
        if self.slow_dns {
            overlays.push("SlowDNS");
        }
        if self.v2ray {
            overlays.push("V2Ray");
        }
        overlays
    }
}
