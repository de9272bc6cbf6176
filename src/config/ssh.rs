//! SSH client configuration
//!
//! Timeouts, keepalive and retry policy for the upstream session.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default connect timeout (TCP + SSH handshake) in seconds
fn default_connect_timeout() -> u64 {
    30
}

/// Default server-alive probe interval in seconds
fn default_keepalive_interval() -> u64 {
    60
}

/// Default number of unanswered probes before the session is dropped
fn default_keepalive_max() -> usize {
    3
}

/// Default delay between connect attempts in seconds
fn default_retry_delay() -> u64 {
    5
}

/// Default connect attempt cap
fn default_max_connect_attempts() -> u32 {
    5
}

/// Default direct channel open timeout in seconds
fn default_channel_open_timeout() -> u64 {
    10
}

/// Default TCP keepalive idle time in seconds
fn default_tcp_keepalive_secs() -> u64 {
    60
}

/// Default TCP keepalive probe interval in seconds
fn default_tcp_keepalive_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

/// TCP options for the connection to the SSH server
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    /// Enable TCP_NODELAY
    #[serde(default = "default_true")]
    pub nodelay: bool,

    /// TCP keepalive timeout in seconds
    #[serde(default = "default_tcp_keepalive_secs")]
    pub keepalive_secs: u64,

    /// TCP keepalive interval in seconds
    #[serde(default = "default_tcp_keepalive_interval")]
    pub keepalive_interval: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            nodelay: true,
            keepalive_secs: default_tcp_keepalive_secs(),
            keepalive_interval: default_tcp_keepalive_interval(),
        }
    }
}

/// SSH client configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SshSettings {
    /// Bound on TCP connect plus SSH handshake, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// SSH keepalive probe interval, in seconds
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,

    /// Unanswered probes tolerated before the session is closed
    #[serde(default = "default_keepalive_max")]
    pub keepalive_max: usize,

    /// Fixed delay between connect attempts, in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Connect attempts before giving up; 0 retries forever
    #[serde(default = "default_max_connect_attempts")]
    pub max_connect_attempts: u32,

    /// Bound on opening one direct-tcpip channel, in seconds
    #[serde(default = "default_channel_open_timeout")]
    pub channel_open_timeout: u64,

    /// TCP socket options
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl Default for SshSettings {
    fn default() -> Self {
        SshSettings {
            connect_timeout: default_connect_timeout(),
            keepalive_interval: default_keepalive_interval(),
            keepalive_max: default_keepalive_max(),
            retry_delay: default_retry_delay(),
            max_connect_attempts: default_max_connect_attempts(),
            channel_open_timeout: default_channel_open_timeout(),
            tcp: TcpConfig::default(),
        }
    }
}

impl SshSettings {
    /// Connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Keepalive probe interval
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval)
    }

    /// Delay between connect attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    /// Channel open timeout
    pub fn channel_open_timeout(&self) -> Duration {
        Duration::from_secs(self.channel_open_timeout)
    }

    /// Attempt cap, `None` when retrying forever
    pub fn attempt_limit(&self) -> Option<u32> {
        match self.max_connect_attempts {
            0 => None,
            n => Some(n),
        }
    }

    /// Validate the SSH configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout == 0 {
            return Err("connect_timeout must be greater than 0".to_string());
        }
        if self.channel_open_timeout == 0 {
            return Err("channel_open_timeout must be greater than 0".to_string());
        }
        if self.keepalive_interval > 0 && self.keepalive_max == 0 {
            return Err("keepalive_max must be greater than 0 when keepalive is on".to_string());
        }
        Ok(())
    }
}
