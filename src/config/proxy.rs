//! Local proxy configuration
//!
//! Defines the SOCKS5 listener, connection housekeeping and local forwards.

use super::ForwardSpec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default bind address
fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

/// Default SOCKS5 port
fn default_port() -> u16 {
    1080
}

/// Default idle eviction threshold in seconds
fn default_idle_timeout() -> u64 {
    300
}

/// Default idle sweep interval in seconds
fn default_cleanup_interval() -> u64 {
    60
}

/// Default client read timeout in seconds
fn default_read_timeout() -> u64 {
    30
}

/// Default relay buffer size in bytes
fn default_buffer_size() -> usize {
    32 * 1024
}

/// Local proxy configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Address the SOCKS5 listener binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// SOCKS5 listener port (0 picks a free port)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Connections idle longer than this are evicted, in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,

    /// How often the idle sweep runs, in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,

    /// Client read timeout while relaying, in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,

    /// Relay buffer size per direction
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Static port forwards carried by the same session
    #[serde(default)]
    pub forwards: Vec<ForwardSpec>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            bind_addr: default_bind_addr(),
            port: default_port(),
            idle_timeout: default_idle_timeout(),
            cleanup_interval: default_cleanup_interval(),
            read_timeout: default_read_timeout(),
            buffer_size: default_buffer_size(),
            forwards: Vec::new(),
        }
    }
}

impl ProxyConfig {
    /// `bind_addr:port` of the SOCKS5 listener
    pub fn listen_addr(&self) -> String {
        if self.bind_addr.contains(':') && !self.bind_addr.starts_with('[') {
            format!("[{}]:{}", self.bind_addr, self.port)
        } else {
            format!("{}:{}", self.bind_addr, self.port)
        }
    }

    /// Idle eviction threshold
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    /// Idle sweep period
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval)
    }

    /// Client read timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    /// Validate the proxy configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.bind_addr.is_empty() {
            return Err("bind_addr must not be empty".to_string());
        }
        if self.idle_timeout == 0 {
            return Err("idle_timeout must be greater than 0".to_string());
        }
        if self.cleanup_interval == 0 {
            return Err("cleanup_interval must be greater than 0".to_string());
        }
        if self.read_timeout == 0 {
            return Err("read_timeout must be greater than 0".to_string());
        }
        if self.buffer_size == 0 {
            return Err("buffer_size must be greater than 0".to_string());
        }
        for forward in &self.forwards {
            if self.port != 0 && forward.local_port == self.port {
                return Err(format!(
                    "forward {} uses the SOCKS5 port {}",
                    forward, self.port
                ));
            }
        }
        Ok(())
    }
}
