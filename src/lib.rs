//! # Sshtun - SOCKS5 over a single SSH session
//!
//! Sshtun runs a local SOCKS5 proxy and carries every proxied connection
//! through one authenticated SSH session, opening a direct-tcpip channel per
//! CONNECT request.
//!
//! ## Features
//!
//! - **One Session**: all traffic shares a single password-authenticated SSH session
//! - **SOCKS5 CONNECT**: IPv4, IPv6 and domain targets, no-auth method only
//! - **Reconnect**: connect attempts are retried on a fixed delay
//! - **Idle Eviction**: connections without traffic are closed by a periodic sweep
//! - **Local Forwards**: optional `L<port>=host:port` listeners over the same session
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sshtun::config::load_config;
//! use sshtun::TunnelManager;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("sshtun.toml")?;
//!     let manager = TunnelManager::from_config(&config);
//!     let profile = config.selected_profile().unwrap();
//!
//!     if manager.start_tunnel(profile, &config.tunnel).await {
//!         tokio::signal::ctrl_c().await?;
//!         manager.stop_tunnel().await;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SOCKS5 Client -> Sshtun (127.0.0.1:1080) -> SSH server -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod helper;
pub mod log_sink;
pub mod proxy;
pub mod relay;
pub mod socks;
pub mod ssh;
pub mod stats;
pub mod transport;
pub mod tunnel;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{ProtocolError, TunnelError};
pub use log_sink::{LogLevel, LogSink};
pub use tunnel::TunnelManager;

/// Version of the Sshtun library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "sshtun");
    }
}
