//! TCP connector
//!
//! Opens the raw TCP connection the SSH session runs over.

use super::SocketOpts;
use crate::error::TunnelError;
use std::time::Duration;
use tokio::net::TcpStream;

/// Connects to the SSH server with a deadline and socket options
#[derive(Debug, Clone)]
pub struct TcpConnector {
    /// Socket options to apply to connections
    socket_opts: SocketOpts,
    /// Connection timeout
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Create a connector
    pub fn new(socket_opts: SocketOpts, connect_timeout: Duration) -> Self {
        TcpConnector {
            socket_opts,
            connect_timeout,
        }
    }

    /// Connection timeout
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Resolve and connect to `addr` (`host:port`)
    pub async fn connect(&self, addr: &str) -> Result<TcpStream, TunnelError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TunnelError::Timeout(format!("connecting to {}", addr)))?
            .map_err(|e| TunnelError::Connection(format!("failed to connect to {}: {}", addr, e)))?;

        if let Err(e) = self.socket_opts.apply(&stream) {
            tracing::warn!("Failed to apply socket options: {}", e);
        }

        tracing::debug!(peer = ?stream.peer_addr().ok(), "TCP connection established to {}", addr);

        Ok(stream)
    }
}
