//! SSH side of the tunnel
//!
//! The [`SshSessionManager`] owns the single client session; everything
//! that needs a direct-tcpip channel goes through [`DirectChannelOpener`].

mod handler;
mod session;

pub use handler::ClientHandler;
pub use session::{SessionState, SshSessionManager};

use crate::error::TunnelError;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};

/// Something that can open a byte stream to `host:port` on the far side
#[async_trait]
pub trait DirectChannelOpener: Send + Sync + 'static {
    /// The stream produced for each channel
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a channel to `host:port` on behalf of `originator`
    async fn open_direct_channel(
        &self,
        host: &str,
        port: u16,
        originator: SocketAddr,
    ) -> Result<Self::Stream, TunnelError>;
}
