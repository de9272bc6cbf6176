//! SOCKS5 listener
//!
//! Accepts local clients and runs each one through handshake, request
//! parsing, channel open and relay in its own task.

use super::{ConnectionGuard, ProxyShared};
use crate::error::{ProtocolError, Socks5ReplyCode, TunnelError};
use crate::socks::{negotiate, parse_connect, send_failure, send_success, ConnectRequest};
use crate::ssh::DirectChannelOpener;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// SOCKS5 server owning its listening socket
pub struct Socks5Server<O> {
    listener: TcpListener,
    shared: Arc<ProxyShared<O>>,
}

impl<O: DirectChannelOpener> Socks5Server<O> {
    /// Bind the listening socket
    pub async fn bind(addr: &str, shared: Arc<ProxyShared<O>>) -> Result<Self, TunnelError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| io::Error::new(e.kind(), format!("cannot listen on {}: {}", addr, e)))?;
        Ok(Socks5Server { listener, shared })
    }

    /// Bound address
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients until `cancel` fires; the listener is closed on return
    pub async fn run(self, cancel: CancellationToken) {
        let Socks5Server { listener, shared } = self;

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = cancel.cancelled() => break,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "Accepted SOCKS5 client");
                    let guard = shared.table.register(peer, &cancel);
                    shared.stats.record_accepted();
                    let shared = shared.clone();
                    tokio::spawn(async move {
                        handle_client(stream, guard, &shared).await;
                        shared.stats.record_closed();
                    });
                }
                Err(e) => {
                    shared
                        .log
                        .warn(format!("Error accepting connection: {}", e));
                }
            }
        }

        debug!("SOCKS5 accept loop stopped");
    }
}

/// Per-client worker; never propagates errors
async fn handle_client<O: DirectChannelOpener>(
    stream: TcpStream,
    guard: ConnectionGuard,
    shared: &ProxyShared<O>,
) {
    let peer = guard.peer();

    match serve_client(stream, &guard, shared).await {
        Ok(()) => {}
        Err(TunnelError::Protocol(e)) => {
            shared.stats.record_failed_handshake();
            shared.log.warn(format!("SOCKS5 handshake with {} failed: {}", peer, e));
        }
        Err(e) => {
            shared.log.warn(format!("Connection from {} failed: {}", peer, e));
        }
    }
}

async fn serve_client<O: DirectChannelOpener>(
    mut stream: TcpStream,
    guard: &ConnectionGuard,
    shared: &ProxyShared<O>,
) -> Result<(), TunnelError> {
    let peer = guard.peer();
    let token = guard.token();

    let request = tokio::select! {
        request = tokio::time::timeout(shared.relay.client_read_timeout, read_request(&mut stream)) => {
            request.map_err(|_| {
                ProtocolError::Io(io::Error::new(io::ErrorKind::TimedOut, "client sent no request"))
            })??
        }
        _ = token.cancelled() => return Ok(()),
    };

    guard.touch();
    debug!(%peer, dest = %request, "SOCKS5 CONNECT");

    let opened = tokio::select! {
        opened = shared.opener.open_direct_channel(&request.host, request.port, peer) => opened,
        _ = token.cancelled() => return Ok(()),
    };

    let channel = match opened {
        Ok(channel) => channel,
        Err(e) => {
            shared.stats.record_channel_failure();
            // The client may already be gone.
            let _ = send_failure(&mut stream, Socks5ReplyCode::from(&e)).await;
            return Err(e);
        }
    };

    send_success(&mut stream, &request.host, request.address_type, request.port).await?;
    info!(%peer, dest = %request, "Tunnel established");

    let outcome = shared.pipe(stream, channel, guard).await;
    debug!(
        %peer,
        dest = %request,
        up = outcome.client_to_channel,
        down = outcome.channel_to_client,
        reason = ?outcome.reason,
        "Connection closed"
    );
    Ok(())
}

async fn read_request(stream: &mut TcpStream) -> Result<ConnectRequest, ProtocolError> {
    negotiate(stream).await?;
    parse_connect(stream).await
}
