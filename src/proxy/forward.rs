//! Static local forwards
//!
//! Each `L<port>=host:port` spec gets its own listener; every accepted
//! connection is piped to a direct channel for the fixed target.

use super::{ConnectionGuard, ProxyShared};
use crate::config::ForwardSpec;
use crate::error::TunnelError;
use crate::ssh::DirectChannelOpener;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A bound local forward listener
pub struct LocalForward<O> {
    listener: TcpListener,
    remote_host: String,
    remote_port: u16,
    shared: Arc<ProxyShared<O>>,
}

impl<O: DirectChannelOpener> LocalForward<O> {
    /// Bind `bind_addr:<local_port>` for `spec`
    pub async fn bind(
        bind_addr: &str,
        spec: &ForwardSpec,
        shared: Arc<ProxyShared<O>>,
    ) -> Result<Self, TunnelError> {
        let addr = if bind_addr.contains(':') {
            format!("[{}]:{}", bind_addr.trim_matches(|c| c == '[' || c == ']'), spec.local_port)
        } else {
            format!("{}:{}", bind_addr, spec.local_port)
        };
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| io::Error::new(e.kind(), format!("cannot listen on {} for {}: {}", addr, spec, e)))?;

        Ok(LocalForward {
            listener,
            remote_host: spec.remote_host.clone(),
            remote_port: spec.remote_port,
            shared,
        })
    }

    /// Bound address
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// `host:port` every connection is forwarded to
    pub fn target(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_port)
    }

    /// Accept clients until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        let LocalForward {
            listener,
            remote_host,
            remote_port,
            shared,
        } = self;
        let remote_host: Arc<str> = remote_host.into();

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = cancel.cancelled() => break,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let guard = shared.table.register(peer, &cancel);
                    shared.stats.record_accepted();
                    let shared = shared.clone();
                    let remote_host = remote_host.clone();
                    tokio::spawn(async move {
                        if let Err(e) = forward_client(stream, &guard, &shared, &remote_host, remote_port).await {
                            shared.log.warn(format!(
                                "Forward {}:{} for {} failed: {}",
                                remote_host,
                                remote_port,
                                guard.peer(),
                                e
                            ));
                        }
                        drop(guard);
                        shared.stats.record_closed();
                    });
                }
                Err(e) => {
                    shared
                        .log
                        .warn(format!("Error accepting forwarded connection: {}", e));
                }
            }
        }

        debug!(dest = %format!("{}:{}", remote_host, remote_port), "Forward accept loop stopped");
    }
}

async fn forward_client<O: DirectChannelOpener>(
    stream: TcpStream,
    guard: &ConnectionGuard,
    shared: &ProxyShared<O>,
    host: &str,
    port: u16,
) -> Result<(), TunnelError> {
    let opened = tokio::select! {
        opened = shared.opener.open_direct_channel(host, port, guard.peer()) => opened,
        _ = guard.token().cancelled() => return Ok(()),
    };
    let channel = opened.inspect_err(|_| shared.stats.record_channel_failure())?;

    let outcome = shared.pipe(stream, channel, guard).await;
    debug!(
        peer = %guard.peer(),
        up = outcome.client_to_channel,
        down = outcome.channel_to_client,
        reason = ?outcome.reason,
        "Forwarded connection closed"
    );
    Ok(())
}
