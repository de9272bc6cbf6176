//! Local listeners
//!
//! The SOCKS5 listener and the static local forwards share one connection
//! table, one idle sweep and one channel opener. [`start_proxy`] binds all
//! of them up front and returns a [`ProxyHandle`] that tears them down.

mod forward;
mod server;
mod table;

pub use forward::LocalForward;
pub use server::Socks5Server;
pub use table::{ConnectionGuard, ConnectionTable};

use crate::config::{ForwardDirection, ProxyConfig};
use crate::error::TunnelError;
use crate::log_sink::LogSink;
use crate::relay::{relay, RelayConfig, RelayOutcome};
use crate::ssh::DirectChannelOpener;
use crate::stats::TunnelStats;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// State shared by every listener and worker of one proxy
pub struct ProxyShared<O> {
    /// Channel source
    pub opener: Arc<O>,
    /// Open connections
    pub table: Arc<ConnectionTable>,
    /// Counters
    pub stats: Arc<TunnelStats>,
    /// User-facing log
    pub log: Arc<LogSink>,
    /// Relay tunables
    pub relay: RelayConfig,
}

impl<O: DirectChannelOpener> ProxyShared<O> {
    /// Create shared state from the proxy configuration
    pub fn new(
        config: &ProxyConfig,
        opener: Arc<O>,
        stats: Arc<TunnelStats>,
        log: Arc<LogSink>,
    ) -> Self {
        ProxyShared {
            opener,
            table: Arc::new(ConnectionTable::new()),
            stats,
            log,
            relay: RelayConfig {
                buffer_size: config.buffer_size,
                client_read_timeout: config.read_timeout(),
            },
        }
    }

    /// Pipe an accepted client through an opened channel
    pub(crate) async fn pipe<C, S>(&self, client: C, channel: S, guard: &ConnectionGuard) -> RelayOutcome
    where
        C: AsyncRead + AsyncWrite + Unpin,
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let outcome = relay(
            client,
            channel,
            &self.relay,
            &self.stats.bytes_relayed,
            || guard.touch(),
            guard.token(),
        )
        .await;

        if outcome.reason.is_error() {
            // Resets and broken pipes are routine for proxied traffic.
            debug!(peer = %guard.peer(), reason = ?outcome.reason, "Relay ended with I/O error");
        }
        outcome
    }
}

/// Periodically evict idle connections until `cancel` fires
async fn sweep_loop<O>(
    shared: Arc<ProxyShared<O>>,
    period: Duration,
    max_idle: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = shared.table.sweep_idle(Instant::now(), max_idle);
                if !evicted.is_empty() {
                    shared.stats.record_evicted(evicted.len());
                    shared.log.info(format!(
                        "Closed {} inactive connection(s)",
                        evicted.len()
                    ));
                    debug!(?evicted, "Idle connections evicted");
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

/// Running listeners of one tunnel
pub struct ProxyHandle {
    cancel: CancellationToken,
    table: Arc<ConnectionTable>,
    tasks: Vec<JoinHandle<()>>,
    local_addr: SocketAddr,
    forward_addrs: Vec<SocketAddr>,
}

impl ProxyHandle {
    /// Address the SOCKS5 listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Addresses of the local forward listeners
    pub fn forward_addrs(&self) -> &[SocketAddr] {
        &self.forward_addrs
    }

    /// Connections currently tracked
    pub fn active_connections(&self) -> usize {
        self.table.len()
    }

    /// Close every listener, cancel every connection and wait for the
    /// accept and sweep tasks to finish
    pub async fn stop(self) {
        self.cancel.cancel();
        let cancelled = self.table.cancel_all();
        futures::future::join_all(self.tasks).await;
        info!(addr = %self.local_addr, cancelled, "Proxy stopped");
    }
}

/// Bind the SOCKS5 listener and every local forward, then start serving
///
/// `config` is validated first. Nothing is spawned unless every listener
/// binds.
pub async fn start_proxy<O: DirectChannelOpener>(
    config: &ProxyConfig,
    opener: Arc<O>,
    stats: Arc<TunnelStats>,
    log: Arc<LogSink>,
    parent: &CancellationToken,
) -> Result<ProxyHandle, TunnelError> {
    config
        .validate()
        .map_err(|e| TunnelError::Config(format!("invalid proxy configuration: {}", e)))?;

    let shared = Arc::new(ProxyShared::new(config, opener, stats, log.clone()));
    let cancel = parent.child_token();

    let server = Socks5Server::bind(&config.listen_addr(), shared.clone()).await?;
    let local_addr = server.local_addr()?;

    let mut forwards = Vec::new();
    for spec in &config.forwards {
        match spec.direction {
            ForwardDirection::Local => {
                forwards.push(LocalForward::bind(&config.bind_addr, spec, shared.clone()).await?);
            }
            ForwardDirection::Remote => {
                log.warn(format!("Remote forward {} is not supported, skipping", spec));
            }
        }
    }
    let forward_addrs = forwards
        .iter()
        .map(LocalForward::local_addr)
        .collect::<Result<Vec<_>, _>>()?;

    log.info(format!("SOCKS5 proxy running on {}", local_addr));
    for (forward, addr) in forwards.iter().zip(&forward_addrs) {
        log.info(format!("Forwarding {} to {}", addr, forward.target()));
    }

    let mut tasks = Vec::with_capacity(forwards.len() + 2);
    tasks.push(tokio::spawn(server.run(cancel.clone())));
    for forward in forwards {
        tasks.push(tokio::spawn(forward.run(cancel.clone())));
    }
    tasks.push(tokio::spawn(sweep_loop(
        shared.clone(),
        config.cleanup_interval(),
        config.idle_timeout(),
        cancel.clone(),
    )));

    Ok(ProxyHandle {
        cancel,
        table: shared.table.clone(),
        tasks,
        local_addr,
        forward_addrs,
    })
}
