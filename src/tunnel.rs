//! Tunnel control surface
//!
//! [`TunnelManager`] owns at most one running tunnel: one SSH session plus
//! the local listeners that feed it. Front ends drive it with
//! [`TunnelManager::start_tunnel`] and [`TunnelManager::stop_tunnel`] and
//! observe it through the state watch and the log sink.

use crate::config::{Config, ConnectionState, Profile, ProxyConfig, SshSettings, TunnelConfig};
use crate::log_sink::LogSink;
use crate::proxy::{start_proxy, ProxyHandle};
use crate::ssh::SshSessionManager;
use crate::stats::{TunnelStats, TunnelStatsSnapshot};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How often a running tunnel checks that its session is still up
const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(5);

struct RunningTunnel {
    cancel: CancellationToken,
    session: Arc<SshSessionManager>,
    proxy: ProxyHandle,
    monitor: JoinHandle<()>,
}

impl RunningTunnel {
    async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.monitor.await;
        self.proxy.stop().await;
        self.session.disconnect().await;
    }
}

/// Starts, stops and reports on the tunnel
pub struct TunnelManager {
    proxy: ProxyConfig,
    ssh: SshSettings,
    log: Arc<LogSink>,
    state: Arc<watch::Sender<ConnectionState>>,
    running: Mutex<Option<RunningTunnel>>,
    /// Token of a start that has not finished yet
    pending: Mutex<Option<CancellationToken>>,
    starting: tokio::sync::Mutex<()>,
    stats: Mutex<Arc<TunnelStats>>,
}

impl TunnelManager {
    /// Create a manager with its own log sink
    pub fn new(proxy: ProxyConfig, ssh: SshSettings) -> Self {
        Self::with_log(proxy, ssh, Arc::new(LogSink::new()))
    }

    /// Create a manager writing to `log`
    pub fn with_log(proxy: ProxyConfig, ssh: SshSettings, log: Arc<LogSink>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        TunnelManager {
            proxy,
            ssh,
            log,
            state: Arc::new(state),
            running: Mutex::new(None),
            pending: Mutex::new(None),
            starting: tokio::sync::Mutex::new(()),
            stats: Mutex::new(Arc::new(TunnelStats::new())),
        }
    }

    /// Create a manager from the proxy and SSH sections of `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.proxy.clone(), config.ssh.clone())
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Tunnel state changed");
        }
    }

    /// Counters of the current or last tunnel
    pub fn stats(&self) -> TunnelStatsSnapshot {
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot()
    }

    /// Address of the SOCKS5 listener while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|running| running.proxy.local_addr())
    }

    /// Addresses of the local forward listeners while running
    pub fn forward_addrs(&self) -> Vec<SocketAddr> {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|running| running.proxy.forward_addrs().to_vec())
            .unwrap_or_default()
    }

    /// Shared event log
    pub fn log_sink(&self) -> &Arc<LogSink> {
        &self.log
    }

    /// Rendered event log
    pub fn logs(&self) -> Vec<String> {
        self.log.logs()
    }

    /// Connect to `profile` and start the local listeners
    ///
    /// A running tunnel is stopped first. Returns false and leaves the
    /// state at `Failed` when anything goes wrong; `stop_tunnel` during
    /// the start also makes it return false.
    pub async fn start_tunnel(&self, profile: &Profile, flags: &TunnelConfig) -> bool {
        let _starting = self.starting.lock().await;
        self.stop_tunnel().await;

        let cancel = CancellationToken::new();
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(cancel.clone());
        self.set_state(ConnectionState::Connecting);

        let started = self.bring_up(profile, flags, &cancel).await;
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).take();

        match started {
            Some(running) if !cancel.is_cancelled() => {
                *self.running.lock().unwrap_or_else(|e| e.into_inner()) = Some(running);
                self.set_state(ConnectionState::Connected);
                true
            }
            Some(running) => {
                running.shutdown().await;
                self.set_state(ConnectionState::Disconnected);
                false
            }
            None if cancel.is_cancelled() => {
                self.set_state(ConnectionState::Disconnected);
                false
            }
            None => {
                self.set_state(ConnectionState::Failed);
                false
            }
        }
    }

    async fn bring_up(
        &self,
        profile: &Profile,
        flags: &TunnelConfig,
        cancel: &CancellationToken,
    ) -> Option<RunningTunnel> {
        if let Err(e) = profile.validate() {
            self.log.error(format!("Error starting SSH tunnel: {}", e));
            return None;
        }

        self.log.info(format!(
            "Starting SSH tunnel with profile {} ({}@{})",
            profile.id,
            profile.username,
            profile.server_addr()
        ));
        for overlay in flags.enabled_overlays() {
            self.log
                .info(format!("Using {} (not implemented, plain SSH is used)", overlay));
        }

        let stats = Arc::new(TunnelStats::new());
        *self.stats.lock().unwrap_or_else(|e| e.into_inner()) = stats.clone();

        let session = Arc::new(SshSessionManager::new(self.ssh.clone(), self.log.clone()));
        if let Err(e) = session.connect(profile, cancel).await {
            if !cancel.is_cancelled() {
                self.log.error(format!("Error starting SSH tunnel: {}", e));
            }
            return None;
        }

        let proxy = match start_proxy(&self.proxy, session.clone(), stats, self.log.clone(), cancel).await {
            Ok(proxy) => proxy,
            Err(e) => {
                self.log.error(format!("Error starting SOCKS5 proxy: {}", e));
                session.disconnect().await;
                return None;
            }
        };

        let monitor = tokio::spawn(monitor_session(
            session.clone(),
            profile.clone(),
            self.log.clone(),
            self.state.clone(),
            cancel.clone(),
        ));

        info!(addr = %proxy.local_addr(), "Tunnel running");
        Some(RunningTunnel {
            cancel: cancel.clone(),
            session,
            proxy,
            monitor,
        })
    }

    /// Stop the running tunnel, if any
    ///
    /// Cancels an in-flight start, closes the listeners, evicts every
    /// connection and disconnects the session. Returns once the
    /// background tasks have finished.
    pub async fn stop_tunnel(&self) {
        if let Some(pending) = self.pending.lock().unwrap_or_else(|e| e.into_inner()).take() {
            pending.cancel();
        }

        let running = self.running.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(running) = running {
            running.shutdown().await;
            self.log.info("SSH tunnel stopped");
        }
        self.set_state(ConnectionState::Disconnected);
    }
}

/// Reconnect the session when russh reports it closed
async fn monitor_session(
    session: Arc<SshSessionManager>,
    profile: Profile,
    log: Arc<LogSink>,
    state: Arc<watch::Sender<ConnectionState>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(SESSION_CHECK_INTERVAL);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => return,
        }

        if session.is_alive() {
            continue;
        }

        log.warn("SSH session lost, reconnecting");
        state.send_replace(ConnectionState::Connecting);
        match session.connect(&profile, &cancel).await {
            Ok(()) => {
                state.send_replace(ConnectionState::Connected);
            }
            Err(_) if cancel.is_cancelled() => return,
            Err(e) => {
                log.error(format!("Failed to restore SSH session: {}", e));
                state.send_replace(ConnectionState::Failed);
                return;
            }
        }
    }
}
