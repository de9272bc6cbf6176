//! SSH session lifecycle
//!
//! Connects with retry, authenticates with a password and hands out
//! direct-tcpip channels on the live session.

use super::{ClientHandler, DirectChannelOpener};
use crate::config::{Profile, SshSettings};
use crate::error::TunnelError;
use crate::helper::RetryConfig;
use crate::log_sink::LogSink;
use crate::transport::{SocketOpts, TcpConnector};
use async_trait::async_trait;
use russh::client::{self, AuthResult, Handle, Msg};
use russh::ChannelStream;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session
    #[default]
    Disconnected,
    /// Connect attempts in progress
    Connecting,
    /// Authenticated session available
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting",
            SessionState::Connected => "Connected",
        };
        f.write_str(name)
    }
}

/// Owner of the single SSH client session
pub struct SshSessionManager {
    settings: SshSettings,
    log: Arc<LogSink>,
    handle: RwLock<Option<Arc<Handle<ClientHandler>>>>,
    state: watch::Sender<SessionState>,
}

impl SshSessionManager {
    /// Create a disconnected manager
    pub fn new(settings: SshSettings, log: Arc<LogSink>) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        SshSessionManager {
            settings,
            log,
            handle: RwLock::new(None),
            state,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    fn current_handle(&self) -> Option<Arc<Handle<ClientHandler>>> {
        self.handle
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Whether a session exists and russh has not closed it
    pub fn is_alive(&self) -> bool {
        self.current_handle()
            .map(|handle| !handle.is_closed())
            .unwrap_or(false)
    }

    fn client_config(&self) -> Arc<client::Config> {
        let mut config = client::Config::default();
        config.nodelay = self.settings.tcp.nodelay;
        if self.settings.keepalive_interval > 0 {
            config.keepalive_interval = Some(self.settings.keepalive_interval());
            config.keepalive_max = self.settings.keepalive_max;
        }
        Arc::new(config)
    }

    /// Connect and authenticate, retrying until success, cancellation, a
    /// terminal error or the attempt cap
    pub async fn connect(
        &self,
        profile: &Profile,
        cancel: &CancellationToken,
    ) -> Result<(), TunnelError> {
        // Replacing a live session would leak it.
        self.disconnect().await;

        let retry = RetryConfig::new(self.settings.attempt_limit(), self.settings.retry_delay());
        let server = profile.server_addr();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.set_state(SessionState::Connecting);
            self.log.info(format!("Starting SSH session to {}", server));

            let result = tokio::select! {
                result = self.connect_once(profile, &server) => result,
                _ = cancel.cancelled() => {
                    self.set_state(SessionState::Disconnected);
                    return Err(TunnelError::Connection("connect cancelled".to_string()));
                }
            };

            match result {
                Ok(handle) => {
                    *self.handle.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(handle));
                    self.set_state(SessionState::Connected);
                    self.log.info(format!("SSH tunnel connected to {}", server));
                    return Ok(());
                }
                Err(e) if !e.is_retryable() => {
                    self.log.error(format!("SSH login to {} rejected: {}", server, e));
                    self.set_state(SessionState::Disconnected);
                    return Err(e);
                }
                Err(e) => {
                    self.log
                        .warn(format!("Failed to connect to SSH server: {}", e));
                    if !retry.should_retry(attempt) {
                        self.set_state(SessionState::Disconnected);
                        return Err(TunnelError::Connection(format!(
                            "giving up on {} after {} attempts: {}",
                            server, attempt, e
                        )));
                    }

                    debug!(attempt, delay = ?retry.delay, "Retrying SSH connect");
                    tokio::select! {
                        _ = tokio::time::sleep(retry.delay) => {}
                        _ = cancel.cancelled() => {
                            self.set_state(SessionState::Disconnected);
                            return Err(TunnelError::Connection("connect cancelled".to_string()));
                        }
                    }
                }
            }
        }
    }

    /// One TCP connect, SSH handshake and password login, bounded by the
    /// connect timeout
    async fn connect_once(
        &self,
        profile: &Profile,
        server: &str,
    ) -> Result<Handle<ClientHandler>, TunnelError> {
        let connector = TcpConnector::new(
            SocketOpts::from_tcp_config(&self.settings.tcp),
            self.settings.connect_timeout(),
        );

        let handshake = async {
            let stream = connector.connect(server).await?;
            let handler = ClientHandler::new(server, self.log.clone());
            let mut handle = client::connect_stream(self.client_config(), stream, handler).await?;
            authenticate(&mut handle, profile).await?;
            Ok::<_, TunnelError>(handle)
        };

        tokio::time::timeout(self.settings.connect_timeout(), handshake)
            .await
            .map_err(|_| {
                TunnelError::Timeout(format!(
                    "SSH handshake with {} took longer than {:?}",
                    server,
                    self.settings.connect_timeout()
                ))
            })?
    }

    /// Open a direct-tcpip channel on the live session
    pub async fn open_channel(
        &self,
        host: &str,
        port: u16,
        originator: SocketAddr,
    ) -> Result<ChannelStream<Msg>, TunnelError> {
        let handle = self
            .current_handle()
            .ok_or_else(|| TunnelError::Channel("SSH session is not connected".to_string()))?;
        if handle.is_closed() {
            return Err(TunnelError::Channel("SSH session is closed".to_string()));
        }

        let open = handle.channel_open_direct_tcpip(
            host,
            u32::from(port),
            originator.ip().to_string(),
            u32::from(originator.port()),
        );

        match tokio::time::timeout(self.settings.channel_open_timeout(), open).await {
            Ok(Ok(channel)) => {
                debug!(%host, port, "Direct channel opened");
                Ok(channel.into_stream())
            }
            Ok(Err(e)) => Err(TunnelError::Channel(format!(
                "cannot open channel to {}:{}: {}",
                host, port, e
            ))),
            Err(_) => Err(TunnelError::Timeout(format!(
                "opening channel to {}:{}",
                host, port
            ))),
        }
    }

    /// Close the session; a no-op when there is none
    pub async fn disconnect(&self) {
        let handle = self
            .handle
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(handle) = handle {
            let goodbye = handle.disconnect(russh::Disconnect::ByApplication, "", "en");
            match tokio::time::timeout(Duration::from_secs(2), goodbye).await {
                Ok(Ok(())) => info!("SSH session closed"),
                Ok(Err(e)) => debug!("Failed to disconnect gracefully: {}", e),
                Err(_) => debug!("Timed out sending disconnect"),
            }
            self.log.info("SSH session disconnected");
        }
        self.set_state(SessionState::Disconnected);
    }
}

#[async_trait]
impl DirectChannelOpener for SshSessionManager {
    type Stream = ChannelStream<Msg>;

    async fn open_direct_channel(
        &self,
        host: &str,
        port: u16,
        originator: SocketAddr,
    ) -> Result<Self::Stream, TunnelError> {
        self.open_channel(host, port, originator).await
    }
}

async fn authenticate(handle: &mut Handle<ClientHandler>, profile: &Profile) -> Result<(), TunnelError> {
    let result = handle
        .authenticate_password(profile.username.as_str(), profile.password.as_str())
        .await?;

    match result {
        AuthResult::Success => {
            debug!(username = %profile.username, "Password authentication accepted");
            Ok(())
        }
        AuthResult::Failure {
            partial_success, ..
        } => Err(TunnelError::Auth(if partial_success {
            format!("password accepted for {} but more methods are required", profile.username)
        } else {
            format!("password rejected for {}", profile.username)
        })),
    }
}
