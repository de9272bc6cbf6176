//! Test utilities and mocks for Sshtun
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use russh::server::{Auth, Msg, Session};
use russh::{Channel, MethodKind, MethodSet};
use sshtun::config::{ForwardSpec, Profile, ProxyConfig, SshSettings};
use sshtun::error::TunnelError;
use sshtun::ssh::DirectChannelOpener;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Host key of the in-process SSH server
const HOST_KEY: &str = include_str!("../fixtures/host_ed25519");

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// A port that was free a moment ago
pub async fn free_port() -> u16 {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr.port()
}

/// Spawn a TCP echo server and return its address
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// TCP relay whose links can be cut to simulate a dropped network path
pub struct TcpRelay {
    /// Listening address
    pub addr: SocketAddr,
    links: Arc<Mutex<CancellationToken>>,
    accepting: Arc<AtomicBool>,
    stop: CancellationToken,
}

impl TcpRelay {
    /// Drop every live link; new connections are still relayed
    pub fn cut(&self) {
        let mut links = self.links.lock().unwrap();
        links.cancel();
        *links = CancellationToken::new();
    }

    /// Accept and immediately drop new connections
    pub fn pause(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    /// Relay new connections again
    pub fn resume(&self) {
        self.accepting.store(true, Ordering::SeqCst);
    }

    /// Close the listener and every link for good
    pub fn close(&self) {
        self.stop.cancel();
        self.cut();
    }
}

/// Spawn a relay in front of `target`
pub async fn spawn_tcp_relay(target: SocketAddr) -> TcpRelay {
    let (listener, addr) = create_test_listener().await;
    let relay = TcpRelay {
        addr,
        links: Arc::new(Mutex::new(CancellationToken::new())),
        accepting: Arc::new(AtomicBool::new(true)),
        stop: CancellationToken::new(),
    };

    let links = relay.links.clone();
    let accepting = relay.accepting.clone();
    let stop = relay.stop.clone();
    tokio::spawn(async move {
        loop {
            let mut inbound = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => stream,
                    Err(_) => break,
                },
                _ = stop.cancelled() => break,
            };
            if !accepting.load(Ordering::SeqCst) {
                continue;
            }

            let link = links.lock().unwrap().clone();
            tokio::spawn(async move {
                let Ok(mut outbound) = TcpStream::connect(target).await else {
                    return;
                };
                tokio::select! {
                    _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound) => {}
                    _ = link.cancelled() => {}
                }
            });
        }
    });

    relay
}

/// Channel opener that dials the target over plain TCP
///
/// Stands in for the SSH session so the proxy can be tested on its own.
#[derive(Default)]
pub struct TcpOpener {
    calls: AtomicUsize,
    refuse: bool,
    redirect: Option<SocketAddr>,
}

impl TcpOpener {
    /// Opener that connects every request
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Opener that refuses every request like a server rejecting the channel
    pub fn refusing() -> Arc<Self> {
        Arc::new(TcpOpener {
            refuse: true,
            ..Default::default()
        })
    }

    /// Opener that sends every request to `target`, whatever was asked for
    pub fn redirecting(target: SocketAddr) -> Arc<Self> {
        Arc::new(TcpOpener {
            redirect: Some(target),
            ..Default::default()
        })
    }

    /// Number of open requests seen
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectChannelOpener for TcpOpener {
    type Stream = TcpStream;

    async fn open_direct_channel(
        &self,
        host: &str,
        port: u16,
        _originator: SocketAddr,
    ) -> Result<Self::Stream, TunnelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(TunnelError::Channel(format!("{}:{} refused", host, port)));
        }
        let connected = match self.redirect {
            Some(target) => TcpStream::connect(target).await,
            None => TcpStream::connect((host, port)).await,
        };
        connected.map_err(|e| TunnelError::Channel(e.to_string()))
    }
}

/// Proxy configuration listening on `port` of loopback
pub fn proxy_config(port: u16) -> ProxyConfig {
    ProxyConfig {
        bind_addr: "127.0.0.1".to_string(),
        port,
        ..Default::default()
    }
}

/// Proxy configuration with local forwards
pub fn proxy_config_with_forwards(port: u16, forwards: &[&str]) -> ProxyConfig {
    ProxyConfig {
        forwards: forwards
            .iter()
            .map(|f| f.parse::<ForwardSpec>().unwrap())
            .collect(),
        ..proxy_config(port)
    }
}

/// SSH settings that fail fast
pub fn quick_ssh_settings() -> SshSettings {
    SshSettings {
        connect_timeout: 5,
        retry_delay: 0,
        max_connect_attempts: 2,
        channel_open_timeout: 5,
        ..Default::default()
    }
}

/// Client half of a SOCKS5 exchange over a raw socket
pub async fn socks5_connect(proxy: SocketAddr, request: &[u8]) -> (TcpStream, Vec<u8>) {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream
        .write_all(&socks5_mock::create_auth_request_no_auth())
        .await
        .unwrap();
    let mut method = [0u8; 2];
    stream.read_exact(&mut method).await.unwrap();
    assert_eq!(method, [5, 0]);

    stream.write_all(request).await.unwrap();
    let mut reply = vec![0u8; 10];
    stream.read_exact(&mut reply).await.unwrap();
    (stream, reply)
}

/// Mock SOCKS5 handshake data
pub mod socks5_mock {
    use sshtun::socks::*;

    /// Create a no-auth method selection request
    pub fn create_auth_request_no_auth() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE]
    }

    /// Create a connect command to IPv4 address
    pub fn create_connect_ipv4(ip: [u8; 4], port: u16) -> Vec<u8> {
        let mut cmd = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_IPV4,
        ];
        cmd.extend_from_slice(&ip);
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }

    /// Create a connect command to domain
    pub fn create_connect_domain(domain: &str, port: u16) -> Vec<u8> {
        let mut cmd = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_DOMAIN,
            domain.len() as u8,
        ];
        cmd.extend_from_slice(domain.as_bytes());
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }
}

/// Password-only SSH server that serves direct-tcpip by dialing the target
pub struct TestSshServer {
    /// Listening address
    pub addr: SocketAddr,
    /// Direct channels opened so far
    pub channels: Arc<AtomicUsize>,
}

impl TestSshServer {
    /// Profile pointing at this server
    pub fn profile(&self, username: &str, password: &str) -> Profile {
        profile_for(self.addr, username, password)
    }
}

/// Profile for an SSH server reachable at `addr`
pub fn profile_for(addr: SocketAddr, username: &str, password: &str) -> Profile {
    Profile::new(
        "test",
        "In-process server",
        addr.ip().to_string(),
        addr.port(),
        username,
        password,
    )
}

struct ServerHandler {
    username: String,
    password: String,
    channels: Arc<AtomicUsize>,
}

impl russh::server::Handler for ServerHandler {
    type Error = anyhow::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if user == self.username && password == self.password {
            Ok(Auth::Accept)
        } else {
            Ok(Auth::reject())
        }
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let target = format!("{}:{}", host_to_connect, port_to_connect);
        let Ok(mut upstream) = TcpStream::connect(&target).await else {
            return Ok(false);
        };

        self.channels.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let mut stream = channel.into_stream();
            let _ = tokio::io::copy_bidirectional(&mut upstream, &mut stream).await;
        });
        Ok(true)
    }
}

/// Start an SSH server accepting `username`/`password`
pub async fn spawn_ssh_server(username: &str, password: &str) -> TestSshServer {
    let key = russh::keys::decode_secret_key(HOST_KEY, None).unwrap();

    let mut methods = MethodSet::empty();
    methods.push(MethodKind::Password);

    let config = Arc::new(russh::server::Config {
        methods,
        auth_rejection_time: Duration::from_millis(10),
        auth_rejection_time_initial: Some(Duration::from_secs(0)),
        keys: vec![key],
        ..Default::default()
    });

    let (listener, addr) = create_test_listener().await;
    let channels = Arc::new(AtomicUsize::new(0));
    let username = username.to_string();
    let password = password.to_string();
    let counter = channels.clone();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = ServerHandler {
                username: username.clone(),
                password: password.clone(),
                channels: counter.clone(),
            };
            let config = config.clone();
            tokio::spawn(async move {
                if let Ok(session) = russh::server::run_stream(config, stream, handler).await {
                    let _ = session.await;
                }
            });
        }
    });

    TestSshServer { addr, channels }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_listener() {
        let (listener, addr) = create_test_listener().await;
        assert!(addr.port() > 0);
        drop(listener);
    }

    #[tokio::test]
    async fn test_echo_server() {
        let addr = spawn_echo_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_tcp_relay_cut() {
        let echo = spawn_echo_server().await;
        let relay = spawn_tcp_relay(echo).await;

        let mut stream = TcpStream::connect(relay.addr).await.unwrap();
        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        relay.cut();
        let mut rest = Vec::new();
        let read = stream.read_to_end(&mut rest).await;
        assert!(read.map(|n| n == 0).unwrap_or(true));
    }

    #[test]
    fn test_socks5_mock_connect_ipv4() {
        let cmd = socks5_mock::create_connect_ipv4([192, 168, 1, 1], 8080);
        assert_eq!(cmd[0], 5); // SOCKS5 version
        assert_eq!(cmd[1], 1); // CONNECT
        assert_eq!(cmd[3], 1); // IPv4
        assert_eq!(&cmd[4..8], &[192, 168, 1, 1]);
    }
}
