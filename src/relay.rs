//! Bidirectional relay between a SOCKS client and an SSH channel
//!
//! Both directions run in one task. The first direction to end (EOF, error
//! or client inactivity) ends the relay and the other direction is dropped,
//! so a half-open peer can never keep the connection alive.

use crate::helper::DEFAULT_BUFFER_SIZE;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Bound on the best-effort shutdown of each write half
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Relay tunables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Read buffer size per direction
    pub buffer_size: usize,
    /// Client read timeout; expiry closes the relay as idle
    pub client_read_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            buffer_size: DEFAULT_BUFFER_SIZE,
            client_read_timeout: Duration::from_secs(30),
        }
    }
}

/// Why a relay ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent EOF
    ClientClosed,
    /// Channel sent EOF
    ChannelClosed,
    /// No client data within the read timeout
    Idle,
    /// Client side failed
    ClientError(String),
    /// Channel side failed
    ChannelError(String),
    /// Connection was evicted or the proxy stopped
    Cancelled,
}

impl CloseReason {
    /// Whether the relay ended because of an I/O failure
    pub fn is_error(&self) -> bool {
        matches!(self, CloseReason::ClientError(_) | CloseReason::ChannelError(_))
    }
}

/// Result of a finished relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Bytes copied from the client to the channel
    pub client_to_channel: u64,
    /// Bytes copied from the channel to the client
    pub channel_to_client: u64,
    /// Why the relay ended
    pub reason: CloseReason,
}

impl RelayOutcome {
    /// Bytes copied in both directions
    pub fn total(&self) -> u64 {
        self.client_to_channel + self.channel_to_client
    }
}

enum DirectionEnd {
    Eof,
    TimedOut,
    ReadError(io::Error),
    WriteError(io::Error),
}

/// Copy one direction until EOF, error or read timeout
async fn copy_direction<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    buffer_size: usize,
    read_timeout: Option<Duration>,
    copied: &mut u64,
    total: &AtomicU64,
    touch: &F,
) -> DirectionEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: Fn(),
{
    let mut buf = vec![0u8; buffer_size];
    loop {
        let read = match read_timeout {
            Some(limit) => match tokio::time::timeout(limit, reader.read(&mut buf)).await {
                Ok(read) => read,
                Err(_) => return DirectionEnd::TimedOut,
            },
            None => reader.read(&mut buf).await,
        };

        let n = match read {
            Ok(0) => return DirectionEnd::Eof,
            Ok(n) => n,
            Err(e) => return DirectionEnd::ReadError(e),
        };

        if let Err(e) = writer.write_all(&buf[..n]).await {
            return DirectionEnd::WriteError(e);
        }
        if let Err(e) = writer.flush().await {
            return DirectionEnd::WriteError(e);
        }

        *copied += n as u64;
        total.fetch_add(n as u64, Ordering::Relaxed);
        touch();
    }
}

/// Relay bytes between `client` and `channel` until one side ends
///
/// Every relayed chunk is added to `total` and reported through `touch`.
/// Cancelling `cancel` ends the relay with [`CloseReason::Cancelled`].
/// Relay I/O failures are reported in the outcome, never returned as errors.
pub async fn relay<C, S, F>(
    client: C,
    channel: S,
    config: &RelayConfig,
    total: &AtomicU64,
    touch: F,
    cancel: &CancellationToken,
) -> RelayOutcome
where
    C: AsyncRead + AsyncWrite + Unpin,
    S: AsyncRead + AsyncWrite + Unpin,
    F: Fn(),
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut channel_read, mut channel_write) = tokio::io::split(channel);

    let mut client_to_channel = 0u64;
    let mut channel_to_client = 0u64;

    let reason = tokio::select! {
        end = copy_direction(
            &mut client_read,
            &mut channel_write,
            config.buffer_size,
            Some(config.client_read_timeout),
            &mut client_to_channel,
            total,
            &touch,
        ) => match end {
            DirectionEnd::Eof => CloseReason::ClientClosed,
            DirectionEnd::TimedOut => CloseReason::Idle,
            DirectionEnd::ReadError(e) => CloseReason::ClientError(e.to_string()),
            DirectionEnd::WriteError(e) => CloseReason::ChannelError(e.to_string()),
        },
        end = copy_direction(
            &mut channel_read,
            &mut client_write,
            config.buffer_size,
            None,
            &mut channel_to_client,
            total,
            &touch,
        ) => match end {
            DirectionEnd::Eof => CloseReason::ChannelClosed,
            DirectionEnd::TimedOut => CloseReason::Idle,
            DirectionEnd::ReadError(e) => CloseReason::ChannelError(e.to_string()),
            DirectionEnd::WriteError(e) => CloseReason::ClientError(e.to_string()),
        },
        _ = cancel.cancelled() => CloseReason::Cancelled,
    };

    let _ = tokio::time::timeout(SHUTDOWN_GRACE, client_write.shutdown()).await;
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, channel_write.shutdown()).await;

    debug!(
        client_to_channel,
        channel_to_client,
        ?reason,
        "Relay finished"
    );

    RelayOutcome {
        client_to_channel,
        channel_to_client,
        reason,
    }
}
