//! SOCKS5 method-selection handshake
//!
//! Only "no authentication" is offered. A client that does not list it is
//! answered with `[5, 0xFF]` and rejected.

use super::codec::{read_field, read_u8};
use super::consts::*;
use crate::error::ProtocolError;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Run the method-selection exchange
///
/// # Wire format
///
/// ```text
/// client: +-----+----------+----------+
///         | VER | NMETHODS | METHODS  |
///         +-----+----------+----------+
/// server: +-----+--------+
///         | VER | METHOD |
///         +-----+--------+
/// ```
///
/// Every failure is returned as an error value after the rejection reply
/// (when one applies) has been flushed, so the caller can still close the
/// socket cleanly.
pub async fn negotiate<S>(stream: &mut S) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let version = read_u8(stream).await?;
    if version != SOCKS5_VERSION {
        write_reply(stream, &NO_ACCEPTABLE_METHODS_REPLY).await?;
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let count = read_u8(stream).await? as usize;
    let mut methods = vec![0u8; count];
    read_field(stream, &mut methods).await?;

    if methods.contains(&SOCKS5_AUTH_METHOD_NONE) {
        write_reply(stream, &NO_AUTH_REPLY).await?;
        debug!("SOCKS5 handshake complete, selected no-auth");
        Ok(())
    } else {
        write_reply(stream, &NO_ACCEPTABLE_METHODS_REPLY).await?;
        Err(ProtocolError::NoAcceptableMethod)
    }
}

async fn write_reply<S>(stream: &mut S, reply: &[u8]) -> Result<(), ProtocolError>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(reply).await?;
    stream.flush().await?;
    Ok(())
}
