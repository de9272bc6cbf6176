//! SOCKS5 request parser
//!
//! Parses the CONNECT request that follows a successful handshake.

use super::codec::{decode_address, decode_port, read_u8};
use super::consts::*;
use super::reply::send_failure;
use crate::error::{ProtocolError, Socks5ReplyCode};
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// A validated CONNECT request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Target host as text (dotted IPv4, domain, or 8-group IPv6)
    pub host: String,
    /// Target port
    pub port: u16,
    /// Address type the client used, echoed in the success reply
    pub address_type: u8,
}

impl fmt::Display for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address_type == SOCKS5_ADDR_TYPE_IPV6 {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Read a CONNECT request from the stream
///
/// # SOCKS5 Request Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// On every failure the matching error reply has already been written
/// (a non-zero reserved byte gets no reply).
pub async fn parse_connect<S>(stream: &mut S) -> Result<ConnectRequest, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let version = read_u8(stream).await?;
    if version != SOCKS5_VERSION {
        stream.write_all(&NO_ACCEPTABLE_METHODS_REPLY).await?;
        stream.flush().await?;
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let command = read_u8(stream).await?;
    if command != SOCKS5_CMD_TCP_CONNECT {
        send_failure(stream, Socks5ReplyCode::CommandNotSupported).await?;
        return Err(ProtocolError::CommandNotSupported(command));
    }

    let reserved = read_u8(stream).await?;
    if reserved != SOCKS5_RESERVED {
        return Err(ProtocolError::NonZeroReserved(reserved));
    }

    let address_type = read_u8(stream).await?;
    let host = match decode_address(stream, address_type).await {
        Ok((host, _)) => host,
        Err(ProtocolError::AddressTypeNotSupported(atyp)) => {
            // Best effort, the connection is closed either way.
            let _ = send_failure(stream, Socks5ReplyCode::AddressTypeNotSupported).await;
            return Err(ProtocolError::AddressTypeNotSupported(atyp));
        }
        Err(e) => return Err(e),
    };
    let port = decode_port(stream).await?;

    tracing::debug!(%host, port, address_type, "Parsed SOCKS5 CONNECT");

    Ok(ConnectRequest {
        host,
        port,
        address_type,
    })
}
