//! SOCKS5 reply builder
//!
//! Constructs SOCKS5 reply messages.

use super::codec::{encode_bound_address, encode_bound_port};
use super::consts::*;
use crate::error::{ProtocolError, Socks5ReplyCode};
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Reply used for every failure: an all-zero IPv4 bound address
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 5  | REP |   0   |  1   | 0.0.0.0  |    0     |
/// +----+-----+-------+------+----------+----------+
/// ```
pub fn failure_reply(code: Socks5ReplyCode) -> [u8; 10] {
    [
        SOCKS5_VERSION,
        code.into(),
        SOCKS5_RESERVED,
        SOCKS5_ADDR_TYPE_IPV4,
        0,
        0,
        0,
        0,
        0,
        0,
    ]
}

/// Build a success reply echoing the requested address and port
pub fn success_reply(host: &str, address_type: u8, port: u16) -> Result<BytesMut, ProtocolError> {
    let address = encode_bound_address(host, address_type)?;

    let mut reply = BytesMut::with_capacity(4 + address.len() + 2);
    reply.put_u8(SOCKS5_VERSION);
    reply.put_u8(Socks5ReplyCode::Succeeded.into());
    reply.put_u8(SOCKS5_RESERVED);
    reply.put_u8(address_type);
    reply.put_slice(&address);
    reply.put_slice(&encode_bound_port(port));
    Ok(reply)
}

/// Write and flush a failure reply
pub async fn send_failure<S>(stream: &mut S, code: Socks5ReplyCode) -> Result<(), ProtocolError>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&failure_reply(code)).await?;
    stream.flush().await?;
    Ok(())
}

/// Write and flush a success reply
pub async fn send_success<S>(
    stream: &mut S,
    host: &str,
    address_type: u8,
    port: u16,
) -> Result<(), ProtocolError>
where
    S: AsyncWrite + Unpin,
{
    let reply = success_reply(host, address_type, port)?;
    stream.write_all(&reply).await?;
    stream.flush().await?;
    Ok(())
}
