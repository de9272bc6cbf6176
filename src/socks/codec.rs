//! SOCKS5 address and port codec
//!
//! Decodes DST.ADDR / DST.PORT from a client stream and encodes the
//! BND.ADDR / BND.PORT fields of a reply.
//!
//! ```text
//! ATYP 0x01: 4 bytes            -> "a.b.c.d"
//! ATYP 0x03: 1 len byte + name  -> "example.com"
//! ATYP 0x04: 16 bytes           -> "2001:db8:0:0:0:0:0:1"
//! ```

use super::consts::*;
use crate::error::ProtocolError;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read exactly `buf.len()` bytes, mapping a short read to `Truncated`
pub async fn read_field<S>(stream: &mut S, buf: &mut [u8]) -> Result<(), ProtocolError>
where
    S: AsyncRead + Unpin,
{
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(ProtocolError::Truncated {
            expected: buf.len(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Read a single byte
pub async fn read_u8<S>(stream: &mut S) -> Result<u8, ProtocolError>
where
    S: AsyncRead + Unpin,
{
    let mut byte = [0u8; 1];
    read_field(stream, &mut byte).await?;
    Ok(byte[0])
}

/// Decode a target address of the given type
///
/// Returns the textual host and the number of bytes consumed from the
/// stream (including the length prefix of a domain).
pub async fn decode_address<S>(
    stream: &mut S,
    address_type: u8,
) -> Result<(String, usize), ProtocolError>
where
    S: AsyncRead + Unpin,
{
    match address_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut octets = [0u8; 4];
            read_field(stream, &mut octets).await?;
            Ok((Ipv4Addr::from(octets).to_string(), 4))
        }
        SOCKS5_ADDR_TYPE_DOMAIN => {
            let len = read_u8(stream).await? as usize;
            if len == 0 {
                return Err(ProtocolError::InvalidDomain(
                    "zero-length domain".to_string(),
                ));
            }
            let mut name = vec![0u8; len];
            read_field(stream, &mut name).await?;
            let domain = String::from_utf8(name)
                .map_err(|_| ProtocolError::InvalidDomain("domain is not UTF-8".to_string()))?;
            Ok((domain, 1 + len))
        }
        SOCKS5_ADDR_TYPE_IPV6 => {
            let mut octets = [0u8; 16];
            read_field(stream, &mut octets).await?;
            Ok((format_ipv6_groups(&octets), 16))
        }
        other => Err(ProtocolError::AddressTypeNotSupported(other)),
    }
}

/// Decode a big-endian port
pub async fn decode_port<S>(stream: &mut S) -> Result<u16, ProtocolError>
where
    S: AsyncRead + Unpin,
{
    let mut port = [0u8; 2];
    read_field(stream, &mut port).await?;
    Ok(u16::from_be_bytes(port))
}

/// Encode a host string for the BND.ADDR field of a reply
///
/// Domains are length-prefixed. IPv6 accepts both the uncompressed form
/// produced by [`decode_address`] and `::`-compressed text.
pub fn encode_bound_address(host: &str, address_type: u8) -> Result<Vec<u8>, ProtocolError> {
    match address_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let ip: Ipv4Addr = host
                .parse()
                .map_err(|_| ProtocolError::InvalidAddress(host.to_string()))?;
            Ok(ip.octets().to_vec())
        }
        SOCKS5_ADDR_TYPE_DOMAIN => {
            let bytes = host.as_bytes();
            if bytes.is_empty() || bytes.len() > MAX_DOMAIN_LEN {
                return Err(ProtocolError::InvalidDomain(host.to_string()));
            }
            let mut out = Vec::with_capacity(1 + bytes.len());
            out.push(bytes.len() as u8);
            out.extend_from_slice(bytes);
            Ok(out)
        }
        SOCKS5_ADDR_TYPE_IPV6 => {
            let ip: Ipv6Addr = host
                .parse()
                .map_err(|_| ProtocolError::InvalidAddress(host.to_string()))?;
            Ok(ip.octets().to_vec())
        }
        other => Err(ProtocolError::AddressTypeNotSupported(other)),
    }
}

/// Encode a port for the BND.PORT field of a reply
pub fn encode_bound_port(port: u16) -> [u8; 2] {
    port.to_be_bytes()
}

/// Eight colon-separated lowercase hex groups, no zero compression
fn format_ipv6_groups(octets: &[u8; 16]) -> String {
    octets
        .chunks_exact(2)
        .map(|pair| format!("{:x}", u16::from_be_bytes([pair[0], pair[1]])))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_decode_ipv4() {
        let mut cursor = Cursor::new(vec![93, 184, 216, 34]);
        let (host, consumed) = decode_address(&mut cursor, SOCKS5_ADDR_TYPE_IPV4)
            .await
            .unwrap();
        assert_eq!(host, "93.184.216.34");
        assert_eq!(consumed, 4);
    }

    #[tokio::test]
    async fn test_decode_domain() {
        let mut data = vec![11];
        data.extend_from_slice(b"example.com");
        let mut cursor = Cursor::new(data);
        let (host, consumed) = decode_address(&mut cursor, SOCKS5_ADDR_TYPE_DOMAIN)
            .await
            .unwrap();
        assert_eq!(host, "example.com");
        assert_eq!(consumed, 12);
    }

    #[tokio::test]
    async fn test_decode_ipv6_uncompressed_lowercase() {
        let ip: Ipv6Addr = "2001:DB8::1".parse().unwrap();
        let mut cursor = Cursor::new(ip.octets().to_vec());
        let (host, consumed) = decode_address(&mut cursor, SOCKS5_ADDR_TYPE_IPV6)
            .await
            .unwrap();
        assert_eq!(host, "2001:db8:0:0:0:0:0:1");
        assert_eq!(consumed, 16);
    }

    #[tokio::test]
    async fn test_decode_zero_length_domain_fails() {
        let mut cursor = Cursor::new(vec![0u8, 0x00, 0x50]);
        let result = decode_address(&mut cursor, SOCKS5_ADDR_TYPE_DOMAIN).await;
        assert!(matches!(result, Err(ProtocolError::InvalidDomain(_))));
    }

    #[tokio::test]
    async fn test_decode_invalid_utf8_domain_fails() {
        let mut cursor = Cursor::new(vec![2u8, 0xC3, 0x28]);
        let result = decode_address(&mut cursor, SOCKS5_ADDR_TYPE_DOMAIN).await;
        assert!(matches!(result, Err(ProtocolError::InvalidDomain(_))));
    }

    #[tokio::test]
    async fn test_decode_unsupported_type() {
        let mut cursor = Cursor::new(vec![1, 2, 3, 4]);
        let err = decode_address(&mut cursor, 0x02).await.unwrap_err();
        assert!(matches!(err, ProtocolError::AddressTypeNotSupported(2)));
        assert!(err.to_string().contains("unsupported address type"));
    }

    #[tokio::test]
    async fn test_decode_truncated() {
        let mut cursor = Cursor::new(vec![127, 0]);
        let err = decode_address(&mut cursor, SOCKS5_ADDR_TYPE_IPV4)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Truncated { expected: 4 }
        ));
        assert!(err.to_string().starts_with("truncated"));
    }

    #[tokio::test]
    async fn test_decode_port() {
        let mut cursor = Cursor::new(vec![0x1F, 0x90]);
        assert_eq!(decode_port(&mut cursor).await.unwrap(), 8080);

        let mut cursor = Cursor::new(vec![0x01]);
        assert!(matches!(
            decode_port(&mut cursor).await,
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[tokio::test]
    async fn test_decode_reads_across_partial_writes() {
        let mut mock = tokio_test::io::Builder::new()
            .read(&[10, 0])
            .read(&[0])
            .read(&[1])
            .build();
        let (host, _) = decode_address(&mut mock, SOCKS5_ADDR_TYPE_IPV4)
            .await
            .unwrap();
        assert_eq!(host, "10.0.0.1");
    }

    #[test]
    fn test_encode_bound_address_domain() {
        let bytes = encode_bound_address("mail", SOCKS5_ADDR_TYPE_DOMAIN).unwrap();
        assert_eq!(bytes, vec![4, b'm', b'a', b'i', b'l']);
        assert!(encode_bound_address("", SOCKS5_ADDR_TYPE_DOMAIN).is_err());
        assert!(encode_bound_address(&"a".repeat(256), SOCKS5_ADDR_TYPE_DOMAIN).is_err());
    }

    #[test]
    fn test_encode_bound_address_ipv6_compressed_forms() {
        let full = encode_bound_address("0:0:0:0:0:0:0:1", SOCKS5_ADDR_TYPE_IPV6).unwrap();
        let compressed = encode_bound_address("::1", SOCKS5_ADDR_TYPE_IPV6).unwrap();
        assert_eq!(full, compressed);
        assert_eq!(full.len(), 16);
        assert_eq!(full[15], 1);
    }

    #[test]
    fn test_encode_bound_address_rejects_garbage() {
        assert!(encode_bound_address("300.1.1.1", SOCKS5_ADDR_TYPE_IPV4).is_err());
        assert!(encode_bound_address("not-ipv6", SOCKS5_ADDR_TYPE_IPV6).is_err());
        assert!(encode_bound_address("1.1.1.1", 0x09).is_err());
    }

    #[test]
    fn test_encode_bound_port() {
        assert_eq!(encode_bound_port(80), [0, 80]);
        assert_eq!(encode_bound_port(443), [0x01, 0xBB]);
    }

    #[tokio::test]
    async fn test_round_trip_all_address_types() {
        let cases: Vec<(u8, Vec<u8>)> = vec![
            (SOCKS5_ADDR_TYPE_IPV4, vec![192, 168, 0, 254]),
            (SOCKS5_ADDR_TYPE_DOMAIN, {
                let mut d = vec![14];
                d.extend_from_slice(b"mail.localhost");
                d
            }),
            (
                SOCKS5_ADDR_TYPE_IPV6,
                "fe80::1ff:fe23:4567:890a".parse::<Ipv6Addr>().unwrap().octets().to_vec(),
            ),
        ];

        for (atyp, wire) in cases {
            let mut cursor = Cursor::new(wire.clone());
            let (host, consumed) = decode_address(&mut cursor, atyp).await.unwrap();
            assert_eq!(consumed, wire.len());

            let encoded = encode_bound_address(&host, atyp).unwrap();
            assert_eq!(encoded, wire);

            let mut cursor = Cursor::new(encoded);
            let (again, _) = decode_address(&mut cursor, atyp).await.unwrap();
            assert_eq!(again, host);
        }
    }
}
