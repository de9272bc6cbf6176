//! SOCKS5 module for Sshtun
//!
//! This module implements the RFC 1928 subset the proxy accepts: version 5,
//! the "no authentication" method, the CONNECT command, and IPv4, domain
//! and IPv6 target addresses. Everything here works on any
//! `AsyncRead + AsyncWrite` stream, so it is exercised in tests without
//! binding a socket.

mod codec;
mod consts;
mod handshake;
mod reply;
mod request;

pub use codec::{decode_address, decode_port, encode_bound_address, encode_bound_port};
pub use consts::*;
pub use handshake::negotiate;
pub use reply::{failure_reply, send_failure, send_success, success_reply};
pub use request::{parse_connect, ConnectRequest};
