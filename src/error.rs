//! Error types for Sshtun
//!
//! This module defines all custom error types used throughout the application.

use std::io;
use thiserror::Error;

/// Main error type for tunnel operations
#[derive(Error, Debug)]
pub enum TunnelError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// SOCKS5 protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// SSH authentication error
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Direct channel could not be opened
    #[error("Channel error: {0}")]
    Channel(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Error raised by the SSH library
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),
}

impl TunnelError {
    /// Whether retrying the same operation can possibly succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TunnelError::Auth(_) | TunnelError::Config(_))
    }
}

/// SOCKS5 wire protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Unsupported SOCKS version
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// No acceptable authentication method
    #[error("No acceptable authentication method")]
    NoAcceptableMethod,

    /// Command not supported
    #[error("Command not supported: {0}")]
    CommandNotSupported(u8),

    /// Reserved byte was not zero
    #[error("Reserved byte is not zero: {0}")]
    NonZeroReserved(u8),

    /// Address type not supported
    #[error("unsupported address type: {0}")]
    AddressTypeNotSupported(u8),

    /// Invalid domain name
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    /// Invalid address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The peer closed the stream before a full field was read
    #[error("truncated: expected {expected} bytes")]
    Truncated {
        /// Bytes the field needed
        expected: usize,
    },

    /// Underlying stream failure
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Socks5ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl From<Socks5ReplyCode> for u8 {
    fn from(code: Socks5ReplyCode) -> Self {
        code as u8
    }
}

impl From<&TunnelError> for Socks5ReplyCode {
    fn from(err: &TunnelError) -> Self {
        match err {
            TunnelError::Timeout(_) => Socks5ReplyCode::TtlExpired,
            TunnelError::Channel(_) => Socks5ReplyCode::HostUnreachable,
            TunnelError::Io(e) => match e.kind() {
                io::ErrorKind::ConnectionRefused => Socks5ReplyCode::ConnectionRefused,
                io::ErrorKind::TimedOut => Socks5ReplyCode::HostUnreachable,
                _ => Socks5ReplyCode::GeneralFailure,
            },
            _ => Socks5ReplyCode::GeneralFailure,
        }
    }
}

/// Errors from parsing `L7000=mail:143` style forward specifications
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForwardParseError {
    /// First character is neither `L` nor `R`
    #[error("illegal Remote/Local specifier")]
    IllegalDirection,
    /// No `=` separator
    #[error("missing =")]
    MissingEquals,
    /// No `:` separator
    #[error("missing :")]
    MissingColon,
    /// Nothing between the direction and `=`
    #[error("missing local port")]
    MissingLocalPort,
    /// Nothing between `=` and `:`
    #[error("missing remote host")]
    MissingRemoteHost,
    /// Nothing after `:`
    #[error("missing remote port")]
    MissingRemotePort,
    /// A port is not a number in 1..=65535
    #[error("one of the ports is non numeric")]
    NonNumericPort,
}
