//! SOCKS5 protocol constants
//!
//! Defines the subset of RFC 1928 constants the proxy speaks.

/// SOCKS5 protocol version
pub const SOCKS5_VERSION: u8 = 0x05;

// Authentication methods
/// No authentication required
pub const SOCKS5_AUTH_METHOD_NONE: u8 = 0x00;
/// No acceptable methods
pub const SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE: u8 = 0xFF;

// Commands
/// TCP CONNECT command
pub const SOCKS5_CMD_TCP_CONNECT: u8 = 0x01;

// Address types
/// IPv4 address
pub const SOCKS5_ADDR_TYPE_IPV4: u8 = 0x01;
/// Domain name
pub const SOCKS5_ADDR_TYPE_DOMAIN: u8 = 0x03;
/// IPv6 address
pub const SOCKS5_ADDR_TYPE_IPV6: u8 = 0x04;

// Reserved byte
/// Reserved byte value (always 0x00)
pub const SOCKS5_RESERVED: u8 = 0x00;

/// Maximum domain name length
pub const MAX_DOMAIN_LEN: usize = 255;

/// Method-selection reply rejecting every offered method
pub const NO_ACCEPTABLE_METHODS_REPLY: [u8; 2] = [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE];

/// Method-selection reply choosing "no authentication"
pub const NO_AUTH_REPLY: [u8; 2] = [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE];
