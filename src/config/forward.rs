//! Port forward specifications
//!
//! Forwards are written the PuTTY way: `L7000=mail:143` listens locally on
//! port 7000 and connects to `mail:143` through the SSH session, `R` marks
//! a remote forward.

use crate::error::ForwardParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side of the tunnel listens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardDirection {
    /// Listen locally, connect on the server side
    Local,
    /// Listen on the server, connect locally
    Remote,
}

impl ForwardDirection {
    fn letter(self) -> char {
        match self {
            ForwardDirection::Local => 'L',
            ForwardDirection::Remote => 'R',
        }
    }
}

/// A parsed forward specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ForwardSpec {
    /// Direction letter
    pub direction: ForwardDirection,
    /// Listening port
    pub local_port: u16,
    /// Host to connect to
    pub remote_host: String,
    /// Port to connect to
    pub remote_port: u16,
}

impl FromStr for ForwardSpec {
    type Err = ForwardParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let direction = match chars.next() {
            Some('L') => ForwardDirection::Local,
            Some('R') => ForwardDirection::Remote,
            _ => return Err(ForwardParseError::IllegalDirection),
        };
        let rest = chars.as_str();

        let eq = rest.find('=').ok_or(ForwardParseError::MissingEquals)?;
        let colon = rest[eq..]
            .find(':')
            .map(|i| eq + i)
            .ok_or(ForwardParseError::MissingColon)?;

        let local = &rest[..eq];
        let host = &rest[eq + 1..colon];
        let remote = &rest[colon + 1..];

        if local.is_empty() {
            return Err(ForwardParseError::MissingLocalPort);
        }
        if host.is_empty() {
            return Err(ForwardParseError::MissingRemoteHost);
        }
        if remote.is_empty() {
            return Err(ForwardParseError::MissingRemotePort);
        }

        let local_port = parse_port(local)?;
        let remote_port = parse_port(remote)?;

        Ok(ForwardSpec {
            direction,
            local_port,
            remote_host: host.to_string(),
            remote_port,
        })
    }
}

fn parse_port(s: &str) -> Result<u16, ForwardParseError> {
    match s.parse::<u16>() {
        Ok(0) | Err(_) => Err(ForwardParseError::NonNumericPort),
        Ok(port) => Ok(port),
    }
}

impl TryFrom<String> for ForwardSpec {
    type Error = ForwardParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ForwardSpec> for String {
    fn from(spec: ForwardSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for ForwardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}={}:{}",
            self.direction.letter(),
            self.local_port,
            self.remote_host,
            self.remote_port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_forward() {
        let spec: ForwardSpec = "L7000=mail:143".parse().unwrap();
        assert_eq!(spec.direction, ForwardDirection::Local);
        assert_eq!(spec.local_port, 7000);
        assert_eq!(spec.remote_host, "mail");
        assert_eq!(spec.remote_port, 143);
        assert_eq!(spec.to_string(), "L7000=mail:143");
    }

    #[test]
    fn test_parse_remote_forward() {
        let spec: ForwardSpec = "R8080=localhost:80".parse().unwrap();
        assert_eq!(spec.direction, ForwardDirection::Remote);
        assert_eq!(spec.to_string(), "R8080=localhost:80");
    }

    #[test]
    fn test_parse_errors() {
        let cases = [
            ("", ForwardParseError::IllegalDirection),
            ("D1080=host:22", ForwardParseError::IllegalDirection),
            ("L7000mail:143", ForwardParseError::MissingEquals),
            ("L7000=mail143", ForwardParseError::MissingColon),
            ("L=mail:143", ForwardParseError::MissingLocalPort),
            ("L7000=:143", ForwardParseError::MissingRemoteHost),
            ("L7000=mail:", ForwardParseError::MissingRemotePort),
            ("Lx=mail:143", ForwardParseError::NonNumericPort),
            ("L7000=mail:port", ForwardParseError::NonNumericPort),
            ("L70000=mail:143", ForwardParseError::NonNumericPort),
            ("L0=mail:143", ForwardParseError::NonNumericPort),
        ];

        for (input, expected) in cases {
            assert_eq!(input.parse::<ForwardSpec>().unwrap_err(), expected, "{input}");
        }
    }

    #[test]
    fn test_colon_before_equals_is_not_the_separator() {
        // The host part is looked up after '=', so a colon in front of it
        // does not count.
        assert_eq!(
            "L7:000=mail".parse::<ForwardSpec>().unwrap_err(),
            ForwardParseError::MissingColon
        );
    }

    #[test]
    fn test_serde_as_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            forwards: Vec<ForwardSpec>,
        }

        let parsed: Wrapper = toml::from_str(r#"forwards = ["L7000=mail:143"]"#).unwrap();
        assert_eq!(parsed.forwards[0].remote_port, 143);

        let bad: Result<Wrapper, _> = toml::from_str(r#"forwards = ["X1=a:2"]"#);
        assert!(bad.is_err());
    }
}
