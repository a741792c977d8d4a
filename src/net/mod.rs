//! Client/server networking with a line-oriented, `[<EOM>]`-framed wire
//! protocol.
//!
//! Addresses use the infrastructure's `HOST::PORT` notation (the literal
//! double colon separates host and port), defaulting to `127.0.0.1::3141`.

mod client;
mod connection;
mod server;

pub use client::{Client, CONNECT_TIMEOUT};
pub use connection::{Connection, END_OF_MESSAGE};
pub use server::{Server, ServerTask, SHUTDOWN_COMMAND};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Errors raised at the networking boundary.
#[derive(Debug, Error)]
pub enum NetError {
    /// The address string is not of the form `HOST::PORT`.
    #[error("network address {0:?} does not match the format \"HOST::PORT\", e.g. \"127.0.0.1::3141\"")]
    MalformedAddress(String),

    /// The port part is not a number in 0..=65535.
    #[error("port {0:?} is not a valid port number between 0 and 65535")]
    InvalidPort(String),

    /// A server instance already exists in this process.
    #[error("a server instance is already running")]
    AlreadyRunning,

    /// The peer did not answer the connect probe in time.
    #[error("{address} is not reachable within {timeout:?}")]
    Unreachable { address: Address, timeout: Duration },

    /// Transient stream I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A network address in `HOST::PORT` notation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Resolvable name or literal IPv4/IPv6 address.
    pub host: String,

    /// TCP port.
    pub port: u16,
}

impl Default for Address {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3141,
        }
    }
}

impl FromStr for Address {
    type Err = NetError;

    /// Splits on the last `::` so IPv6 literals like `::1` keep their colons.
    fn from_str(raw: &str) -> Result<Self, NetError> {
        let (host, port) = raw
            .rsplit_once("::")
            .ok_or_else(|| NetError::MalformedAddress(raw.to_string()))?;
        if host.is_empty() {
            return Err(NetError::MalformedAddress(raw.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| NetError::InvalidPort(port.to_string()))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4_address() {
        let address: Address = "127.0.0.1::3141".parse().unwrap();
        assert_eq!(address.host, "127.0.0.1");
        assert_eq!(address.port, 3141);
    }

    #[test]
    fn test_parse_hostname_address() {
        let address: Address = "analysis.example.org::8080".parse().unwrap();
        assert_eq!(address.host, "analysis.example.org");
        assert_eq!(address.port, 8080);
    }

    #[test]
    fn test_parse_ipv6_address() {
        let address: Address = "::1::3141".parse().unwrap();
        assert_eq!(address.host, "::1");
        assert_eq!(address.port, 3141);
    }

    #[test]
    fn test_parse_missing_separator() {
        let result = "127.0.0.1:3141".parse::<Address>();
        assert!(matches!(result, Err(NetError::MalformedAddress(_))));
    }

    #[test]
    fn test_parse_empty_host() {
        let result = "::3141".parse::<Address>();
        assert!(matches!(result, Err(NetError::MalformedAddress(_))));
    }

    #[test]
    fn test_parse_port_out_of_range() {
        let result = "127.0.0.1::70000".parse::<Address>();
        assert!(matches!(result, Err(NetError::InvalidPort(_))));
    }

    #[test]
    fn test_parse_port_not_a_number() {
        let result = "127.0.0.1::".parse::<Address>();
        assert!(matches!(result, Err(NetError::InvalidPort(_))));
    }

    #[test]
    fn test_default_address() {
        let address = Address::default();
        assert_eq!(address.to_string(), "127.0.0.1::3141");
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let address = Address {
            host: "10.0.0.7".to_string(),
            port: 9000,
        };
        assert_eq!(address.to_string().parse::<Address>().unwrap(), address);
    }
}
