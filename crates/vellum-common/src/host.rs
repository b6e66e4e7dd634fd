use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Port assumed when a host string carries none.
pub const DEFAULT_PORT: u16 = 27017;

/// Identity of a deployment member: an `(address, port)` pair with value
/// equality.
///
/// Hosts are the keys of the cluster core's registry sets, so the type is
/// `Ord` and hashes by value; two `Host`s naming the same endpoint compare
/// equal regardless of where the strings came from (seed list or a
/// handshake reply).
///
/// # Example
///
/// ```
/// use vellum_common::{Host, DEFAULT_PORT};
///
/// let host: Host = "db0.example.net:4811".parse().unwrap();
/// assert_eq!(host.port, 4811);
///
/// let host: Host = "db0.example.net".parse().unwrap();
/// assert_eq!(host.port, DEFAULT_PORT);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Host {
    pub address: String,
    pub port: u16,
}

impl Host {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl FromStr for Host {
    type Err = Error;

    /// Parses `"address"` or `"address:port"`.
    ///
    /// An empty address, an empty port after the colon, or a port that is
    /// not a `u16` all fail with [`Error::InvalidHost`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidHost(s.to_string()));
        }
        match s.rsplit_once(':') {
            Some((address, port)) => {
                if address.is_empty() {
                    return Err(Error::InvalidHost(s.to_string()));
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|_| Error::InvalidHost(s.to_string()))?;
                Ok(Host::new(address, port))
            }
            None => Ok(Host::new(s, DEFAULT_PORT)),
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_port() {
        let host: Host = "db0:4811".parse().unwrap();
        assert_eq!(host, Host::new("db0", 4811));
    }

    #[test]
    fn test_parse_without_port_uses_default() {
        let host: Host = "db0".parse().unwrap();
        assert_eq!(host, Host::new("db0", DEFAULT_PORT));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Host>().is_err());
        assert!(":27017".parse::<Host>().is_err());
        assert!("db0:".parse::<Host>().is_err());
        assert!("db0:notaport".parse::<Host>().is_err());
        assert!("db0:99999".parse::<Host>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        let host = Host::new("db0.example.net", 27018);
        let parsed: Host = host.to_string().parse().unwrap();
        assert_eq!(host, parsed);
    }

    #[test]
    fn test_value_equality_and_ordering() {
        let a: Host = "a:27017".parse().unwrap();
        let b: Host = "a:27017".parse().unwrap();
        assert_eq!(a, b);

        let c: Host = "a:27018".parse().unwrap();
        let d: Host = "b:27017".parse().unwrap();
        assert!(a < c);
        assert!(c < d);
    }
}
