use thiserror::Error;

/// Error type shared across the Vellum client.
///
/// Variants are deliberately coarse: the cluster core recovers from most
/// failures internally (a host that refuses connections is put aside and
/// retried on the next discovery sweep), so the kinds below are the ones a
/// caller can actually observe or that the core needs to tell apart.
///
/// All payloads are owned strings so an error can be fanned out to every
/// command that was in flight on a dying connection.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The connection settings carried an empty seed list.
    #[error("no host specified in connection settings")]
    NoHostSpecified,

    /// The transport came up but the handshake reply was absent or malformed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Every known host is pooled, timed out, or lacks the requested
    /// capability; nothing is left to try until the next discovery sweep.
    #[error("no available hosts")]
    NoAvailableHosts,

    /// The underlying transport closed between submission and reply.
    #[error("connection closed in flight: {0}")]
    ConnectionClosed(String),

    /// Umbrella for a failed connection attempt, carrying the reason.
    #[error("unable to connect: {reason}")]
    UnableToConnect { reason: Box<Error> },

    /// The cluster was shut down while the operation was outstanding.
    #[error("cluster is shut down")]
    ClusterClosed,

    /// A host string that could not be parsed into `address:port`.
    #[error("malformed host string: {0}")]
    InvalidHost(String),

    /// Transport-level connection failure (refused, reset, resolution).
    #[error("connection error: {0}")]
    Connection(String),

    /// TLS configuration or negotiation failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Other I/O failure on an established stream.
    #[error("I/O error: {0}")]
    Io(String),

    /// A frame that could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Wraps this error in the `UnableToConnect` umbrella.
    pub fn into_connect_failure(self) -> Error {
        Error::UnableToConnect {
            reason: Box::new(self),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
