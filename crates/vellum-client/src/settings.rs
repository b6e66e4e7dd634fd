use std::fmt;
use std::time::Duration;

use vellum_common::transport::TlsSettings;
use vellum_common::{Error, Host, Result};

/// Default interval between discovery sweeps.
pub const DEFAULT_HEARTBEAT_FREQUENCY: Duration = Duration::from_secs(10);

/// Floor for the heartbeat frequency. Attempts to configure a shorter
/// interval are silently raised to this value.
pub const MIN_HEARTBEAT_FREQUENCY: Duration = Duration::from_millis(500);

/// Default time allowed for establishing one connection, handshake included.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Credentials presented to the deployment.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration for a cluster, immutable after `connect`.
///
/// Built from a non-empty seed list plus `with_*` options:
///
/// ```
/// use vellum_client::{ConnectionSettings, Credentials};
/// use std::time::Duration;
///
/// let settings = ConnectionSettings::from_seeds(&["db0:27017", "db1:27017"])
///     .unwrap()
///     .with_app_name("reports")
///     .with_credentials(Credentials::new("svc", "hunter2"))
///     .with_heartbeat_frequency(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Seed hosts; the registry's initial known set.
    pub hosts: Vec<Host>,
    /// Optional credentials.
    pub credentials: Option<Credentials>,
    /// Optional TLS settings; plain TCP when absent.
    pub tls: Option<TlsSettings>,
    /// Application name sent in the client metadata of the initial
    /// handshake.
    pub app_name: Option<String>,
    /// Interval between discovery sweeps, floored at
    /// [`MIN_HEARTBEAT_FREQUENCY`].
    pub heartbeat_frequency: Duration,
    /// Time allowed for one connection attempt, handshake included.
    pub connect_timeout: Duration,
}

impl ConnectionSettings {
    pub fn new(hosts: Vec<Host>) -> Self {
        Self {
            hosts,
            credentials: None,
            tls: None,
            app_name: None,
            heartbeat_frequency: DEFAULT_HEARTBEAT_FREQUENCY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Parses seed host strings. Fails on the first malformed entry;
    /// unlike hosts learned from handshake replies, the seed list is
    /// operator input and a typo there should be loud.
    pub fn from_seeds(seeds: &[&str]) -> Result<Self> {
        let hosts = seeds
            .iter()
            .map(|s| s.parse::<Host>())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(hosts))
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_tls(mut self, tls: TlsSettings) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// Sets the heartbeat frequency, silently raised to
    /// [`MIN_HEARTBEAT_FREQUENCY`] if shorter.
    pub fn with_heartbeat_frequency(mut self, frequency: Duration) -> Self {
        self.heartbeat_frequency = clamp_heartbeat(frequency);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Fails with [`Error::NoHostSpecified`] on an empty seed list.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(Error::NoHostSpecified);
        }
        Ok(())
    }
}

pub(crate) fn clamp_heartbeat(frequency: Duration) -> Duration {
    frequency.max(MIN_HEARTBEAT_FREQUENCY)
}
