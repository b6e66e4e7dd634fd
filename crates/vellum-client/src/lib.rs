//! Vellum Client: cluster coordination core
//!
//! This crate keeps a [`Cluster`] of connections to a distributed
//! document database alive and useful: it discovers the deployment's
//! members over time, pools connections to them, routes each command to a
//! connection with the right capability, and transparently retries
//! commands whose connection dies in flight.
//!
//! # How it works
//!
//! - A **host registry** tracks three views of the host universe: every
//!   host ever *known* (seeds plus hosts learned from handshakes), hosts
//!   currently *discovered* (pooled), and hosts whose last connection
//!   attempt *timed out*.
//! - A **discovery loop** re-handshakes every pooled connection on a
//!   heartbeat (default 10 s, floor 500 ms), folds the replies back into
//!   the registry, and drops connections whose handshake fails.
//! - A **router** picks a pooled connection matching the requested
//!   capability (writable primary or read-capable member), preferring
//!   the most recently established match; on a miss it dials candidate
//!   hosts, and as a last resort sweeps and rescans once.
//! - A **dispatcher** writes commands onto the chosen connection and
//!   pairs replies with their commands in submission order. When a
//!   connection closes with commands still in flight, retryable ones are
//!   re-dispatched after a sweep; each command's future completes exactly
//!   once either way.
//!
//! # Example
//!
//! ```no_run
//! use vellum_client::{Cluster, ConnectionSettings};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> vellum_common::Result<()> {
//! let settings = ConnectionSettings::from_seeds(&["db0:27017", "db1:27017"])?
//!     .with_app_name("reports");
//! let cluster = Cluster::connect(settings).await?;
//!
//! let inventory = cluster.database("inventory");
//! let reply = inventory.run_command(json!({"count": "parts"})).await?;
//! println!("{:?}", reply.body);
//!
//! cluster.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod cluster;
mod connection;
mod database;
mod discovery;
mod dispatcher;
mod pool;
mod registry;
mod router;
mod session;
mod settings;

pub use cluster::{Cluster, TopologySnapshot};
pub use database::Database;
pub use session::{ClientSession, SessionId};
pub use settings::{
    ConnectionSettings, Credentials, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_FREQUENCY,
    MIN_HEARTBEAT_FREQUENCY,
};

pub use vellum_common::transport::TlsSettings;
pub use vellum_common::{Command, Error, Host, Result, ServerReply};
