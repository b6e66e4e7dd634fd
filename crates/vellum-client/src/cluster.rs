use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use vellum_common::{Command, Error, Host, Result, ServerReply};

use crate::database::Database;
use crate::dispatcher::CommandContext;
use crate::pool::Pool;
use crate::registry::HostRegistry;
use crate::session::{ClientSession, SessionManager};
use crate::settings::{clamp_heartbeat, ConnectionSettings};

/// All mutable core state, guarded by one lock.
///
/// The registry, the pool, per-connection state and the knobs are mutated
/// from the dispatch path, the discovery loop and connection-close
/// callbacks alike. Everything goes through this single mutex, so each
/// critical section observes and leaves a consistent whole, the same
/// property the original single-threaded loop provided.
pub(crate) struct ClusterState {
    pub(crate) registry: HostRegistry,
    pub(crate) pool: Pool,
    pub(crate) readable_secondary: bool,
    pub(crate) heartbeat_frequency: Duration,
    pub(crate) shutting_down: bool,
    pub(crate) heartbeat_task: Option<JoinHandle<()>>,
}

pub(crate) struct ClusterCore {
    weak_self: Weak<ClusterCore>,
    pub(crate) settings: ConnectionSettings,
    pub(crate) state: Mutex<ClusterState>,
    /// Serializes discovery sweeps; held only inside `rediscover`.
    pub(crate) sweep_lock: Mutex<()>,
    pub(crate) sessions: SessionManager,
}

impl ClusterCore {
    pub(crate) fn new(settings: ConnectionSettings) -> Arc<Self> {
        let registry = HostRegistry::new(settings.hosts.iter().cloned());
        let heartbeat_frequency = clamp_heartbeat(settings.heartbeat_frequency);
        Arc::new_cyclic(|weak_self| ClusterCore {
            weak_self: weak_self.clone(),
            settings,
            state: Mutex::new(ClusterState {
                registry,
                pool: Pool::new(),
                readable_secondary: false,
                heartbeat_frequency,
                shutting_down: false,
                heartbeat_task: None,
            }),
            sweep_lock: Mutex::new(()),
            sessions: SessionManager::new(),
        })
    }

    /// Non-owning handle for spawned tasks, so a connection callback
    /// outliving the cluster is a silent no-op instead of a leak.
    pub(crate) fn weak(&self) -> Weak<ClusterCore> {
        self.weak_self.clone()
    }
}

/// Registry contents and pool size at one instant, for observability and
/// tests.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologySnapshot {
    pub known: Vec<Host>,
    pub discovered: Vec<Host>,
    pub timed_out: Vec<Host>,
    pub pooled_connections: usize,
}

/// Handle to one deployment.
///
/// Cheap to clone; all clones share the same pool and topology state.
/// Created by [`Cluster::connect`], torn down by [`Cluster::shutdown`]
/// (which closes every pooled connection and fails commands still in
/// flight).
///
/// # Example
///
/// ```no_run
/// use vellum_client::{Cluster, ConnectionSettings};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> vellum_common::Result<()> {
/// let settings = ConnectionSettings::from_seeds(&["db0:27017", "db1:27017"])?;
/// let cluster = Cluster::connect(settings).await?;
///
/// let reply = cluster.database("inventory").run_command(json!({"count": "parts"})).await?;
/// println!("{:?}", reply.body);
///
/// cluster.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Cluster {
    core: Arc<ClusterCore>,
}

impl Cluster {
    /// Connects to the deployment described by `settings`.
    ///
    /// Fails with [`Error::NoHostSpecified`] on an empty seed list. Runs
    /// the first discovery sweep and starts the heartbeat; connections
    /// themselves are opened on demand by the first dispatch.
    pub async fn connect(settings: ConnectionSettings) -> Result<Cluster> {
        settings.validate()?;
        let seeds = settings.hosts.len();
        let core = ClusterCore::new(settings);
        core.rediscover().await?;
        core.start_heartbeat().await;
        info!(seeds, "cluster connected");
        Ok(Cluster { core })
    }

    /// Returns a handle to one database, running under an implicit
    /// session.
    pub fn database(&self, name: impl Into<String>) -> Database {
        Database::new(self.clone(), name.into(), self.core.sessions.implicit_session())
    }

    /// Dispatches a command and awaits the server's reply.
    ///
    /// The command is routed to a capable pooled connection, opening a
    /// new one when none matches. If the connection dies before the reply
    /// and the command is retryable, it is transparently re-dispatched
    /// after a discovery sweep; its completion still arrives here,
    /// exactly once.
    pub async fn send(
        &self,
        command: Command,
        session: Option<&ClientSession>,
    ) -> Result<ServerReply> {
        let command = match session {
            Some(session) => command.with_session(session.id()),
            None => command,
        };
        let (ctx, reply) = CommandContext::channel(command);
        self.core.dispatch(ctx).await;
        match reply.await {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectionClosed(
                "completion slot dropped".to_string(),
            )),
        }
    }

    /// Selects the host a command with the given capability requirement
    /// would run on, opening a connection if necessary.
    pub async fn select_host(&self, writable: bool) -> Result<Host> {
        let id = self.core.get_connection(writable).await?;
        let state = self.core.state.lock().await;
        state
            .pool
            .find(id)
            .map(|entry| entry.host.clone())
            .ok_or_else(|| Error::ConnectionClosed("connection closed during selection".to_string()))
    }

    /// Runs one discovery sweep now.
    pub async fn rediscover(&self) -> Result<()> {
        self.core.rediscover().await
    }

    /// Allows or forbids routing read commands to non-primary members.
    /// Cascades to every pooled connection.
    pub async fn set_readable_secondary(&self, enabled: bool) {
        let mut state = self.core.state.lock().await;
        state.readable_secondary = enabled;
        for entry in state.pool.iter_mut() {
            entry.readable_secondary = enabled;
        }
    }

    /// Sets the discovery heartbeat interval, silently raised to the
    /// 500 ms floor.
    pub async fn set_heartbeat_frequency(&self, frequency: Duration) {
        let mut state = self.core.state.lock().await;
        state.heartbeat_frequency = clamp_heartbeat(frequency);
    }

    /// The effective heartbeat interval.
    pub async fn heartbeat_frequency(&self) -> Duration {
        self.core.state.lock().await.heartbeat_frequency
    }

    /// Registry contents and pool size at this instant.
    pub async fn topology(&self) -> TopologySnapshot {
        let state = self.core.state.lock().await;
        TopologySnapshot {
            known: state.registry.known().iter().cloned().collect(),
            discovered: state.registry.discovered().iter().cloned().collect(),
            timed_out: state.registry.timed_out().iter().cloned().collect(),
            pooled_connections: state.pool.len(),
        }
    }

    /// Shuts the cluster down: stops the heartbeat, closes every pooled
    /// connection and fails commands still in flight with
    /// [`Error::ClusterClosed`]. Idempotent.
    pub async fn shutdown(&self) {
        let entries = {
            let mut state = self.core.state.lock().await;
            if state.shutting_down {
                return;
            }
            state.shutting_down = true;
            if let Some(task) = state.heartbeat_task.take() {
                task.abort();
            }
            state.pool.drain()
        };
        let connections = entries.len();
        for mut entry in entries {
            for ctx in std::mem::take(&mut entry.in_flight) {
                ctx.complete(Err(Error::ClusterClosed));
            }
            entry.reader_task.abort();
            entry.writer_task.abort();
        }
        info!(connections, "cluster shut down");
    }
}
