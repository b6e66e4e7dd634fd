use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use tokio::io::{ReadHalf, WriteHalf};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use vellum_common::protocol::build_handshake_command;
use vellum_common::transport::{self, ClientStream, JsonCodec};
use vellum_common::{Error, HandshakeReply, Host, Result};

use crate::cluster::ClusterCore;
use crate::dispatcher::CommandContext;

/// Stable identity of a pool entry, distinct from its host.
pub(crate) type ConnectionId = u64;

static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> ConnectionId {
    CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// One live connection in the pool.
///
/// The transport is owned by two spawned tasks: a writer draining the
/// `writer` channel (which keeps frame order equal to submission order)
/// and a reader completing in-flight contexts head-first. Both hold a
/// weak handle to the cluster; a dead cluster turns their callbacks into
/// silent no-ops.
pub(crate) struct PooledConnection {
    pub(crate) id: ConnectionId,
    pub(crate) host: Host,
    /// Encoded frames queued for the writer task.
    pub(crate) writer: mpsc::UnboundedSender<Vec<u8>>,
    /// Latest handshake reply; superseded atomically on re-handshake.
    pub(crate) handshake: Option<HandshakeReply>,
    /// Mirror of the cluster-wide readable-secondary flag.
    pub(crate) readable_secondary: bool,
    pub(crate) closed: bool,
    /// Commands whose replies have not yet arrived, in submission order.
    pub(crate) in_flight: VecDeque<CommandContext>,
    pub(crate) reader_task: JoinHandle<()>,
    pub(crate) writer_task: JoinHandle<()>,
}

impl ClusterCore {
    /// Opens a connection to `host` and appends it to the pool.
    ///
    /// Establishes the transport, performs the initial handshake (with
    /// client metadata) directly on the stream, then hands the stream to
    /// the reader/writer tasks and registers the entry. On any failure
    /// (connect, TLS, handshake) nothing is left behind and the error is
    /// wrapped in [`Error::UnableToConnect`].
    pub(crate) async fn open_connection(&self, host: &Host) -> Result<ConnectionId> {
        let settings = &self.settings;
        let attempt = tokio::time::timeout(settings.connect_timeout, async {
            let mut stream = transport::connect(host, settings.tls.as_ref()).await?;

            let command = build_handshake_command(true, settings.app_name.as_deref());
            let frame = JsonCodec::encode_command(&command)?;
            transport::write_frame(&mut stream, &frame).await?;
            let reply = JsonCodec::decode_reply(&transport::read_frame(&mut stream).await?)?;
            if !reply.ok {
                return Err(Error::HandshakeFailed(
                    reply
                        .error
                        .unwrap_or_else(|| "handshake rejected".to_string()),
                ));
            }
            let body = reply
                .body
                .ok_or_else(|| Error::HandshakeFailed("handshake reply has no body".to_string()))?;
            let handshake = HandshakeReply::from_document(&body)?;
            Ok((stream, handshake))
        })
        .await;

        let (stream, handshake) = match attempt {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => return Err(e.into_connect_failure()),
            Err(_) => {
                return Err(Error::Connection(format!("timed out connecting to {host}"))
                    .into_connect_failure())
            }
        };

        let id = next_connection_id();
        let (read_half, write_half) = tokio::io::split(stream);
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let reader_task = spawn_reader(self.weak(), id, read_half);
        let writer_task = spawn_writer(self.weak(), id, write_half, writer_rx);

        let mut state = self.state.lock().await;
        if state.shutting_down {
            reader_task.abort();
            writer_task.abort();
            return Err(Error::ClusterClosed);
        }
        state.registry.mark_discovered(host.clone());
        state.registry.fold_handshake(&handshake);
        let readable_secondary = state.readable_secondary;
        info!(
            %host,
            connection = id,
            is_master = handshake.is_master,
            read_only = handshake.read_only,
            "connection established"
        );
        state.pool.append(PooledConnection {
            id,
            host: host.clone(),
            writer: writer_tx,
            handshake: Some(handshake),
            readable_secondary,
            closed: false,
            in_flight: VecDeque::new(),
            reader_task,
            writer_task,
        });
        Ok(id)
    }
}

/// Reader task: completes in-flight contexts as reply frames arrive and
/// fires the eviction path when the transport closes.
fn spawn_reader(
    core: Weak<ClusterCore>,
    id: ConnectionId,
    mut read_half: ReadHalf<ClientStream>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match transport::read_frame(&mut read_half).await {
                Ok(frame) => {
                    let Some(core) = core.upgrade() else { return };
                    match JsonCodec::decode_reply(&frame) {
                        Ok(reply) => core.handle_reply(id, reply).await,
                        Err(e) => {
                            report_closed(core, id, e);
                            return;
                        }
                    }
                }
                Err(e) => {
                    let Some(core) = core.upgrade() else { return };
                    report_closed(core, id, e);
                    return;
                }
            }
        }
    })
}

/// Writer task: serializes all frame writes for one connection. The
/// channel closing (pool entry dropped) is the normal exit.
fn spawn_writer(
    core: Weak<ClusterCore>,
    id: ConnectionId,
    mut write_half: WriteHalf<ClientStream>,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if let Err(e) = transport::write_frame(&mut write_half, &frame).await {
                let Some(core) = core.upgrade() else { return };
                report_closed(core, id, e);
                return;
            }
        }
        debug!(connection = id, "writer channel closed");
        let _ = write_half.shutdown().await;
    })
}

/// Hands a close event to the eviction path on a detached task. The
/// eviction path aborts both of the connection's tasks, so the reporting
/// task must not be one of them.
fn report_closed(core: std::sync::Arc<ClusterCore>, id: ConnectionId, cause: Error) {
    tokio::spawn(async move {
        core.handle_connection_closed(id, cause).await;
    });
}
