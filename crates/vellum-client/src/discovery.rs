use tracing::{debug, warn};

use vellum_common::protocol::build_handshake_command;
use vellum_common::{Error, HandshakeReply, Result};

use crate::cluster::ClusterCore;
use crate::connection::ConnectionId;
use crate::dispatcher::CommandContext;

impl ClusterCore {
    /// One discovery sweep.
    ///
    /// Re-handshakes every pooled connection (without client metadata;
    /// that is sent only when a connection is first opened), folds each
    /// successful reply into the registry and stores it on the
    /// connection. A connection whose re-handshake fails leaves the pool
    /// and its host leaves the discovered set, but is *not* timed out,
    /// so the host stays eligible. After all handshakes settle the
    /// timed-out set is reset, giving previously failed hosts another
    /// chance on the next routing pass.
    ///
    /// Commands that were in flight on connections dropped here are
    /// re-dispatched (or failed, if non-retryable) once the sweep's
    /// bookkeeping is done.
    pub(crate) async fn rediscover(&self) -> Result<()> {
        let extracted = {
            let _sweep = self.sweep_lock.lock().await;

            let snapshot: Vec<(ConnectionId, vellum_common::Host)> = {
                let state = self.state.lock().await;
                if state.shutting_down {
                    return Err(Error::ClusterClosed);
                }
                state
                    .pool
                    .iter()
                    .map(|entry| (entry.id, entry.host.clone()))
                    .collect()
            };
            debug!(connections = snapshot.len(), "discovery sweep started");

            let checks = snapshot.into_iter().map(|(id, host)| async move {
                let result = self.rehandshake(id).await;
                (id, host, result)
            });
            let results = futures::future::join_all(checks).await;

            let mut extracted: Vec<CommandContext> = Vec::new();
            let mut state = self.state.lock().await;
            let mut refreshed = 0usize;
            for (id, host, result) in results {
                match result {
                    Ok(handshake) => {
                        state.registry.fold_handshake(&handshake);
                        if let Some(entry) = state.pool.find_mut(id) {
                            entry.handshake = Some(handshake);
                            refreshed += 1;
                        }
                    }
                    Err(e) => {
                        warn!(%host, connection = id, error = %e, "re-handshake failed");
                        if let Some(mut entry) = state.pool.remove(id) {
                            entry.closed = true;
                            // A timed-out re-handshake can leave the
                            // transport alive; dropping the handles only
                            // detaches the tasks.
                            entry.reader_task.abort();
                            entry.writer_task.abort();
                            for mut ctx in std::mem::take(&mut entry.in_flight) {
                                if ctx.command.retry {
                                    ctx.sent = false;
                                    extracted.push(ctx);
                                } else {
                                    ctx.complete(Err(Error::ConnectionClosed(e.to_string())));
                                }
                            }
                        }
                        if !state.pool.contains_host(&host) {
                            state.registry.remove_discovered(&host);
                        }
                    }
                }
            }
            state.registry.reset_timeouts();
            debug!(
                refreshed,
                known = state.registry.known().len(),
                discovered = state.registry.discovered().len(),
                "discovery sweep finished"
            );
            extracted
        };

        // Outside the sweep guard: re-dispatching goes back through the
        // router, which may itself want a sweep.
        for ctx in extracted {
            self.redispatch(ctx).await;
        }
        Ok(())
    }

    /// Re-handshakes one pooled connection through its ordinary dispatch
    /// path, bounded by the connect timeout.
    async fn rehandshake(&self, conn_id: ConnectionId) -> Result<HandshakeReply> {
        let command = build_handshake_command(false, self.settings.app_name.as_deref());
        let (ctx, receiver) = CommandContext::channel(command);
        self.write_context(conn_id, ctx).await;

        let reply = tokio::time::timeout(self.settings.connect_timeout, receiver)
            .await
            .map_err(|_| Error::HandshakeFailed("re-handshake timed out".to_string()))?
            .map_err(|_| Error::ConnectionClosed("completion slot dropped".to_string()))??;

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
        HandshakeReply::from_document(&body)
    }

    /// Starts the periodic discovery schedule. Called once the first
    /// sweep has succeeded; every tick re-reads the heartbeat frequency
    /// so knob changes take effect on the next interval.
    pub(crate) async fn start_heartbeat(&self) {
        let weak = self.weak();
        let task = tokio::spawn(async move {
            loop {
                let frequency = {
                    let Some(core) = weak.upgrade() else { return };
                    let state = core.state.lock().await;
                    if state.shutting_down {
                        return;
                    }
                    state.heartbeat_frequency
                };
                tokio::time::sleep(frequency).await;

                let Some(core) = weak.upgrade() else { return };
                if let Err(e) = core.rediscover().await {
                    // The next tick is scheduled regardless of outcome.
                    warn!(error = %e, "scheduled discovery sweep failed");
                }
            }
        });
        self.state.lock().await.heartbeat_task = Some(task);
    }
}
