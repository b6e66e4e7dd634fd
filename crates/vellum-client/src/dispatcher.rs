use std::future::Future;
use std::pin::Pin;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use vellum_common::transport::JsonCodec;
use vellum_common::{Command, Error, Result, ServerReply};

use crate::cluster::ClusterCore;
use crate::connection::ConnectionId;

/// One submitted command: the payload plus its completion slot.
///
/// The slot is a one-shot channel consumed on completion, so a context
/// fires at most once by construction, however many times the command
/// itself is re-dispatched.
pub(crate) struct CommandContext {
    pub(crate) command: Command,
    /// Cleared when a dying connection hands the context back for
    /// resend, so the command is never double-counted as delivered.
    pub(crate) sent: bool,
    slot: oneshot::Sender<Result<ServerReply>>,
}

impl CommandContext {
    /// Creates a context and the receiver its completion will arrive on.
    pub(crate) fn channel(command: Command) -> (Self, oneshot::Receiver<Result<ServerReply>>) {
        let (slot, receiver) = oneshot::channel();
        (
            Self {
                command,
                sent: false,
                slot,
            },
            receiver,
        )
    }

    /// Fires the completion slot. The receiver may already be dropped;
    /// that is the caller abandoning the command, not an error here.
    pub(crate) fn complete(self, result: Result<ServerReply>) {
        let _ = self.slot.send(result);
    }
}

impl ClusterCore {
    /// Dispatches a context: obtains a connection via the router, then
    /// queues and writes the command.
    ///
    /// Routing asks for a readable connection first and falls back to a
    /// writable one, so read commands keep working while only a
    /// secondary is reachable. Every failure mode ends in the context's
    /// slot; this function never loses a context.
    pub(crate) async fn dispatch(&self, ctx: CommandContext) {
        let conn_id = match self.get_connection(false).await {
            Ok(id) => id,
            Err(_) => match self.get_connection(true).await {
                Ok(id) => id,
                Err(e) => {
                    ctx.complete(Err(e));
                    return;
                }
            },
        };
        self.write_context(conn_id, ctx).await;
    }

    /// Boxed re-entry into [`dispatch`](Self::dispatch) for the resend
    /// paths, which sit inside the dispatch call graph themselves.
    pub(crate) fn redispatch<'a>(
        &'a self,
        ctx: CommandContext,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(self.dispatch(ctx))
    }

    /// Appends the context to the connection's in-flight queue and hands
    /// the encoded frame to its writer. A connection that closed between
    /// selection and write fails the slot here.
    pub(crate) async fn write_context(&self, conn_id: ConnectionId, mut ctx: CommandContext) {
        debug_assert!(!ctx.sent, "context already queued on a connection");
        let mut state = self.state.lock().await;
        let Some(entry) = state.pool.find_mut(conn_id) else {
            ctx.complete(Err(Error::ConnectionClosed(
                "connection no longer pooled".to_string(),
            )));
            return;
        };
        if entry.closed {
            ctx.complete(Err(Error::ConnectionClosed(
                "connection is closed".to_string(),
            )));
            return;
        }
        let frame = match JsonCodec::encode_command(&ctx.command) {
            Ok(frame) => frame,
            Err(e) => {
                ctx.complete(Err(e));
                return;
            }
        };
        ctx.sent = true;
        entry.in_flight.push_back(ctx);
        if entry.writer.send(frame).is_err() {
            // Writer task already gone; take back the context queued a
            // moment ago (the lock was never released in between).
            entry.closed = true;
            if let Some(ctx) = entry.in_flight.pop_back() {
                ctx.complete(Err(Error::ConnectionClosed(
                    "write channel closed".to_string(),
                )));
            }
        }
    }

    /// Routes a reply frame to the head of the connection's in-flight
    /// queue. Replies follow submission order on one connection, so
    /// head-first consumption pairs each reply with its command.
    pub(crate) async fn handle_reply(&self, conn_id: ConnectionId, reply: ServerReply) {
        let mut state = self.state.lock().await;
        let Some(entry) = state.pool.find_mut(conn_id) else {
            debug!(
                connection = conn_id,
                reply = reply.id,
                "reply for a connection no longer pooled, dropping"
            );
            return;
        };
        match entry.in_flight.pop_front() {
            Some(ctx) => {
                if ctx.command.id != reply.id {
                    warn!(
                        connection = conn_id,
                        expected = ctx.command.id,
                        received = reply.id,
                        "reply out of order with in-flight queue"
                    );
                }
                ctx.complete(Ok(reply));
            }
            None => warn!(connection = conn_id, reply = reply.id, "unsolicited reply"),
        }
    }

    /// Eviction path for a transport-level close.
    ///
    /// Removes the pool entry by identity (no-op when already gone),
    /// stops both of its transport tasks, takes ownership of its
    /// in-flight queue, fails non-retryable contexts with the transport
    /// error, then runs a discovery sweep. On sweep success the
    /// retryable contexts are re-dispatched; on sweep failure their
    /// slots fail with the sweep's error. Each context thus completes
    /// exactly once, one way or the other.
    ///
    /// Aborts the connection's reader and writer tasks, so it must never
    /// run *on* one of them; the tasks hand their close events off to a
    /// detached task instead of calling in directly.
    pub(crate) async fn handle_connection_closed(&self, conn_id: ConnectionId, cause: Error) {
        let (host, contexts, shutting_down) = {
            let mut state = self.state.lock().await;
            let Some(mut entry) = state.pool.remove(conn_id) else {
                return;
            };
            entry.closed = true;
            entry.reader_task.abort();
            entry.writer_task.abort();
            let contexts = std::mem::take(&mut entry.in_flight);
            if !state.pool.contains_host(&entry.host) {
                state.registry.remove_discovered(&entry.host);
            }
            (entry.host.clone(), contexts, state.shutting_down)
        };
        warn!(
            %host,
            connection = conn_id,
            error = %cause,
            in_flight = contexts.len(),
            "pooled connection closed"
        );

        if shutting_down {
            for ctx in contexts {
                ctx.complete(Err(Error::ClusterClosed));
            }
            return;
        }

        let mut resend = Vec::new();
        for mut ctx in contexts {
            if ctx.command.retry {
                ctx.sent = false;
                resend.push(ctx);
            } else {
                ctx.complete(Err(Error::ConnectionClosed(cause.to_string())));
            }
        }

        match self.rediscover().await {
            Ok(()) => {
                for ctx in resend {
                    self.redispatch(ctx).await;
                }
            }
            Err(e) => {
                for ctx in resend {
                    ctx.complete(Err(e.clone()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterCore;
    use crate::connection::test_support::{attach_responder, stub_entry, stub_entry_with_writer};
    use crate::settings::ConnectionSettings;
    use serde_json::json;

    fn test_core() -> std::sync::Arc<ClusterCore> {
        ClusterCore::new(ConnectionSettings::from_seeds(&["127.0.0.1:1"]).unwrap())
    }

    #[tokio::test]
    async fn test_write_context_on_missing_connection_fails_slot() {
        let core = test_core();
        let (ctx, rx) = CommandContext::channel(Command::new("db", json!({"ping": 1})));
        core.write_context(99, ctx).await;
        let result = rx.await.unwrap();
        assert!(matches!(result, Err(Error::ConnectionClosed(_))));
    }

    #[tokio::test]
    async fn test_write_context_queues_and_writes() {
        let core = test_core();
        let (entry, mut frames) = stub_entry_with_writer(7, "a:1", true, false);
        {
            let mut state = core.state.lock().await;
            state.registry.mark_discovered(entry.host.clone());
            state.pool.append(entry);
        }

        let command = Command::new("db", json!({"ping": 1}));
        let command_id = command.id;
        let (ctx, _rx) = CommandContext::channel(command);
        core.write_context(7, ctx).await;

        let frame = frames.recv().await.unwrap();
        let written = JsonCodec::decode_command(&frame).unwrap();
        assert_eq!(written.id, command_id);

        let mut state = core.state.lock().await;
        let entry = state.pool.find_mut(7).unwrap();
        assert_eq!(entry.in_flight.len(), 1);
        assert!(entry.in_flight.front().unwrap().sent);
    }

    #[tokio::test]
    async fn test_write_context_on_dead_writer_fails_slot_and_dequeues() {
        let core = test_core();
        // stub_entry drops the writer's receiver immediately.
        let entry = stub_entry(7, "a:1", true, false);
        {
            let mut state = core.state.lock().await;
            state.registry.mark_discovered(entry.host.clone());
            state.pool.append(entry);
        }

        let (ctx, rx) = CommandContext::channel(Command::new("db", json!({"ping": 1})));
        core.write_context(7, ctx).await;

        let result = rx.await.unwrap();
        assert!(matches!(result, Err(Error::ConnectionClosed(_))));

        let mut state = core.state.lock().await;
        let entry = state.pool.find_mut(7).unwrap();
        assert!(entry.in_flight.is_empty(), "failed context must not linger");
        assert!(entry.closed);
    }

    #[tokio::test]
    async fn test_reply_completes_head_of_queue() {
        let core = test_core();
        let (entry, _frames) = stub_entry_with_writer(7, "a:1", true, false);
        {
            let mut state = core.state.lock().await;
            state.registry.mark_discovered(entry.host.clone());
            state.pool.append(entry);
        }

        let first = Command::new("db", json!({"n": 1}));
        let second = Command::new("db", json!({"n": 2}));
        let (first_id, second_id) = (first.id, second.id);
        let (ctx1, rx1) = CommandContext::channel(first);
        let (ctx2, rx2) = CommandContext::channel(second);
        core.write_context(7, ctx1).await;
        core.write_context(7, ctx2).await;

        core.handle_reply(7, ServerReply::success(first_id, json!({"ok": 1})))
            .await;
        core.handle_reply(7, ServerReply::success(second_id, json!({"ok": 2})))
            .await;

        assert_eq!(rx1.await.unwrap().unwrap().id, first_id);
        assert_eq!(rx2.await.unwrap().unwrap().id, second_id);
    }

    #[tokio::test]
    async fn test_close_fails_non_retryable_with_transport_error() {
        let core = test_core();
        let (entry, _frames) = stub_entry_with_writer(7, "a:1", true, false);
        {
            let mut state = core.state.lock().await;
            state.registry.mark_discovered(entry.host.clone());
            state.pool.append(entry);
        }

        let command = Command::new("db", json!({"debit": 100})).with_retry(false);
        let (ctx, rx) = CommandContext::channel(command);
        core.write_context(7, ctx).await;

        core.handle_connection_closed(7, Error::Connection("reset by peer".to_string()))
            .await;

        let result = rx.await.unwrap();
        match result {
            Err(Error::ConnectionClosed(msg)) => assert!(msg.contains("reset by peer")),
            other => panic!("expected ConnectionClosed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_resends_retryable_to_surviving_connection() {
        let core = test_core();

        // Connection 1 will die with a command in flight; connection 2
        // answers both the sweep's re-handshake and the resent command.
        let (dying, _dying_frames) = stub_entry_with_writer(1, "a:1", true, false);
        let (survivor, survivor_frames) = stub_entry_with_writer(2, "b:1", true, false);
        {
            let mut state = core.state.lock().await;
            state.registry.mark_discovered(dying.host.clone());
            state.registry.mark_discovered(survivor.host.clone());
            state.pool.append(dying);
            state.pool.append(survivor);
        }
        attach_responder(&core, 2, survivor_frames, true, false);

        let command = Command::new("db", json!({"insert": "docs"}));
        let (ctx, rx) = CommandContext::channel(command);
        core.write_context(1, ctx).await;

        core.handle_connection_closed(1, Error::Connection("reset".to_string()))
            .await;

        let reply = rx.await.unwrap().unwrap();
        assert!(reply.ok);

        let state = core.state.lock().await;
        assert!(state.pool.find(1).is_none());
        assert!(!state.registry.discovered().contains(&"a:1".parse().unwrap()));
        assert!(state.registry.discovered().contains(&"b:1".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let core = test_core();
        let (entry, _frames) = stub_entry_with_writer(7, "a:1", true, false);
        {
            let mut state = core.state.lock().await;
            state.registry.mark_discovered(entry.host.clone());
            state.pool.append(entry);
        }

        core.handle_connection_closed(7, Error::Connection("reset".to_string()))
            .await;
        // Second close for the same identity: entry already gone, no-op.
        core.handle_connection_closed(7, Error::Connection("reset".to_string()))
            .await;

        let state = core.state.lock().await;
        assert_eq!(state.pool.len(), 0);
    }
}
