//! In-process mock deployment members for integration tests.
//!
//! Each [`MockServer`] speaks the framed JSON wire protocol on a loopback
//! listener. Handshake commands are answered from the server's current
//! [`MockBehavior`]; other commands are recorded and answered with
//! `{"ok": 1}`, or held unanswered when `hold_replies` is set (to build
//! up an in-flight queue before killing the server).

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use vellum_common::transport::{read_frame, write_frame, JsonCodec};
use vellum_common::{Command, Host, ServerReply};

/// What the mock reports about itself on each handshake.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub is_master: bool,
    pub read_only: bool,
    pub hosts: Vec<String>,
    pub passives: Vec<String>,
    /// When set, non-handshake commands are recorded but never answered.
    pub hold_replies: bool,
}

impl MockBehavior {
    pub fn primary() -> Self {
        Self {
            is_master: true,
            read_only: false,
            hosts: Vec::new(),
            passives: Vec::new(),
            hold_replies: false,
        }
    }

    pub fn secondary() -> Self {
        Self {
            is_master: false,
            read_only: true,
            hosts: Vec::new(),
            passives: Vec::new(),
            hold_replies: false,
        }
    }
}

pub struct MockServer {
    addr: SocketAddr,
    behavior: Arc<Mutex<MockBehavior>>,
    received: Arc<Mutex<Vec<Command>>>,
    accepted: Arc<AtomicUsize>,
    listener_task: JoinHandle<()>,
    conn_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl MockServer {
    pub async fn start(behavior: MockBehavior) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let behavior = Arc::new(Mutex::new(behavior));
        let received = Arc::new(Mutex::new(Vec::new()));
        let accepted = Arc::new(AtomicUsize::new(0));
        let conn_tasks = Arc::new(Mutex::new(Vec::new()));

        let listener_task = {
            let behavior = behavior.clone();
            let received = received.clone();
            let accepted = accepted.clone();
            let conn_tasks = conn_tasks.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((socket, _)) = listener.accept().await else {
                        return;
                    };
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let task = tokio::spawn(serve_connection(
                        socket,
                        behavior.clone(),
                        received.clone(),
                    ));
                    conn_tasks.lock().await.push(task);
                }
            })
        };

        MockServer {
            addr,
            behavior,
            received,
            accepted,
            listener_task,
            conn_tasks,
        }
    }

    pub fn host(&self) -> Host {
        Host::new("127.0.0.1", self.addr.port())
    }

    pub fn host_string(&self) -> String {
        self.host().to_string()
    }

    pub async fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().await = behavior;
    }

    pub async fn set_role(&self, is_master: bool, read_only: bool) {
        let mut behavior = self.behavior.lock().await;
        behavior.is_master = is_master;
        behavior.read_only = read_only;
    }

    /// Non-handshake commands seen so far, in arrival order.
    pub async fn received(&self) -> Vec<Command> {
        self.received.lock().await.clone()
    }

    /// Number of accepted TCP connections.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Polls until at least `n` non-handshake commands have arrived.
    pub async fn wait_received(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if self.received.lock().await.len() >= n {
                return;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("mock server saw {} commands, expected {n}", self.received.lock().await.len());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stops listening and severs every open connection.
    pub async fn stop(&self) {
        self.listener_task.abort();
        for task in self.conn_tasks.lock().await.drain(..) {
            task.abort();
        }
    }
}

async fn serve_connection(
    mut socket: TcpStream,
    behavior: Arc<Mutex<MockBehavior>>,
    received: Arc<Mutex<Vec<Command>>>,
) {
    loop {
        let Ok(frame) = read_frame(&mut socket).await else {
            return;
        };
        let Ok(command) = JsonCodec::decode_command(&frame) else {
            return;
        };

        let reply = if command.body.get("handshake").is_some() {
            let behavior = behavior.lock().await;
            let body = json!({
                "ismaster": behavior.is_master,
                "readOnly": behavior.read_only,
                "hosts": behavior.hosts,
                "passives": behavior.passives,
            });
            Some(ServerReply::success(command.id, body))
        } else {
            received.lock().await.push(command.clone());
            let hold = behavior.lock().await.hold_replies;
            if hold {
                None
            } else {
                Some(ServerReply::success(command.id, json!({"ok": 1})))
            }
        };

        if let Some(reply) = reply {
            let frame = JsonCodec::encode_reply(&reply).unwrap();
            if write_frame(&mut socket, &frame).await.is_err() {
                return;
            }
        }
    }
}

/// A host that refuses connections: the port was bound once and released.
pub async fn dead_host() -> Host {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Host::new("127.0.0.1", port)
}

/// Routes test logs through tracing; `RUST_LOG` adjusts verbosity.
pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
}
