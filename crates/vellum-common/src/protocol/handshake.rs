use serde_json::{json, Value};

use crate::error::{Error, Result};

use super::Command;

/// Database the handshake command is addressed to.
pub const HANDSHAKE_DATABASE: &str = "admin";

/// Typed view of a handshake reply document.
///
/// A handshake is exchanged on every new connection and re-exchanged on
/// every discovery sweep. The reply tells the core what the connection can
/// do (`is_master`, `read_only`) and which peers the server knows about
/// (`hosts`, `passives`). Fields beyond these four are opaque to the core
/// and kept in `raw`.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeReply {
    /// Is this the writable primary of its replica set?
    pub is_master: bool,
    /// Does this member reject writes?
    pub read_only: bool,
    /// Electable peers the server knows about, as unparsed host strings.
    pub hosts: Vec<String>,
    /// Passive (non-electable, read-capable) peers, as unparsed strings.
    pub passives: Vec<String>,
    /// The full reply document.
    pub raw: Value,
}

impl HandshakeReply {
    /// Parses a handshake reply document.
    ///
    /// `ismaster` is the one field that must be present and boolean; a
    /// document without it is a malformed handshake. `readOnly` defaults
    /// to `false`, the peer lists default to empty. Entries of `hosts` /
    /// `passives` that are not strings are dropped here; entries that are
    /// strings but fail to parse as hosts are left for the registry to
    /// skip, so one bad entry never poisons the reply.
    pub fn from_document(doc: &Value) -> Result<Self> {
        let is_master = doc
            .get("ismaster")
            .and_then(Value::as_bool)
            .ok_or_else(|| Error::HandshakeFailed("reply has no ismaster field".to_string()))?;
        let read_only = doc
            .get("readOnly")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(HandshakeReply {
            is_master,
            read_only,
            hosts: string_list(doc.get("hosts")),
            passives: string_list(doc.get("passives")),
            raw: doc.clone(),
        })
    }

    /// All peer host strings carried by the reply, actives then passives.
    pub fn peer_strings(&self) -> impl Iterator<Item = &str> {
        self.hosts
            .iter()
            .chain(self.passives.iter())
            .map(String::as_str)
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Builds the handshake command.
///
/// The client metadata document (application name, driver name and
/// version, platform) is attached only on the initial handshake of a new
/// connection; re-handshakes issued by the discovery loop send the bare
/// command.
pub fn build_handshake_command(with_client_metadata: bool, app_name: Option<&str>) -> Command {
    let mut body = json!({"handshake": 1});
    if with_client_metadata {
        body["client"] = json!({
            "application": {"name": app_name.unwrap_or("")},
            "driver": {
                "name": "vellum",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "os": {"type": std::env::consts::OS},
        });
    }
    Command::new(HANDSHAKE_DATABASE, body).with_retry(false)
}
