use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Unique identifier for a command.
pub type RequestId = u64;

/// Global counter for ensuring unique request ids.
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A command addressed to one database of the deployment.
///
/// The body is an arbitrary JSON document; the core treats it as opaque
/// payload and only the request id and the dispatch options matter to it.
///
/// # Fields
///
/// - `id`: unique request id; the server echoes it on the reply.
/// - `database`: name of the database the command targets.
/// - `body`: the command document.
/// - `session`: optional logical session the command runs under.
/// - `retry`: whether the core may re-issue this command on a fresh
///   connection if the original connection dies before the reply arrives.
///   Defaults to `true`; not part of the wire format.
///
/// # Example
///
/// ```
/// use vellum_common::Command;
/// use serde_json::json;
///
/// let cmd = Command::new("inventory", json!({"count": "parts"}));
/// assert!(cmd.retry);
///
/// let cmd = Command::new("billing", json!({"debit": 100})).with_retry(false);
/// assert!(!cmd.retry);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Command {
    /// Unique request identifier
    pub id: RequestId,
    /// Target database
    pub database: String,
    /// Command document
    pub body: serde_json::Value,
    /// Optional session id
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session: Option<u64>,
    /// Whether the core may transparently resend this command
    #[serde(skip, default = "retry_default")]
    pub retry: bool,
}

fn retry_default() -> bool {
    true
}

impl Command {
    /// Creates a new command with a fresh request id.
    pub fn new(database: impl Into<String>, body: serde_json::Value) -> Self {
        Command {
            id: generate_request_id(),
            database: database.into(),
            body,
            session: None,
            retry: true,
        }
    }

    /// Marks the command retryable or not.
    ///
    /// Non-retryable commands whose connection dies in flight fail with
    /// the transport error instead of being re-issued.
    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    /// Attaches a session id.
    pub fn with_session(mut self, session: u64) -> Self {
        self.session = Some(session);
        self
    }
}

/// Generates a unique request id.
///
/// Upper 32 bits: seconds since the UNIX epoch. Lower 32 bits: atomic
/// counter. Relaxed ordering is sufficient since we only need uniqueness,
/// not synchronization.
fn generate_request_id() -> RequestId {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let counter = REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed);

    (timestamp << 32) | (counter & 0xFFFF_FFFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_creation() {
        let cmd = Command::new("inventory", json!({"find": "parts"}));
        assert_eq!(cmd.database, "inventory");
        assert_eq!(cmd.body, json!({"find": "parts"}));
        assert!(cmd.session.is_none());
        assert!(cmd.retry);
    }

    #[test]
    fn test_with_retry() {
        let cmd = Command::new("db", json!({})).with_retry(false);
        assert!(!cmd.retry);
    }

    #[test]
    fn test_with_session() {
        let cmd = Command::new("db", json!({})).with_session(7);
        assert_eq!(cmd.session, Some(7));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let ids: Vec<RequestId> = (0..1000)
            .map(|_| Command::new("db", json!({})).id)
            .collect();
        let mut deduped = ids.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(ids.len(), deduped.len());
    }

    #[test]
    fn test_retry_flag_not_on_the_wire() {
        let cmd = Command::new("db", json!({"x": 1})).with_retry(false);
        let encoded = serde_json::to_vec(&cmd).unwrap();
        let decoded: Command = serde_json::from_slice(&encoded).unwrap();
        // The flag is local dispatch state; decoding yields the default.
        assert!(decoded.retry);
        assert_eq!(decoded.id, cmd.id);
        assert_eq!(decoded.body, cmd.body);
    }
}
