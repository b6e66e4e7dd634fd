use serde::{Deserialize, Serialize};

use super::RequestId;

/// A server's reply to one command.
///
/// Replies are matched to commands by request id. A reply either carries a
/// result document (`ok == true`) or an error message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerReply {
    pub id: RequestId,
    pub ok: bool,
    pub body: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl ServerReply {
    pub fn success(id: RequestId, body: serde_json::Value) -> Self {
        ServerReply {
            id,
            ok: true,
            body: Some(body),
            error: None,
        }
    }

    pub fn failure(id: RequestId, error: impl Into<String>) -> Self {
        ServerReply {
            id,
            ok: false,
            body: None,
            error: Some(error.into()),
        }
    }
}
