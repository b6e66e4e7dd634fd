use crate::error::Result;
use crate::protocol::{Command, ServerReply};

/// JSON codec for command and reply frames.
///
/// Frames the transport moves are JSON documents; this codec maps them to
/// and from the protocol envelope types.
///
/// # Example
///
/// ```
/// use vellum_common::transport::JsonCodec;
/// use vellum_common::{Command, ServerReply};
/// use serde_json::json;
///
/// let cmd = Command::new("inventory", json!({"find": "parts"}));
/// let encoded = JsonCodec::encode_command(&cmd).unwrap();
/// let decoded = JsonCodec::decode_command(&encoded).unwrap();
/// assert_eq!(decoded.id, cmd.id);
/// ```
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a command to frame bytes.
    pub fn encode_command(command: &Command) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(command)?)
    }

    /// Decode a command from frame bytes.
    pub fn decode_command(data: &[u8]) -> Result<Command> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Encode a reply to frame bytes.
    pub fn encode_reply(reply: &ServerReply) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(reply)?)
    }

    /// Decode a reply from frame bytes.
    pub fn decode_reply(data: &[u8]) -> Result<ServerReply> {
        Ok(serde_json::from_slice(data)?)
    }
}
