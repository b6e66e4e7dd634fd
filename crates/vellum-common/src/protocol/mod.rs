//! Vellum Protocol Definitions
//!
//! Core protocol types shared by the client: command and reply envelopes,
//! the typed handshake reply, and request id generation.
//!
//! # Protocol types
//!
//! - **[`Command`]**: a request addressed to a database, carrying a JSON
//!   body, a unique request id, and dispatch options (retryability,
//!   session).
//! - **[`ServerReply`]**: the server's answer, matched to a command by
//!   request id.
//! - **[`HandshakeReply`]**: the typed view of a handshake reply document;
//!   the cluster core derives capabilities and peer hosts from it.
//!
//! # Request ids
//!
//! Every command gets a unique `u64` id combining a timestamp with an
//! atomic counter, so ids stay unique across process restarts as well as
//! within one runtime.

pub mod commands;
pub mod handshake;
pub mod replies;

pub use commands::{Command, RequestId};
pub use handshake::{build_handshake_command, HandshakeReply, HANDSHAKE_DATABASE};
pub use replies::ServerReply;
