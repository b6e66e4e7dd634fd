//! Vellum Common Types and Transport
//!
//! This crate provides the protocol definitions and the framed TCP transport
//! shared by the Vellum client components.
//!
//! # Overview
//!
//! Vellum is a client library for a distributed document-oriented database.
//! A deployment is a set of server instances (a replica set or a sharded
//! cluster); the client keeps a pool of connections to them and routes
//! commands by capability. This crate contains the pieces every component
//! agrees on:
//!
//! - **Protocol layer**: [`Command`] and [`ServerReply`] envelopes, the
//!   typed [`HandshakeReply`], request id generation, and the error taxonomy.
//! - **Transport layer**: length-prefixed JSON frames over TCP, with
//!   optional TLS.
//!
//! # Wire format
//!
//! Every message is a 4-byte big-endian length prefix followed by a JSON
//! document:
//!
//! ```text
//! [4-byte length] [JSON data]
//! ```
//!
//! # Example
//!
//! ```
//! use vellum_common::{Command, ServerReply};
//! use serde_json::json;
//!
//! let command = Command::new("inventory", json!({"find": "parts"}));
//! let reply = ServerReply::success(command.id, json!({"cursor": []}));
//! assert!(reply.ok);
//! ```

pub mod error;
pub mod host;
pub mod protocol;
pub mod transport;

pub use error::{Error, Result};
pub use host::{Host, DEFAULT_PORT};
pub use protocol::{Command, HandshakeReply, RequestId, ServerReply};
