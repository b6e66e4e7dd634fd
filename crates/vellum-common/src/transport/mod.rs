//! Framed transport to deployment members.
//!
//! Messages are length-prefixed JSON frames:
//!
//! ```text
//! [4-byte length as u32 big-endian] [JSON data]
//! ```
//!
//! [`connect`] dials a host (plain TCP, or TLS when [`TlsSettings`] are
//! given) and returns a boxed duplex stream; [`read_frame`] and
//! [`write_frame`] move whole frames over any async stream. The codec in
//! [`codec`] maps frames to and from protocol types.

pub mod codec;
pub mod tcp;
pub mod tls;

pub use codec::JsonCodec;
pub use tcp::{connect, read_frame, write_frame, ClientStream, MAX_FRAME_SIZE};
pub use tls::TlsSettings;
