use std::io;
use std::net::ToSocketAddrs;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

use crate::error::{Error, Result};
use crate::host::Host;

use super::tls::{self, TlsSettings};

/// Largest frame the transport will read. Frames above this are treated
/// as a protocol violation rather than an allocation request.
pub const MAX_FRAME_SIZE: usize = 48 * 1024 * 1024;

/// A duplex stream to one deployment member, plain or TLS.
pub enum ClientStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for ClientStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ClientStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            ClientStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ClientStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            ClientStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            ClientStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ClientStream::Plain(s) => Pin::new(s).poll_flush(cx),
            ClientStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ClientStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            ClientStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Connects to a host and returns the established stream.
///
/// The host's address may resolve to multiple socket addresses; each is
/// tried in turn until one accepts. When `tls` is given, the TLS
/// handshake is part of establishment: a stream is only returned once it
/// is ready for frames.
pub async fn connect(host: &Host, tls: Option<&TlsSettings>) -> Result<ClientStream> {
    let socket_addrs = (host.address.as_str(), host.port)
        .to_socket_addrs()
        .map_err(|e| Error::Connection(format!("invalid address '{host}': {e}")))?;

    let mut last_err = None;
    for socket_addr in socket_addrs {
        match TcpStream::connect(&socket_addr).await {
            Ok(stream) => {
                return match tls {
                    Some(settings) => {
                        let stream = tls::wrap(stream, host, settings).await?;
                        Ok(ClientStream::Tls(Box::new(stream)))
                    }
                    None => Ok(ClientStream::Plain(stream)),
                };
            }
            Err(e) => {
                last_err = Some(e);
            }
        }
    }

    Err(Error::Connection(format!(
        "failed to connect to {}: {}",
        host,
        last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "address resolved to nothing".to_string())
    )))
}

/// Sends one frame: length prefix, then data.
pub async fn write_frame<W: AsyncWrite + Unpin>(stream: &mut W, data: &[u8]) -> Result<()> {
    let len = data.len() as u32;

    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| map_io_error(e, "writing length prefix"))?;

    stream
        .write_all(data)
        .await
        .map_err(|e| map_io_error(e, "writing frame"))?;

    stream
        .flush()
        .await
        .map_err(|e| map_io_error(e, "flushing stream"))?;

    Ok(())
}

/// Receives one frame: length prefix, then data.
///
/// Fails if the peer closes mid-frame or announces a frame larger than
/// [`MAX_FRAME_SIZE`].
pub async fn read_frame<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| map_io_error(e, "reading length prefix"))?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(Error::Serialization(format!(
            "frame too large: {len} bytes (max {MAX_FRAME_SIZE})"
        )));
    }

    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| map_io_error(e, "reading frame"))?;

    Ok(buf)
}

/// Maps I/O errors into the transport taxonomy: connection-level kinds
/// become [`Error::Connection`], everything else stays [`Error::Io`].
fn map_io_error(err: io::Error, context: &str) -> Error {
    match err.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::NotConnected => {
            Error::Connection(format!("{context}: connection lost ({err})"))
        }
        _ => Error::Io(format!("{context}: {err}")),
    }
}
