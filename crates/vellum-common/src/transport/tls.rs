use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::error::{Error, Result};
use crate::host::Host;

/// TLS settings for connections to deployment members.
///
/// With defaults, server certificates are validated against the bundled
/// webpki roots and the SNI name is the host's address. A private CA can
/// be appended from a PEM bundle, and the SNI name overridden for
/// deployments addressed by IP.
#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    /// PEM bundle of additional root certificates.
    pub ca_file: Option<PathBuf>,
    /// Name presented for SNI and certificate validation, when it differs
    /// from the host's address.
    pub sni_host: Option<String>,
}

/// Performs the TLS handshake over an established TCP stream.
pub(crate) async fn wrap(
    stream: TcpStream,
    host: &Host,
    settings: &TlsSettings,
) -> Result<TlsStream<TcpStream>> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = &settings.ca_file {
        let pem = std::fs::read(path)
            .map_err(|e| Error::Tls(format!("reading CA bundle {}: {e}", path.display())))?;
        for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
            let cert = cert
                .map_err(|e| Error::Tls(format!("parsing CA bundle {}: {e}", path.display())))?;
            roots
                .add(cert)
                .map_err(|e| Error::Tls(format!("adding CA certificate: {e}")))?;
        }
    }

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let name = settings
        .sni_host
        .clone()
        .unwrap_or_else(|| host.address.clone());
    let server_name = ServerName::try_from(name.clone())
        .map_err(|_| Error::Tls(format!("invalid server name '{name}'")))?;

    let connector = TlsConnector::from(Arc::new(config));
    connector
        .connect(server_name, stream)
        .await
        .map_err(|e| Error::Tls(format!("handshake with {host}: {e}")))
}
