//! Byte streams a [`Session`](super::Session) can run over.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore};
use tracing::debug;

use crate::error::{Error, Result};

/// Byte stream an IMAP client can be layered on.
pub trait ImapStream: AsyncRead + AsyncWrite + Unpin + Debug + Send + 'static {}

impl<T> ImapStream for T where T: AsyncRead + AsyncWrite + Unpin + Debug + Send + 'static {}

/// Opens a fresh stream to the IMAP server.
pub trait Connector: Send + Sync {
    type Stream: ImapStream;

    fn connect(&self) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// Implicit TLS (IMAPS) with the Mozilla root set.
#[derive(Clone)]
pub struct TlsConnector {
    host: String,
    port: u16,
    server_name: ServerName<'static>,
    tls: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Config(format!("TLS setup failed: {e}")))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| Error::Config(format!("invalid IMAP host '{host}': {e}")))?;

        Ok(Self {
            host: host.to_string(),
            port,
            server_name,
            tls: tokio_rustls::TlsConnector::from(Arc::new(config)),
        })
    }
}

impl Connector for TlsConnector {
    type Stream = TlsStream<TcpStream>;

    async fn connect(&self) -> Result<Self::Stream> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| Error::Transport(format!("connect to {}:{}: {e}", self.host, self.port)))?;
        let stream = self
            .tls
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(|e| Error::Transport(format!("TLS handshake with {}: {e}", self.host)))?;
        debug!(host = %self.host, port = self.port, "TLS connection established");
        Ok(stream)
    }
}
