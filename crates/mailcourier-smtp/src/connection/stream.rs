//! Low-level SMTP stream handling.

use crate::error::{Error, Result};
use rustls::pki_types::ServerName;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

/// SMTP transport stream (plain TCP or TLS).
#[derive(Debug)]
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp(BufReader<TcpStream>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<tokio_rustls::client::TlsStream<TcpStream>>>),
}

impl SmtpStream {
    /// Whether the transport is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Reads one line, with the trailing CRLF stripped.
    ///
    /// # Errors
    ///
    /// Returns an error when the read fails; an empty line on a closed
    /// peer surfaces as `UnexpectedEof`.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = match self {
            Self::Tcp(reader) => reader.read_line(&mut line).await?,
            Self::Tls(reader) => reader.read_line(&mut line).await?,
        };
        if n == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            )));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Writes and flushes a buffer.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.write_all(data).await?;
        self.flush().await?;
        Ok(())
    }

    /// Upgrades a plain stream to TLS after a STARTTLS go-ahead.
    ///
    /// # Errors
    ///
    /// Fails when the stream is already encrypted, the hostname is not
    /// a valid TLS server name, or the handshake fails.
    pub async fn upgrade_to_tls(
        self,
        hostname: &str,
        config: Option<Arc<ClientConfig>>,
    ) -> Result<Self> {
        let tcp = match self {
            Self::Tcp(reader) => reader.into_inner(),
            Self::Tls(_) => {
                return Err(Error::NotSupported("a second TLS upgrade"));
            }
        };
        let connector = tls_connector(config);
        let server_name = ServerName::try_from(hostname.to_string())
            .map_err(|_| Error::Configuration(format!("invalid TLS hostname: {hostname}")))?;
        let tls = connector.connect(server_name, tcp).await?;
        Ok(Self::Tls(Box::new(BufReader::new(tls))))
    }
}

// The renderer and the dot-stuffing writer drive the stream through
// `AsyncWrite`; both variants are `Unpin`, so delegation is direct.
impl AsyncWrite for SmtpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Opens a plain TCP stream to the server.
///
/// # Errors
///
/// Returns an error when the connection fails.
pub async fn connect(host: &str, port: u16) -> Result<SmtpStream> {
    let stream = TcpStream::connect((host, port)).await?;
    Ok(SmtpStream::Tcp(BufReader::new(stream)))
}

/// Opens an implicit-TLS stream (TLS from the first byte).
///
/// # Errors
///
/// Returns an error when the connection or the handshake fails.
pub async fn connect_tls(
    host: &str,
    port: u16,
    config: Option<Arc<ClientConfig>>,
) -> Result<SmtpStream> {
    let tcp = TcpStream::connect((host, port)).await?;
    let connector = tls_connector(config);
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| Error::Configuration(format!("invalid TLS hostname: {host}")))?;
    let tls = connector.connect(server_name, tcp).await?;
    Ok(SmtpStream::Tls(Box::new(BufReader::new(tls))))
}

/// Builds a TLS connector from the caller's config or system roots.
fn tls_connector(config: Option<Arc<ClientConfig>>) -> TlsConnector {
    let config = config.unwrap_or_else(|| {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        Arc::new(
            ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth(),
        )
    });
    TlsConnector::from(config)
}
