use async_trait::async_trait;
use quinn::crypto::rustls::QuicClientConfig;
use quinn::{Endpoint, IdleTimeout, TransportConfig, VarInt};
use rustls::DigitallySignedStruct;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::exceptions::TransportError;
use crate::protocol::consts::{ALPN, DisconnectType};

/// Write half of a request stream
pub type OutboundStream = Box<dyn AsyncWrite + Send + Unpin>;

/// Read half of a response stream
pub type InboundStream = Box<dyn AsyncRead + Send + Unpin>;

/// One multiplexed connection to a server
///
/// Owned by a single query attempt and never shared.
#[async_trait]
pub trait Session: Send {
    /// Opens a stream for sending a request
    async fn open_outbound_stream(
        &mut self,
        timeout: Duration,
    ) -> Result<OutboundStream, TransportError>;

    /// Waits for the peer to open the stream carrying its response
    async fn accept_inbound_stream(
        &mut self,
        timeout: Duration,
    ) -> Result<InboundStream, TransportError>;

    /// Releases the connection; later calls are no-ops
    fn close(&mut self, code: u32, reason: &str);
}

/// Dials sessions
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establishes a session, bounding the handshake by `timeout`
    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError>;
}

/// QUIC connector with TLS 1.3 and the `hytale/1` ALPN
///
/// Server certificates are not verified: game servers present self-signed certificates.
#[derive(Debug, Clone, Default)]
pub struct QuicConnector;

impl QuicConnector {
    pub fn new() -> Self {
        Self
    }

    fn client_config(timeout: Duration) -> Result<quinn::ClientConfig, String> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut crypto = rustls::ClientConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(&[&rustls::version::TLS13])
            .map_err(|e| e.to_string())?
            .dangerous()
            .with_custom_certificate_verifier(SkipServerVerification::new(provider))
            .with_no_client_auth();
        crypto.alpn_protocols = vec![ALPN.to_vec()];

        let quic_crypto = QuicClientConfig::try_from(crypto).map_err(|e| e.to_string())?;
        let mut client_config = quinn::ClientConfig::new(Arc::new(quic_crypto));

        let mut transport = TransportConfig::default();
        transport.max_idle_timeout(Some(
            IdleTimeout::try_from(timeout).map_err(|e| e.to_string())?,
        ));
        transport.keep_alive_interval(Some(timeout / 2));
        client_config.transport_config(Arc::new(transport));

        Ok(client_config)
    }

    async fn resolve(host: &str, port: u16) -> Result<SocketAddr, String> {
        tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| e.to_string())?
            .next()
            .ok_or_else(|| format!("no addresses found for {host}"))
    }
}

#[async_trait]
impl Connector for QuicConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError> {
        let address = format!("{host}:{port}");
        let failed = |reason: String| TransportError::ConnectionFailed {
            address: address.clone(),
            reason,
        };

        let handshake = async {
            let remote = Self::resolve(host, port).await?;
            let bind: SocketAddr = if remote.is_ipv6() {
                (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
            } else {
                (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
            };

            let mut endpoint = Endpoint::client(bind).map_err(|e| e.to_string())?;
            endpoint.set_default_client_config(Self::client_config(connect_timeout)?);

            let connection = endpoint
                .connect(remote, host)
                .map_err(|e| e.to_string())?
                .await
                .map_err(|e| e.to_string())?;

            Ok::<_, String>((endpoint, connection))
        };

        let (endpoint, connection) = timeout(connect_timeout, handshake)
            .await
            .map_err(|_| failed(format!("handshake timed out after {connect_timeout:?}")))?
            .map_err(failed)?;

        debug!(address = %address, remote = %connection.remote_address(), "QUIC session established");

        Ok(Box::new(QuicSession {
            endpoint,
            connection,
            closed: false,
        }))
    }
}

/// Session over a live QUIC connection
///
/// Dropping an unclosed session closes it with the crash code.
pub struct QuicSession {
    endpoint: Endpoint,
    connection: quinn::Connection,
    closed: bool,
}

#[async_trait]
impl Session for QuicSession {
    async fn open_outbound_stream(
        &mut self,
        open_timeout: Duration,
    ) -> Result<OutboundStream, TransportError> {
        let (send, _recv) = timeout(open_timeout, self.connection.open_bi())
            .await
            .map_err(|_| TransportError::StreamOpenFailed(format!("timed out after {open_timeout:?}")))?
            .map_err(|e| TransportError::StreamOpenFailed(e.to_string()))?;
        Ok(Box::new(send))
    }

    async fn accept_inbound_stream(
        &mut self,
        accept_timeout: Duration,
    ) -> Result<InboundStream, TransportError> {
        let (_send, recv) = timeout(accept_timeout, self.connection.accept_bi())
            .await
            .map_err(|_| {
                TransportError::StreamAcceptFailed(format!("timed out after {accept_timeout:?}"))
            })?
            .map_err(|e| TransportError::StreamAcceptFailed(e.to_string()))?;
        Ok(Box::new(recv))
    }

    fn close(&mut self, code: u32, reason: &str) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.connection
            .close(VarInt::from_u32(code), reason.as_bytes());
        self.endpoint.close(VarInt::from_u32(code), reason.as_bytes());
        debug!(code, reason, "QUIC session closed");
    }
}

impl Drop for QuicSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!("QUIC session dropped without close");
            self.close(DisconnectType::Crash.code(), "session dropped");
        }
    }
}

/// Accepts any server certificate while still checking handshake signatures
#[derive(Debug)]
struct SkipServerVerification(Arc<CryptoProvider>);

impl SkipServerVerification {
    fn new(provider: Arc<CryptoProvider>) -> Arc<Self> {
        Arc::new(Self(provider))
    }
}

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
