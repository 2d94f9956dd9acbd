//! QUIC transport for the client.
//!
//! Provides [`ConnectedClient`] which handles QUIC I/O for frame transport.
//! This is a thin layer that just sends and receives frames; protocol logic
//! stays in the sans-IO [`Engine`](crate::Engine).
//!
//! Each outbound frame goes on its own unidirectional stream, matching the
//! fire-and-forget protocol. The authority pushes frames on one persistent
//! unidirectional stream per connection.

use std::{net::SocketAddr, sync::Arc};

use bytes::BytesMut;
use reelsync_proto::{ALPN_PROTOCOL, Frame, FrameHeader};
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Stream error.
    #[error("stream error: {0}")]
    Stream(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Handle to a connected client with QUIC transport.
///
/// Frames are sent and received via the channels; an internal task handles
/// the QUIC I/O.
pub struct ConnectedClient {
    /// Send frames to the authority.
    pub to_server: mpsc::Sender<Frame>,
    /// Receive frames from the authority.
    pub from_server: mpsc::Receiver<Frame>,
    /// Abort handle to stop the connection task.
    abort_handle: tokio::task::AbortHandle,
}

impl ConnectedClient {
    /// Stop the connection.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

/// Connect to a ReelSync authority via QUIC.
pub async fn connect(server_addr: SocketAddr) -> Result<ConnectedClient, TransportError> {
    let client_config = insecure_client_config()?;
    let bind: SocketAddr = SocketAddr::from(([0, 0, 0, 0], 0));
    let mut endpoint = quinn::Endpoint::client(bind)
        .map_err(|e| TransportError::Connection(format!("endpoint creation failed: {e}")))?;
    endpoint.set_default_client_config(client_config);

    let connection = endpoint
        .connect(server_addr, "localhost")
        .map_err(|e| TransportError::Connection(format!("connect failed: {e}")))?
        .await
        .map_err(|e| TransportError::Connection(format!("connection failed: {e}")))?;

    let (to_server_tx, to_server_rx) = mpsc::channel::<Frame>(32);
    let (from_server_tx, from_server_rx) = mpsc::channel::<Frame>(32);

    let handle = tokio::spawn(run_connection(connection, to_server_rx, from_server_tx));

    Ok(ConnectedClient {
        to_server: to_server_tx,
        from_server: from_server_rx,
        abort_handle: handle.abort_handle(),
    })
}

/// Run the connection, bridging between channels and QUIC.
async fn run_connection(
    connection: quinn::Connection,
    mut to_server: mpsc::Receiver<Frame>,
    from_server: mpsc::Sender<Frame>,
) {
    let conn_recv = connection.clone();
    let recv_handle = tokio::spawn(async move {
        loop {
            match conn_recv.accept_uni().await {
                Ok(recv) => {
                    let tx = from_server.clone();
                    tokio::spawn(async move {
                        if let Err(e) = pump_incoming_stream(recv, tx).await {
                            tracing::debug!("incoming stream ended: {e}");
                        }
                    });
                },
                Err(e) => {
                    tracing::debug!("accept_uni failed: {e}");
                    break;
                },
            }
        }
    });

    while let Some(frame) = to_server.recv().await {
        match connection.open_uni().await {
            Ok(send) => {
                if let Err(e) = send_frame(send, &frame).await {
                    tracing::warn!("send failed: {e}");
                }
            },
            Err(e) => {
                tracing::warn!("open_uni failed: {e}");
                break;
            },
        }
    }

    recv_handle.abort();
}

/// Read frames off the authority's push stream until it closes.
async fn pump_incoming_stream(
    mut recv: quinn::RecvStream,
    tx: mpsc::Sender<Frame>,
) -> Result<(), TransportError> {
    loop {
        let mut buf = BytesMut::zeroed(FrameHeader::SIZE);

        recv.read_exact(&mut buf[..FrameHeader::SIZE])
            .await
            .map_err(|e| TransportError::Stream(format!("header read failed: {e}")))?;

        let payload_size = FrameHeader::from_bytes(&buf[..FrameHeader::SIZE])
            .map_err(|e| TransportError::Protocol(format!("invalid header: {e}")))?
            .payload_size() as usize;

        if payload_size > 0 {
            buf.resize(FrameHeader::SIZE + payload_size, 0);
            recv.read_exact(&mut buf[FrameHeader::SIZE..])
                .await
                .map_err(|e| TransportError::Stream(format!("payload read failed: {e}")))?;
        }

        let frame = Frame::decode(&buf)
            .map_err(|e| TransportError::Protocol(format!("frame decode failed: {e}")))?;

        tx.send(frame)
            .await
            .map_err(|e| TransportError::Stream(format!("channel send failed: {e}")))?;
    }
}

/// Send one frame on a fresh stream and finish it.
async fn send_frame(mut send: quinn::SendStream, frame: &Frame) -> Result<(), TransportError> {
    let buf = frame
        .encode_to_vec()
        .map_err(|e| TransportError::Protocol(format!("encode failed: {e}")))?;

    send.write_all(&buf).await.map_err(|e| TransportError::Stream(format!("write failed: {e}")))?;
    send.finish().map_err(|e| TransportError::Stream(format!("finish failed: {e}")))?;

    Ok(())
}

/// Create an insecure client config that accepts any certificate.
///
/// WARNING: development only. Production should verify certificates.
fn insecure_client_config() -> Result<quinn::ClientConfig, TransportError> {
    let mut crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureCertVerifier))
        .with_no_client_auth();

    // Must match the authority's ALPN protocol.
    crypto.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let mut config = quinn::ClientConfig::new(Arc::new(
        quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
            .map_err(|e| TransportError::Connection(format!("TLS config error: {e}")))?,
    ));

    let mut transport = quinn::TransportConfig::default();
    let idle = quinn::IdleTimeout::try_from(std::time::Duration::from_secs(30))
        .map_err(|e| TransportError::Connection(format!("idle timeout: {e}")))?;
    transport.max_idle_timeout(Some(idle));
    config.transport_config(Arc::new(transport));

    Ok(config)
}

/// Certificate verifier that accepts any certificate (insecure, for
/// development).
#[derive(Debug)]
struct InsecureCertVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
