//! HTTP/2 transport to the push gateway.

use std::sync::Arc;
use std::time::SystemTime;

use bytes::{Bytes, BytesMut};
use mdm_core::{PushCredential, PushResponse, PushTarget};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

use crate::PushError;
use crate::payload::build_request;

/// Production gateway host.
pub const PRODUCTION_HOST: &str = "api.push.apple.com";

/// Development gateway host.
pub const SANDBOX_HOST: &str = "api.sandbox.push.apple.com";

/// Gateway port.
pub const GATEWAY_PORT: u16 = 443;

/// A live session with the push gateway.
#[trait_variant::make(Send)]
pub trait GatewaySession: Send + Sync + 'static {
    /// Send one push and wait for the gateway's answer.
    async fn send(&self, target: &PushTarget, body: Bytes) -> Result<PushResponse, PushError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), PushError>;

    /// Resolves once the transport has closed, for any reason.
    async fn closed(&self);

    /// Begin closing the transport.
    fn close(&self);
}

/// Opens gateway sessions for one credential.
#[trait_variant::make(Send)]
pub trait GatewayConnector: Send + Sync + 'static {
    type Session: GatewaySession;

    async fn connect(&self) -> Result<Self::Session, PushError>;
}

/// Builds a connector from a push credential.
pub trait ConnectorFactory: Send + Sync + 'static {
    type Connector: GatewayConnector;

    fn connector(&self, credential: &PushCredential) -> Result<Self::Connector, PushError>;
}

/// Factory for TLS + HTTP/2 connectors to a gateway host.
#[derive(Debug, Clone)]
pub struct H2ConnectorFactory {
    host: String,
    port: u16,
}

impl H2ConnectorFactory {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Production or sandbox gateway.
    pub fn gateway(sandbox: bool) -> Self {
        let host = if sandbox { SANDBOX_HOST } else { PRODUCTION_HOST };
        Self::new(host, GATEWAY_PORT)
    }
}

impl ConnectorFactory for H2ConnectorFactory {
    type Connector = H2Connector;

    fn connector(&self, credential: &PushCredential) -> Result<H2Connector, PushError> {
        let tls = mdm_crypto::client_tls_config(&credential.certificate, &credential.private_key)
            .map_err(|e| PushError::Credential(format!("{e:#}")))?;

        Ok(H2Connector {
            host: self.host.clone(),
            port: self.port,
            tls,
        })
    }
}

/// Connects to the gateway presenting the push certificate.
#[derive(Clone)]
pub struct H2Connector {
    host: String,
    port: u16,
    tls: Arc<rustls::ClientConfig>,
}

impl GatewayConnector for H2Connector {
    type Session = H2Session;

    async fn connect(&self) -> Result<H2Session, PushError> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(PushError::transport)?;
        tcp.set_nodelay(true).map_err(PushError::transport)?;

        let server_name = rustls::pki_types::ServerName::try_from(self.host.clone())
            .map_err(|e| PushError::Transport(format!("invalid gateway host: {e}")))?;
        let tls = TlsConnector::from(Arc::clone(&self.tls))
            .connect(server_name, tcp)
            .await
            .map_err(|e| PushError::Transport(format!("TLS handshake failed: {e}")))?;

        let (send_request, mut connection) = h2::client::handshake(tls)
            .await
            .map_err(|e| PushError::Transport(format!("HTTP/2 handshake failed: {e}")))?;

        let ping_pong = connection
            .ping_pong()
            .ok_or_else(|| PushError::Transport("HTTP/2 ping already claimed".into()))?;

        let shutdown = CancellationToken::new();
        let closed = CancellationToken::new();

        let host = self.host.clone();
        let driver_shutdown = shutdown.clone();
        let driver_closed = closed.clone();
        tokio::spawn(async move {
            // dropping the connection closes the socket
            tokio::select! {
                result = connection => {
                    if let Err(e) = result {
                        tracing::warn!(host = %host, error = %e, "push gateway connection failed");
                    }
                }
                _ = driver_shutdown.cancelled() => {
                    tracing::debug!(host = %host, "closing push gateway connection");
                }
            }
            driver_closed.cancel();
        });

        Ok(H2Session {
            authority: self.host.clone(),
            send_request,
            ping_pong: tokio::sync::Mutex::new(ping_pong),
            shutdown,
            closed,
        })
    }
}

/// An HTTP/2 session, driven by a background task.
pub struct H2Session {
    authority: String,
    send_request: h2::client::SendRequest<Bytes>,
    ping_pong: tokio::sync::Mutex<h2::PingPong>,
    shutdown: CancellationToken,
    closed: CancellationToken,
}

impl GatewaySession for H2Session {
    async fn send(&self, target: &PushTarget, body: Bytes) -> Result<PushResponse, PushError> {
        let request = build_request(&self.authority, target, body.len(), SystemTime::now())?;

        let mut send_request = self
            .send_request
            .clone()
            .ready()
            .await
            .map_err(PushError::transport)?;
        let (response, mut stream) = send_request
            .send_request(request, false)
            .map_err(PushError::transport)?;
        stream.send_data(body, true).map_err(PushError::transport)?;

        let response = response.await.map_err(PushError::transport)?;
        let status = response.status().as_u16();
        let notification_id = response
            .headers()
            .get("apns-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if status != 200 {
            let reason = read_body(response.into_body()).await;
            tracing::warn!(
                status,
                token = %target.token,
                reason = %String::from_utf8_lossy(&reason),
                "push rejected by gateway"
            );
        }

        Ok(PushResponse {
            status,
            notification_id,
        })
    }

    async fn ping(&self) -> Result<(), PushError> {
        let mut ping_pong = self.ping_pong.lock().await;
        ping_pong
            .ping(h2::Ping::opaque())
            .await
            .map(|_pong| ())
            .map_err(PushError::transport)
    }

    async fn closed(&self) {
        self.closed.cancelled().await
    }

    fn close(&self) {
        self.shutdown.cancel();
    }
}

async fn read_body(mut body: h2::RecvStream) -> Bytes {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.data().await {
        match chunk {
            Ok(chunk) => {
                let _ = body.flow_control().release_capacity(chunk.len());
                buf.extend_from_slice(&chunk);
            }
            Err(e) => {
                tracing::debug!(error = %e, "failed to read gateway response body");
                break;
            }
        }
    }
    buf.freeze()
}
