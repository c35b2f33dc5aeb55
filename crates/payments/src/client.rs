//! WebSocket client for the payments API socket.
//!
//! [`PaymentsSocketClient`] holds the connection configuration for the
//! payments socket. Call [`PaymentsSocketClient::connect`] to establish a
//! live [`SocketConnection`] over WebSocket; the Socket.IO handshake is
//! driven by the [`subscription`](crate::subscription) loop.

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Raw WebSocket stream to the payments socket.
pub type SocketStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Engine.IO v4 WebSocket transport path.
const SOCKET_IO_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// Configuration handle for the payments socket.
#[derive(Clone)]
pub struct PaymentsSocketClient {
    websocket_url: String,
    api_key: String,
}

/// A live WebSocket connection to the payments socket.
pub struct SocketConnection {
    /// Full URL that was connected to.
    pub url: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: SocketStream,
}

impl PaymentsSocketClient {
    /// Create a new client.
    ///
    /// * `websocket_url` - WebSocket base URL, e.g. `wss://one-backend.staging.nevermined.app`.
    /// * `api_key`       - Nevermined API key sent as a bearer token on upgrade.
    pub fn new(websocket_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            websocket_url: websocket_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// WebSocket base URL.
    pub fn websocket_url(&self) -> &str {
        &self.websocket_url
    }

    /// Full Engine.IO transport URL.
    pub fn socket_url(&self) -> String {
        format!("{}{}", self.websocket_url, SOCKET_IO_PATH)
    }

    /// Connect to the payments socket.
    ///
    /// The API key travels in the `Authorization` header of the upgrade
    /// request.
    pub async fn connect(&self) -> Result<SocketConnection, PaymentsClientError> {
        let url = self.socket_url();

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| PaymentsClientError::Connection(format!("Invalid socket URL {url}: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| PaymentsClientError::Connection(format!("Invalid API key header: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ws_stream, _response) = connect_async(request).await.map_err(|e| {
            PaymentsClientError::Connection(format!(
                "Failed to connect to payments socket at {}: {e}",
                self.websocket_url
            ))
        })?;

        tracing::info!(url = %self.websocket_url, "Connected to payments socket");

        Ok(SocketConnection { url, ws_stream })
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum PaymentsClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an already-established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}
