//! Protocol engine capability.
//!
//! The reconnect coordinator never talks to the WebSocket engine directly. It
//! holds a [`Connector`] and asks it for a fresh, handshaken stream on every
//! attempt. [`TungsteniteConnector`] is the production implementation: it
//! prepares a socket through the resolver and runs the client handshake with
//! `tokio-tungstenite`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};

use super::resolver::{self, BoxedIo};

// ============================================================================
// Types
// ============================================================================

/// Handshake request sent to the peer.
pub type ClientRequest = Request;

/// WebSocket stream produced by a successful handshake.
pub type WsStream = WebSocketStream<BoxedIo>;

/// Header carrying the requested subprotocols.
const PROTOCOL_HEADER: &str = "Sec-WebSocket-Protocol";

// ============================================================================
// HandshakeOptions
// ============================================================================

/// Extra data placed into every handshake request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeOptions {
    /// Requested subprotocols, in preference order.
    pub protocols: Vec<String>,
    /// Additional request headers.
    pub headers: Vec<(String, String)>,
}

impl HandshakeOptions {
    /// Builds the handshake request for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URI, a header name or a header value
    /// is invalid.
    pub fn request_for(&self, endpoint: &Endpoint) -> Result<ClientRequest> {
        let uri = endpoint.request_uri();
        let mut request = uri
            .as_str()
            .into_client_request()
            .map_err(|e| Error::config(format!("Invalid handshake URI '{uri}': {e}")))?;

        let headers = request.headers_mut();

        if !self.protocols.is_empty() {
            let value = HeaderValue::from_str(&self.protocols.join(", "))
                .map_err(|e| Error::config(format!("Invalid subprotocol list: {e}")))?;
            headers.insert(HeaderName::from_static("sec-websocket-protocol"), value);
        }

        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case(PROTOCOL_HEADER) {
                return Err(Error::config(
                    "Use protocol() to request subprotocols instead of a raw header",
                ));
            }

            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::config(format!("Invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::config(format!("Invalid value for header '{name}': {e}")))?;
            headers.append(name, value);
        }

        Ok(request)
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Capability interface onto the WebSocket protocol engine.
///
/// One call equals one connection attempt: resolve, connect, handshake.
/// Implementations must not retry internally; the coordinator owns the retry
/// policy and relies on [`Error::is_connection_refused`] to classify failures.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a new transport to `endpoint` and performs the handshake.
    async fn connect(&self, endpoint: &Endpoint, request: ClientRequest) -> Result<WsStream>;
}

#[async_trait]
impl<C> Connector for Arc<C>
where
    C: Connector + ?Sized,
{
    async fn connect(&self, endpoint: &Endpoint, request: ClientRequest) -> Result<WsStream> {
        (**self).connect(endpoint, request).await
    }
}

// ============================================================================
// TungsteniteConnector
// ============================================================================

/// Default [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, endpoint: &Endpoint, request: ClientRequest) -> Result<WsStream> {
        let socket = resolver::prepare(endpoint).await?;
        let stream = socket.connect().await?;

        let (ws_stream, response) = tokio_tungstenite::client_async(request, stream).await?;

        debug!(
            %endpoint,
            status = %response.status(),
            "WebSocket handshake completed"
        );

        Ok(ws_stream)
    }
}

// ============================================================================
// Tests
// ============================================================================
