//! WebSocket client transport.
//!
//! Dials a DevTools endpoint such as
//! `ws://127.0.0.1:9222/devtools/page/<target-id>` with `tokio-tungstenite`.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};

use super::{Connector, FrameSink, FrameStream, TransportParts};

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// WebSocketConnector
// ============================================================================

/// Connector for `ws://` and `wss://` endpoints.
///
/// # Example
///
/// ```ignore
/// use devtools_socket::transport::WebSocketConnector;
///
/// let connector = WebSocketConnector::new("ws://127.0.0.1:9222/devtools/browser/abc")?;
/// assert_eq!(connector.url().scheme(), "ws");
/// ```
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    /// Validated endpoint URL.
    url: Url,
}

impl WebSocketConnector {
    /// Creates a connector after validating the endpoint URL.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the URL does not parse
    /// - [`Error::Config`] if the scheme is not `ws` or `wss`
    pub fn new(endpoint: &str) -> Result<Self> {
        let url = Url::parse(endpoint)?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "Unsupported endpoint scheme '{}', expected ws or wss",
                url.scheme()
            )));
        }

        if url.host_str().is_none() {
            return Err(Error::config(format!("Endpoint has no host: {endpoint}")));
        }

        Ok(Self { url })
    }

    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<TransportParts> {
        debug!(url = %self.url, "Dialing WebSocket endpoint");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        info!(url = %self.url, "WebSocket connection established");

        let (sink, stream) = ws_stream.split();
        Ok(TransportParts::new(
            WebSocketSink { inner: sink },
            WebSocketFrames { inner: stream },
        ))
    }

    fn endpoint(&self) -> String {
        self.url.to_string()
    }
}

// ============================================================================
// WebSocketSink
// ============================================================================

/// Write half of a WebSocket connection.
struct WebSocketSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.inner.send(Message::Text(frame.into())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await?;
        Ok(())
    }
}

// ============================================================================
// WebSocketFrames
// ============================================================================

/// Read half of a WebSocket connection.
struct WebSocketFrames {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl FrameStream for WebSocketFrames {
    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),

                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => warn!(len = data.len(), "Ignoring non UTF-8 binary frame"),
                },

                Ok(Message::Close(frame)) => {
                    debug!(?frame, "WebSocket closed by remote");
                    return None;
                }

                // Ping/Pong are answered by tungstenite
                Ok(_) => {}

                Err(e) => return Some(Err(Error::WebSocket(e))),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
