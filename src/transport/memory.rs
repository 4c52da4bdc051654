//! In-process channel transport.
//!
//! [`MemoryConnector`] hands every dialed connection's remote half to a
//! [`MemoryAcceptor`] as a [`MemoryPeer`]. The peer plays the remote end:
//! it reads the requests the socket wrote, answers them, pushes events,
//! and can drop or break the connection on demand. Used to embed the socket
//! in-process and to drive it deterministically in tests.
//!
//! # Example
//!
//! ```ignore
//! let (connector, mut acceptor) = MemoryConnector::new();
//! let socket = Socket::builder().connector(connector).connect().await?;
//! let mut peer = acceptor.accept().await.expect("peer");
//!
//! let request = peer.recv_request().await.expect("request");
//! peer.respond(request.id, json!({ "ok": true }));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;
use crate::protocol::{Event, RemoteError, Request, Response, codec};

use super::{Connector, FrameSink, FrameStream, TransportParts};

// ============================================================================
// MemoryConnector
// ============================================================================

/// Connector producing in-process channel connections.
///
/// Cloning shares the same acceptor and refusal switch.
#[derive(Clone)]
pub struct MemoryConnector {
    inner: Arc<ConnectorInner>,
}

struct ConnectorInner {
    /// Delivers remote halves to the acceptor.
    peers: mpsc::UnboundedSender<MemoryPeer>,
    /// When set, `connect` fails.
    refuse: AtomicBool,
    /// Number of `connect` calls, successful or not.
    attempts: AtomicUsize,
}

impl MemoryConnector {
    /// Creates a connector and the acceptor receiving its peers.
    #[must_use]
    pub fn new() -> (Self, MemoryAcceptor) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Self {
            inner: Arc::new(ConnectorInner {
                peers,
                refuse: AtomicBool::new(false),
                attempts: AtomicUsize::new(0),
            }),
        };
        (connector, MemoryAcceptor { peers: rx })
    }

    /// Makes subsequent `connect` calls fail (or succeed again).
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Returns how many times `connect` has been called.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<TransportParts> {
        let attempt = self.inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        if self.inner.refuse.load(Ordering::SeqCst) {
            debug!(attempt, "Memory connection refused");
            return Err(Error::connection("memory endpoint refused connection"));
        }

        let (to_remote, from_client) = mpsc::unbounded_channel();
        let (to_client, from_remote) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            outbound: Some(to_client),
            inbound: from_client,
        };

        self.inner
            .peers
            .send(peer)
            .map_err(|_| Error::connection("memory acceptor dropped"))?;

        debug!(attempt, "Memory connection established");

        Ok(TransportParts::new(
            MemorySink {
                tx: Some(to_remote),
            },
            MemoryFrames { rx: from_remote },
        ))
    }

    fn endpoint(&self) -> String {
        "memory://".to_string()
    }
}

// ============================================================================
// MemoryAcceptor
// ============================================================================

/// Receives the remote half of each connection a [`MemoryConnector`] dials.
pub struct MemoryAcceptor {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryAcceptor {
    /// Waits for the next dialed connection.
    ///
    /// Returns `None` once every connector clone has been dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }
}

// ============================================================================
// MemoryPeer
// ============================================================================

/// Remote end of an in-process connection.
///
/// Dropping the peer ends the client's stream, which the socket treats as
/// connection loss.
pub struct MemoryPeer {
    /// Frames towards the socket. `None` once disconnected.
    outbound: Option<mpsc::UnboundedSender<Result<String>>>,
    /// Frames written by the socket.
    inbound: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Receives the next raw frame written by the socket.
    ///
    /// Returns `None` once the socket closed its write half.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    /// Receives and decodes the next request written by the socket.
    ///
    /// Frames that are not requests are logged and skipped.
    pub async fn recv_request(&mut self) -> Option<Request> {
        loop {
            let frame = self.inbound.recv().await?;
            match codec::decode_request(&frame) {
                Ok(request) => return Some(request),
                Err(e) => warn!(error = %e, "Peer skipped non-request frame"),
            }
        }
    }

    /// Sends a raw text frame to the socket.
    ///
    /// Returns `false` if the socket side is gone.
    pub fn send_raw(&self, frame: impl Into<String>) -> bool {
        self.outbound
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(frame.into())).is_ok())
    }

    /// Answers a request with a result payload.
    pub fn respond(&self, id: CommandId, result: Value) -> bool {
        self.send_encoded(codec::encode_response(&Response::success(id, result)))
    }

    /// Answers a request with a remote error object.
    pub fn respond_error(&self, id: CommandId, error: RemoteError) -> bool {
        self.send_encoded(codec::encode_response(&Response::failure(id, error)))
    }

    /// Pushes an event to the socket.
    pub fn emit(&self, method: impl Into<String>, params: Value) -> bool {
        self.send_encoded(codec::encode_event(&Event::new(method, params)))
    }

    /// Injects a transport error into the socket's stream, then disconnects.
    pub fn break_connection(&mut self) {
        if let Some(tx) = self.outbound.take() {
            let _ = tx.send(Err(Error::connection("simulated transport failure")));
        }
    }

    /// Closes the connection from the remote side.
    pub fn disconnect(&mut self) {
        self.outbound = None;
    }

    fn send_encoded(&self, frame: Result<String>) -> bool {
        match frame {
            Ok(frame) => self.send_raw(frame),
            Err(e) => {
                warn!(error = %e, "Peer failed to encode frame");
                false
            }
        }
    }
}

// ============================================================================
// MemorySink / MemoryFrames
// ============================================================================

/// Client write half.
struct MemorySink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: String) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(Error::ConnectionClosed)?;
        tx.send(frame).map_err(|_| Error::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        Ok(())
    }
}

/// Client read half.
struct MemoryFrames {
    rx: mpsc::UnboundedReceiver<Result<String>>,
}

#[async_trait]
impl FrameStream for MemoryFrames {
    async fn recv(&mut self) -> Option<Result<String>> {
        self.rx.recv().await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::protocol::{Command, DecodedFrame};

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (connector, mut acceptor) = MemoryConnector::new();
        let mut parts = connector.connect().await.expect("connect");
        let mut peer = acceptor.accept().await.expect("peer");

        let request = Request::new(CommandId::new(1), Command::new("Page.enable"));
        parts
            .sink
            .send(codec::encode(&request).expect("encode"))
            .await
            .expect("send");

        let received = peer.recv_request().await.expect("request");
        assert_eq!(received, request);

        assert!(peer.respond(received.id, json!({})));
        let frame = parts.stream.recv().await.expect("frame").expect("ok");
        assert!(matches!(
            codec::decode(&frame).expect("decode"),
            DecodedFrame::Response(_)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_ends_stream() {
        let (connector, mut acceptor) = MemoryConnector::new();
        let mut parts = connector.connect().await.expect("connect");
        let mut peer = acceptor.accept().await.expect("peer");

        peer.disconnect();
        assert!(parts.stream.recv().await.is_none());
        assert!(!peer.emit("Foo.changed", json!({})));
    }

    #[tokio::test]
    async fn test_break_connection_yields_error() {
        let (connector, mut acceptor) = MemoryConnector::new();
        let mut parts = connector.connect().await.expect("connect");
        let mut peer = acceptor.accept().await.expect("peer");

        peer.break_connection();
        assert!(matches!(parts.stream.recv().await, Some(Err(_))));
        assert!(parts.stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_refuse_connections() {
        let (connector, _acceptor) = MemoryConnector::new();
        connector.refuse_connections(true);

        assert!(connector.connect().await.is_err());
        assert_eq!(connector.connect_attempts(), 1);

        connector.refuse_connections(false);
        assert!(connector.connect().await.is_ok());
        assert_eq!(connector.connect_attempts(), 2);
    }
}
