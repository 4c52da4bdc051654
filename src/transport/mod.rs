//! Transport layer.
//!
//! This module abstracts the persistent, bidirectional, message-oriented
//! connection the socket runs over. The socket only ever sees text frames.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Socket (Rust)  │                              │  Browser        │
//! │                 │         WebSocket            │  (DevTools)     │
//! │  Connector      │─────────────────────────────►│                 │
//! │  → FrameSink    │      ws://host:PORT/...      │  WebSocket      │
//! │  → FrameStream  │◄─────────────────────────────│  Server         │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connector::connect` - Dial the endpoint, complete the handshake
//! 2. `FrameSink::send` - Write request frames (event loop only)
//! 3. `FrameStream::recv` - Read response and event frames (event loop only)
//! 4. `FrameSink::close` - Orderly close
//!
//! A connector may be dialed more than once; the reconnect policy relies on it.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `memory` | In-process channel transport |
//! | `websocket` | WebSocket client transport |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// In-process channel transport.
pub mod memory;

/// WebSocket client transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::{MemoryAcceptor, MemoryConnector, MemoryPeer};
pub use websocket::WebSocketConnector;

// ============================================================================
// Traits
// ============================================================================

/// Write half of an established connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Writes one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is broken.
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Closes the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of an established connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Receives the next text frame.
    ///
    /// Returns `None` once the remote end has closed the connection.
    /// Must be cancel safe: the event loop polls it inside `select!`.
    async fn recv(&mut self) -> Option<Result<String>>;
}

/// Establishes connections to one endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Dials the endpoint and completes the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`](crate::Error::Connection) if the endpoint
    /// is unreachable or the handshake fails.
    async fn connect(&self) -> Result<TransportParts>;

    /// Endpoint description used for logging.
    fn endpoint(&self) -> String;
}

// ============================================================================
// TransportParts
// ============================================================================

/// Both halves of an established connection.
pub struct TransportParts {
    /// Write half, owned by the event loop.
    pub sink: Box<dyn FrameSink>,
    /// Read half, owned by the event loop.
    pub stream: Box<dyn FrameStream>,
}

impl TransportParts {
    /// Bundles a sink and a stream.
    #[inline]
    #[must_use]
    pub fn new(sink: impl FrameSink + 'static, stream: impl FrameStream + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            stream: Box::new(stream),
        }
    }
}
