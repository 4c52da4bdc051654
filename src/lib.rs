//! DevTools Socket - Client core for browser debugging protocols.
//!
//! This library provides the connection core that domain-specific protocol
//! clients (page, DOM, network, runtime, ...) are built on.
//!
//! # Architecture
//!
//! The socket follows a command/event model:
//!
//! - **Commands**: `{id, method, params}` requests, each answered by exactly
//!   one `{id, result|error}` response
//! - **Events**: `{method, params}` notifications pushed by the remote end
//!
//! Key design principles:
//!
//! - Each [`Socket`] owns: one transport + one event loop task
//! - Correlation IDs are per socket, monotonic, starting at 1
//! - Every submitted command resolves exactly once (result or error)
//! - No global state: pending commands and handlers live inside the socket
//!
//! # Quick Start
//!
//! ```no_run
//! use devtools_socket::{Command, Result, Socket};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Connect to a page target
//!     let socket = Socket::connect("ws://127.0.0.1:9222/devtools/page/ABC").await?;
//!
//!     // Subscribe before enabling the domain
//!     socket.add_event_handler("Page.loadEventFired", |_event| {
//!         tracing::info!("Page loaded");
//!         Ok(())
//!     });
//!
//!     socket.submit(Command::new("Page.enable")).await?;
//!     socket
//!         .submit(Command::with_params("Page.navigate", json!({ "url": "https://example.com" })))
//!         .await?;
//!
//!     socket.close().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire message types and codec |
//! | [`socket`] | [`Socket`] facade, pending table, event router, event loop |
//! | [`transport`] | Transport seam: WebSocket and in-memory connectors |
//!
//! # Features
//!
//! - **Typed helpers**: [`Socket::call`] and [`Socket::on`] (de)serialize payloads
//! - **Reconnect**: opt-in exponential backoff with an offline command queue
//! - **Pluggable transport**: anything implementing [`Connector`]

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Protocol message types.
///
/// Request/response/event structures and the frame codec.
pub mod protocol;

/// Socket core.
///
/// Use [`Socket::builder()`] to create a configured socket.
pub mod socket;

/// Transport layer.
///
/// Connector, sink and stream traits plus the provided transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CommandId, HandlerId};

// Protocol types
pub use protocol::{Command, Event, RemoteError};

// Socket types
pub use socket::{
    ConnectionState, EventHandler, OfflinePolicy, ReconnectPolicy, Socket, SocketBuilder,
    SocketConfig,
};

// Transport types
pub use transport::{Connector, MemoryConnector, WebSocketConnector};
