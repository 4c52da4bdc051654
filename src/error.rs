//! Error types for the DevTools socket.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use devtools_socket::{Command, Result, Socket};
//!
//! async fn example(socket: &Socket) -> Result<()> {
//!     socket.submit(Command::new("Page.enable")).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Url`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::NotOpen`] |
//! | Protocol | [`Error::ProtocolFormat`], [`Error::DuplicateId`], [`Error::StaleResponse`] |
//! | Remote | [`Error::Remote`] |
//! | Back-pressure | [`Error::TooManyPending`], [`Error::QueueFull`] |
//! | Execution | [`Error::RequestTimeout`], [`Error::Timeout`], [`Error::Handler`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::CommandId;
use crate::socket::ConnectionState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when socket configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Endpoint URL could not be parsed.
    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport connection failed.
    ///
    /// Returned when the endpoint is unreachable or the handshake fails.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection timeout while dialing the endpoint.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed before the command was resolved.
    ///
    /// Delivered to every pending command when the transport is lost
    /// or the socket is closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Submission attempted while the socket is not open.
    #[error("Socket is not open (state: {state})")]
    NotOpen {
        /// State observed at submission time.
        state: ConnectionState,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Inbound frame matched neither the response nor the event shape.
    ///
    /// Logged by the read loop, never fatal to the connection.
    #[error("Protocol format error: {message}")]
    ProtocolFormat {
        /// Description of the malformed frame.
        message: String,
    },

    /// Correlation ID already registered in the pending table.
    #[error("Duplicate command id: {id}")]
    DuplicateId {
        /// The colliding ID.
        id: CommandId,
    },

    /// Response carried an ID with no pending command.
    #[error("Stale response for unknown command id: {id}")]
    StaleResponse {
        /// The unmatched ID.
        id: CommandId,
    },

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// The far end rejected the command with an explicit error object.
    #[error("Remote error for {method} ({code}): {message}")]
    Remote {
        /// Method of the rejected command.
        method: String,
        /// Protocol error code.
        code: i64,
        /// Protocol error message.
        message: String,
        /// Optional extra data attached by the far end.
        data: Option<Value>,
    },

    // ========================================================================
    // Back-pressure Errors
    // ========================================================================
    /// Too many commands awaiting a response.
    #[error("Too many pending commands: {limit}")]
    TooManyPending {
        /// Configured maximum.
        limit: usize,
    },

    /// Offline queue is full while reconnecting.
    #[error("Offline queue full: {capacity}")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Command response timeout.
    ///
    /// The pending entry is left in place and is resolved or drained later.
    #[error("Command {id} ({method}) timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The command ID that timed out.
        id: CommandId,
        /// Method of the command.
        method: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Event handler reported a failure.
    #[error("Handler error: {message}")]
    Handler {
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a not-open error.
    #[inline]
    pub fn not_open(state: ConnectionState) -> Self {
        Self::NotOpen { state }
    }

    /// Creates a protocol format error.
    #[inline]
    pub fn protocol_format(message: impl Into<String>) -> Self {
        Self::ProtocolFormat {
            message: message.into(),
        }
    }

    /// Creates a remote error.
    #[inline]
    pub fn remote(
        method: impl Into<String>,
        code: i64,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self::Remote {
            method: method.into(),
            code,
            message: message.into(),
            data,
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(id: CommandId, method: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            id,
            method: method.into(),
            timeout_ms,
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a handler error.
    #[inline]
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the far end rejected the command.
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::Timeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::NotOpen { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if retrying the command may succeed.
    ///
    /// Remote rejections are never retryable: the far end understood the
    /// command and refused it.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::NotOpen { .. }
                | Self::RequestTimeout { .. }
                | Self::QueueFull { .. }
                | Self::TooManyPending { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
