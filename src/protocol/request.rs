//! Request and Response message types.
//!
//! Defines the message format for command requests and responses
//! between the local end (this socket) and the remote end (the browser).

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::CommandId;

use super::Command;

// ============================================================================
// Request
// ============================================================================

/// A command request from local end to remote end.
///
/// # Format
///
/// ```json
/// {
///   "id": 7,
///   "method": "Domain.action",
///   "params": { ... }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation ID assigned by the socket.
    pub id: CommandId,

    /// Method name in `Domain.action` format.
    pub method: String,

    /// Parameter payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Creates a request from a command and its assigned ID.
    #[inline]
    #[must_use]
    pub fn new(id: CommandId, command: Command) -> Self {
        Self {
            id,
            method: command.method,
            params: command.params,
        }
    }
}

// ============================================================================
// RemoteError
// ============================================================================

/// Error object returned by the remote end for a rejected command.
///
/// # Format
///
/// ```json
/// { "code": -32000, "message": "Cannot find context", "data": "..." }
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RemoteError {
    /// Protocol error code.
    #[serde(default)]
    pub code: i64,

    /// Human readable message.
    #[serde(default)]
    pub message: String,

    /// Optional extra data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RemoteError {
    /// Creates a remote error without extra data.
    #[inline]
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Converts into a crate [`Error::Remote`] tagged with the command method.
    #[inline]
    #[must_use]
    pub fn into_error(self, method: impl Into<String>) -> Error {
        Error::remote(method, self.code, self.message, self.data)
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response from remote end to local end.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": 7, "result": { ... } }
/// ```
///
/// Error:
/// ```json
/// { "id": 7, "error": { "code": -32000, "message": "..." } }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Matches the request `id`.
    pub id: CommandId,

    /// Result payload or the remote error object.
    pub outcome: StdResult<Value, RemoteError>,
}

impl Response {
    /// Creates a success response.
    #[inline]
    #[must_use]
    pub fn success(id: CommandId, result: Value) -> Self {
        Self {
            id,
            outcome: Ok(result),
        }
    }

    /// Creates an error response.
    #[inline]
    #[must_use]
    pub fn failure(id: CommandId, error: RemoteError) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }

    /// Returns `true` if this is a success response.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    /// Extracts the result value, converting a remote error into
    /// [`Error::Remote`] tagged with `method`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] if the response was an error.
    pub fn into_result(self, method: &str) -> Result<Value> {
        self.outcome.map_err(|e| e.into_error(method))
    }
}

// ============================================================================
// Tests
// ============================================================================
