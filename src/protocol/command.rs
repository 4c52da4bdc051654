//! Command definition.
//!
//! A [`Command`] is what a protocol-domain façade hands to the socket:
//! a `Domain.action` method name and an opaque parameter payload. The
//! correlation ID is assigned by the socket at submission time.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Command
// ============================================================================

/// A protocol command awaiting submission.
///
/// # Example
///
/// ```
/// use devtools_socket::Command;
/// use serde_json::json;
///
/// let command = Command::with_params("Page.navigate", json!({ "url": "https://example.com" }));
/// assert_eq!(command.domain(), "Page");
/// assert_eq!(command.action(), "navigate");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Method name in `Domain.action` format.
    pub method: String,

    /// Parameter payload, omitted from the wire when `None`.
    pub params: Option<Value>,
}

impl Command {
    /// Creates a command without parameters.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }

    /// Creates a command with a JSON parameter payload.
    #[inline]
    #[must_use]
    pub fn with_params(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params: Some(params),
        }
    }

    /// Creates a command by serializing a typed parameter struct.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if `params` fails to serialize.
    pub fn from_params<P>(method: impl Into<String>, params: &P) -> Result<Self>
    where
        P: Serialize + ?Sized,
    {
        let params = serde_json::to_value(params)?;
        Ok(Self {
            method: method.into(),
            params: Some(params),
        })
    }

    /// Returns the domain part of the method (`Page` in `Page.navigate`).
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Returns the action part of the method (`navigate` in `Page.navigate`).
    #[inline]
    #[must_use]
    pub fn action(&self) -> &str {
        self.method.split_once('.').map(|(_, a)| a).unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
