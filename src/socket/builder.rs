//! Builder pattern for socket configuration.
//!
//! Provides a fluent API for configuring and connecting [`Socket`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use devtools_socket::{ReconnectPolicy, Socket};
//!
//! # async fn example() -> devtools_socket::Result<()> {
//! let socket = Socket::builder()
//!     .url("ws://127.0.0.1:9222/devtools/browser")
//!     .command_timeout(Duration::from_secs(10))
//!     .reconnect(ReconnectPolicy::exponential(5))
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{Connector, WebSocketConnector};

use super::config::{OfflinePolicy, ReconnectPolicy, SocketConfig};
use super::core::Socket;

// ============================================================================
// SocketBuilder
// ============================================================================

/// Builder for configuring a [`Socket`].
///
/// Use [`Socket::builder()`] to create a new builder. Either a WebSocket
/// [`url`](Self::url) or a custom [`connector`](Self::connector) is required.
#[derive(Default)]
pub struct SocketBuilder {
    /// WebSocket endpoint.
    url: Option<String>,
    /// Custom transport, takes precedence over `url`.
    connector: Option<Arc<dyn Connector>>,
    /// Socket configuration.
    config: SocketConfig,
}

impl fmt::Debug for SocketBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketBuilder")
            .field("url", &self.url)
            .field("connector", &self.connector.as_ref().map(|c| c.endpoint()))
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// SocketBuilder Implementation
// ============================================================================

impl SocketBuilder {
    /// Creates a builder with default configuration and no endpoint.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the WebSocket endpoint (`ws://` or `wss://`).
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Uses a custom transport instead of a WebSocket URL.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Replaces the whole configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: SocketConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the default command timeout.
    #[inline]
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_command_timeout(timeout);
        self
    }

    /// Sets the dial timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_connect_timeout(timeout);
        self
    }

    /// Sets the pending command limit.
    #[inline]
    #[must_use]
    pub fn max_pending(mut self, max_pending: usize) -> Self {
        self.config = self.config.with_max_pending(max_pending);
        self
    }

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub fn reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.config = self.config.with_reconnect(reconnect);
        self
    }

    /// Sets the offline submission policy.
    #[inline]
    #[must_use]
    pub fn offline(mut self, offline: OfflinePolicy) -> Self {
        self.config = self.config.with_offline(offline);
        self
    }

    /// Validates the configuration, connects and starts the event loop.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration is invalid or no endpoint is set
    /// - [`Error::Url`] if the URL cannot be parsed
    /// - [`Error::Connection`] if the endpoint is unreachable
    /// - [`Error::ConnectionTimeout`] if dialing exceeds the connect timeout
    pub async fn connect(self) -> Result<Socket> {
        self.config.validate()?;
        let connector = self.resolve_connector()?;

        Socket::open(connector, self.config).await
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SocketBuilder {
    /// Picks the transport: an explicit connector, else a WebSocket URL.
    fn resolve_connector(&self) -> Result<Arc<dyn Connector>> {
        if let Some(connector) = &self.connector {
            return Ok(Arc::clone(connector));
        }

        let url = self.url.as_deref().ok_or_else(|| {
            Error::config(
                "Endpoint is required. Use .url() or .connector() to set it.\n\
                 Example: Socket::builder().url(\"ws://127.0.0.1:9222/devtools/browser\")",
            )
        })?;

        Ok(Arc::new(WebSocketConnector::new(url)?))
    }
}

// ============================================================================
// Tests
// ============================================================================
