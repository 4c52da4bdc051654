//! Socket facade.
//!
//! The single entry point for domain facades: submit commands, await their
//! results and subscribe to events.
//!
//! # Example
//!
//! ```no_run
//! use devtools_socket::{Command, Socket};
//! use serde_json::json;
//!
//! # async fn example() -> devtools_socket::Result<()> {
//! let socket = Socket::connect("ws://127.0.0.1:9222/devtools/page/1").await?;
//!
//! socket.add_event_handler("Page.loadEventFired", |event| {
//!     tracing::info!(timestamp = ?event.params.get("timestamp"), "Loaded");
//!     Ok(())
//! });
//!
//! socket.submit(Command::new("Page.enable")).await?;
//! socket
//!     .submit(Command::with_params("Page.navigate", json!({ "url": "https://example.com" })))
//!     .await?;
//!
//! socket.close().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::HandlerId;
use crate::protocol::{Command, Event, Request, codec};
use crate::transport::Connector;

use super::builder::SocketBuilder;
use super::config::SocketConfig;
use super::manager::{ConnectionManager, LoopCommand, Outgoing, Shared};
use super::state::ConnectionState;

// ============================================================================
// Socket
// ============================================================================

/// Handle to one protocol connection.
///
/// Cheap to clone; clones share the connection, the pending table and the
/// handler registry. The connection shuts down on [`Socket::close`] or once
/// every clone is dropped.
#[derive(Clone)]
pub struct Socket {
    shared: Arc<Shared>,
    loop_tx: mpsc::UnboundedSender<LoopCommand>,
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("endpoint", &self.shared.endpoint)
            .field("state", &self.shared.state())
            .field("pending", &self.shared.pending.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Socket - Constructors
// ============================================================================

impl Socket {
    /// Creates a builder for configuring a socket.
    #[inline]
    #[must_use]
    pub fn builder() -> SocketBuilder {
        SocketBuilder::new()
    }

    /// Connects to a WebSocket endpoint with default configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] or [`Error::Url`] if the URL is not `ws://`/`wss://`
    /// - [`Error::Connection`] if the endpoint is unreachable
    /// - [`Error::ConnectionTimeout`] if the handshake takes too long
    pub async fn connect(url: &str) -> Result<Self> {
        Self::builder().url(url).connect().await
    }

    /// Connects through `connector` with `config`.
    pub(crate) async fn open(connector: Arc<dyn Connector>, config: SocketConfig) -> Result<Self> {
        let shared = Arc::new(Shared::new(connector.endpoint(), config));
        let loop_tx = ConnectionManager::start(Arc::clone(&shared), connector).await?;

        Ok(Self { shared, loop_tx })
    }
}

// ============================================================================
// Socket - Commands
// ============================================================================

impl Socket {
    /// Submits a command and waits for its result with the configured
    /// default timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::NotOpen`] if the socket does not accept commands
    /// - [`Error::TooManyPending`] if too many commands are in flight
    /// - [`Error::Remote`] if the remote end rejected the command
    /// - [`Error::ConnectionClosed`] if the connection dropped first
    /// - [`Error::RequestTimeout`] if no response arrived in time
    pub async fn submit(&self, command: Command) -> Result<Value> {
        self.submit_with_timeout(command, self.shared.config.command_timeout)
            .await
    }

    /// Submits a command and waits up to `timeout_duration` for its result.
    ///
    /// On timeout the command stays pending: a late response or a drain
    /// still removes it, but nobody observes the outcome.
    ///
    /// # Errors
    ///
    /// Same as [`Socket::submit`].
    pub async fn submit_with_timeout(
        &self,
        command: Command,
        timeout_duration: Duration,
    ) -> Result<Value> {
        let state = self.shared.state();
        if !self.accepts_submissions(state) {
            return Err(Error::not_open(state));
        }

        let id = self.shared.ids.next_id();
        let method = command.method.clone();
        let frame = codec::encode(&Request::new(id, command))?;

        let rx = self.shared.pending.register(id, &method)?;

        if self
            .loop_tx
            .send(LoopCommand::Send(Outgoing { id, frame }))
            .is_err()
        {
            self.shared.pending.remove(id);
            return Err(Error::ConnectionClosed);
        }

        trace!(%id, method = %method, "Command submitted");

        match timeout(timeout_duration, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                warn!(%id, method = %method, "Command timed out");
                Err(Error::request_timeout(
                    id,
                    method,
                    timeout_duration.as_millis() as u64,
                ))
            }
        }
    }

    /// Submits `method` with serialized `params` and deserializes the result.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if `params` or the result fail to (de)serialize
    /// - Everything [`Socket::submit`] returns
    pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let command = Command::from_params(method, params)?;
        let value = self.submit(command).await?;
        Ok(serde_json::from_value(value)?)
    }

    fn accepts_submissions(&self, state: ConnectionState) -> bool {
        match state {
            ConnectionState::Open => true,
            ConnectionState::Reconnecting => self.shared.config.offline.queues(),
            _ => false,
        }
    }
}

// ============================================================================
// Socket - Events
// ============================================================================

impl Socket {
    /// Registers a handler for events named `event`.
    ///
    /// Handlers run on the event loop in registration order. Returning an
    /// error only logs it. Once the socket is closing or closed nothing is
    /// registered; the returned ID is already unregistered.
    pub fn add_event_handler<F>(&self, event: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
    {
        let id = self.shared.router.add_handler(event, handler);

        // Checked after registering so a concurrent teardown cannot miss it
        let state = self.shared.state();
        if state.is_terminal() {
            self.shared.router.remove_handler(id);
            warn!(%id, %state, "Socket is shut down, event handler not registered");
        }

        id
    }

    /// Registers a handler that receives event params deserialized as `T`.
    ///
    /// Events whose params do not match `T` are logged and skipped.
    pub fn on<T, F>(&self, event: impl Into<String>, callback: F) -> HandlerId
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.add_event_handler(event, move |raw: &Event| match raw.parse::<T>() {
            Ok(payload) => {
                callback(payload);
                Ok(())
            }
            Err(e) => {
                warn!(event = %raw.method, error = %e, "Skipping event with unexpected params");
                Ok(())
            }
        })
    }

    /// Removes a handler. Returns `false` if it was not registered.
    pub fn remove_event_handler(&self, id: HandlerId) -> bool {
        self.shared.router.remove_handler(id)
    }

    /// Waits for the next event named `event`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotOpen`] if the socket is closing or closed
    /// - [`Error::ConnectionClosed`] if the socket closes while waiting
    /// - [`Error::Timeout`] if no such event arrives in time
    pub async fn wait_for_event(&self, event: &str, timeout_duration: Duration) -> Result<Event> {
        let state = self.shared.state();
        if state.is_terminal() {
            return Err(Error::not_open(state));
        }

        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));

        // A handler refused after a concurrent close drops `tx`, which
        // surfaces below as ConnectionClosed
        let handler_id = self.add_event_handler(event, move |raw: &Event| {
            if let Some(tx) = slot.lock().take() {
                let _ = tx.send(raw.clone());
            }
            Ok(())
        });

        let outcome = timeout(timeout_duration, rx).await;
        self.shared.router.remove_handler(handler_id);

        match outcome {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::timeout(
                format!("waiting for {event}"),
                timeout_duration.as_millis() as u64,
            )),
        }
    }
}

// ============================================================================
// Socket - Accessors
// ============================================================================

impl Socket {
    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Returns a receiver that observes every state transition.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.subscribe()
    }

    /// Returns `true` if the connection is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.state().is_open()
    }

    /// Returns the number of commands awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    /// Returns the endpoint this socket talks to.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.shared.endpoint
    }

    /// Returns the effective configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SocketConfig {
        &self.shared.config
    }
}

// ============================================================================
// Socket - Lifecycle
// ============================================================================

impl Socket {
    /// Closes the connection.
    ///
    /// New submissions fail with [`Error::NotOpen`], pending commands fail
    /// with [`Error::ConnectionClosed`] and every handler is removed.
    /// Calling `close` again, from any clone, waits for the same shutdown.
    ///
    /// # Errors
    ///
    /// Transport close failures are logged, not returned.
    pub async fn close(&self) -> Result<()> {
        if !self.shared.transition(ConnectionState::Closing) {
            self.wait_closed().await;
            return Ok(());
        }

        debug!(endpoint = %self.shared.endpoint, "Closing socket");

        let (ack_tx, ack_rx) = oneshot::channel();
        if self.loop_tx.send(LoopCommand::Shutdown(ack_tx)).is_err() {
            // Event loop already gone
            self.shared.teardown();
            return Ok(());
        }

        let _ = ack_rx.await;
        info!(endpoint = %self.shared.endpoint, "Socket closed");
        Ok(())
    }

    async fn wait_closed(&self) {
        let mut changes = self.shared.subscribe();
        let _ = changes
            .wait_for(|state| *state == ConnectionState::Closed)
            .await;
    }
}

// ============================================================================
// Tests
// ============================================================================
