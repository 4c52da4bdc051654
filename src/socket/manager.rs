//! Connection manager and event loop.
//!
//! The manager exclusively owns the transport. One tokio task per socket
//! runs the event loop, which handles:
//!
//! - Incoming frames (responses to the pending table, events to the router)
//! - Outgoing commands from [`Socket`](crate::Socket) submitters
//! - Connection loss, reconnect with backoff, and the offline queue
//! - Orderly shutdown
//!
//! # Connection Loss
//!
//! ```text
//! loss ──► drain in-flight (ConnectionClosed)
//!            │
//!            ├─ ReconnectPolicy::Disabled ──────────────► Closing ──► Closed
//!            │
//!            └─ ReconnectPolicy::Exponential ─► Reconnecting
//!                                                 │ success: flush offline queue, Open
//!                                                 └ exhausted: fail queue, Closed
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashSet;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{CommandId, IdAllocator};
use crate::protocol::{DecodedFrame, codec};
use crate::transport::{Connector, FrameSink, TransportParts};

use super::config::{OfflinePolicy, SocketConfig};
use super::pending::PendingTable;
use super::router::EventRouter;
use super::state::ConnectionState;

// ============================================================================
// Constants
// ============================================================================

/// Time allowed for the close handshake during shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest frame excerpt included in malformed-frame logs.
const LOG_EXCERPT_LEN: usize = 256;

// ============================================================================
// Shared
// ============================================================================

/// State shared between socket handles and the event loop.
pub(crate) struct Shared {
    /// Endpoint description, for logging.
    pub endpoint: String,
    /// Effective configuration.
    pub config: SocketConfig,
    /// Correlation ID source.
    pub ids: IdAllocator,
    /// In-flight and queued commands.
    pub pending: PendingTable,
    /// Event handler registry.
    pub router: EventRouter,
    /// Current connection state.
    state: watch::Sender<ConnectionState>,
}

impl Shared {
    pub(crate) fn new(endpoint: String, config: SocketConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            endpoint,
            pending: PendingTable::new(config.max_pending),
            config,
            ids: IdAllocator::new(),
            router: EventRouter::new(),
            state,
        }
    }

    /// Returns the current connection state.
    #[inline]
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribes to state transitions.
    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Transitions to `next`.
    ///
    /// Once closing has begun only `Closed` may follow. Returns `true` if the
    /// state changed.
    pub(crate) fn transition(&self, next: ConnectionState) -> bool {
        let mut previous = None;
        self.state.send_if_modified(|state| {
            if *state == next || (state.is_terminal() && next != ConnectionState::Closed) {
                return false;
            }
            previous = Some(std::mem::replace(state, next));
            true
        });

        match previous {
            Some(from) => {
                debug!(endpoint = %self.endpoint, from = %from, to = %next, "Connection state changed");
                true
            }
            None => false,
        }
    }

    /// Fails everything still pending and removes every handler.
    pub(crate) fn teardown(&self) {
        self.pending.drain_all(|| Error::ConnectionClosed);
        self.router.clear();
        self.transition(ConnectionState::Closed);
    }
}

// ============================================================================
// LoopCommand
// ============================================================================

/// An encoded request on its way to the transport.
pub(crate) struct Outgoing {
    /// Correlation ID, already registered in the pending table.
    pub id: CommandId,
    /// Encoded request frame.
    pub frame: String,
}

/// Internal commands for the event loop.
pub(crate) enum LoopCommand {
    /// Write a request.
    Send(Outgoing),
    /// Shut down, acknowledging once the transport is released.
    Shutdown(oneshot::Sender<()>),
}

/// Acknowledgement slot of a shutdown request. `None` when every socket
/// handle was dropped.
type ShutdownAck = Option<oneshot::Sender<()>>;

/// Why a connected session ended.
enum SessionEnd {
    /// Transport failed or the remote end closed.
    Lost(String),
    /// Shutdown requested.
    Shutdown(ShutdownAck),
}

/// Outcome of the reconnect phase.
enum ReconnectOutcome {
    /// New connection established.
    Connected(TransportParts),
    /// Attempts exhausted or reconnect disabled.
    GaveUp,
    /// Shutdown requested while reconnecting.
    Shutdown(ShutdownAck),
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Owner of the transport and driver of the event loop.
pub(crate) struct ConnectionManager {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    commands: mpsc::UnboundedReceiver<LoopCommand>,
    /// Commands submitted while reconnecting, in submission order.
    offline_queue: VecDeque<Outgoing>,
    /// Commands written on the current connection and not yet answered.
    written: FxHashSet<CommandId>,
}

impl ConnectionManager {
    /// Dials the endpoint and spawns the event loop.
    ///
    /// Returns the channel used to reach the loop.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the endpoint is unreachable
    /// - [`Error::ConnectionTimeout`] if dialing exceeds `connect_timeout`
    pub(crate) async fn start(
        shared: Arc<Shared>,
        connector: Arc<dyn Connector>,
    ) -> Result<mpsc::UnboundedSender<LoopCommand>> {
        let parts = match dial(connector.as_ref(), shared.config.connect_timeout).await {
            Ok(parts) => parts,
            Err(e) => {
                warn!(endpoint = %shared.endpoint, error = %e, "Initial connection failed");
                shared.transition(ConnectionState::Closed);
                return Err(e);
            }
        };

        shared.transition(ConnectionState::Open);
        info!(endpoint = %shared.endpoint, "Socket connected");

        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let manager = Self {
            shared,
            connector,
            commands: command_rx,
            offline_queue: VecDeque::new(),
            written: FxHashSet::default(),
        };
        tokio::spawn(manager.run(parts));

        Ok(command_tx)
    }

    /// Event loop: connected sessions separated by reconnect phases.
    async fn run(mut self, mut parts: TransportParts) {
        let ack = loop {
            // Commands queued while reconnecting go out before anything else
            let session = match self.flush_offline_queue(parts.sink.as_mut()).await {
                Ok(()) => self.run_session(&mut parts).await,
                Err(reason) => SessionEnd::Lost(reason),
            };

            let reason = match session {
                SessionEnd::Shutdown(ack) => {
                    close_sink(parts.sink.as_mut()).await;
                    break ack;
                }
                SessionEnd::Lost(reason) => reason,
            };

            warn!(endpoint = %self.shared.endpoint, reason = %reason, "Connection lost");

            if !self.shared.config.reconnect.is_enabled() {
                self.shared.transition(ConnectionState::Closing);
                self.drain_in_flight();
                break None;
            }

            self.shared.transition(ConnectionState::Reconnecting);
            self.drain_in_flight();

            match self.reconnect().await {
                ReconnectOutcome::Connected(new_parts) => {
                    parts = new_parts;
                    // close() may have begun while dialing; its shutdown is
                    // already queued and ends the next session
                    if self.shared.transition(ConnectionState::Open) {
                        info!(endpoint = %self.shared.endpoint, "Socket reconnected");
                    }
                }
                ReconnectOutcome::GaveUp => {
                    error!(endpoint = %self.shared.endpoint, "Reconnect attempts exhausted");
                    break None;
                }
                ReconnectOutcome::Shutdown(ack) => break ack,
            }
        };

        self.finish(ack);
    }

    /// Serves one connected session until it ends.
    async fn run_session(&mut self, parts: &mut TransportParts) -> SessionEnd {
        loop {
            tokio::select! {
                // Incoming frames from the remote end
                frame = parts.stream.recv() => {
                    match frame {
                        Some(Ok(text)) => self.handle_incoming(&text),
                        Some(Err(e)) => {
                            error!(error = %e, "Transport read failed");
                            return SessionEnd::Lost(e.to_string());
                        }
                        None => {
                            debug!("Transport stream ended");
                            return SessionEnd::Lost("stream ended".to_string());
                        }
                    }
                }

                // Commands from socket handles
                command = self.commands.recv() => {
                    match command {
                        Some(LoopCommand::Send(outgoing)) => {
                            if let Err(reason) = self.write(parts.sink.as_mut(), outgoing).await {
                                return SessionEnd::Lost(reason);
                            }
                        }
                        Some(LoopCommand::Shutdown(ack)) => {
                            debug!("Shutdown command received");
                            return SessionEnd::Shutdown(Some(ack));
                        }
                        None => {
                            debug!("All socket handles dropped");
                            return SessionEnd::Shutdown(None);
                        }
                    }
                }
            }
        }
    }

    /// Routes one inbound frame.
    fn handle_incoming(&mut self, text: &str) {
        match codec::decode(text) {
            Ok(DecodedFrame::Response(response)) => {
                let id = response.id;
                trace!(%id, "Response received");
                self.written.remove(&id);
                if let Err(e) = self.shared.pending.complete(response) {
                    warn!(%id, error = %e, "Dropping response");
                }
            }

            Ok(DecodedFrame::Event(event)) => {
                let handled = self.shared.router.dispatch(&event);
                trace!(event = %event.method, handled, "Event dispatched");
            }

            Err(e) => {
                warn!(error = %e, frame = %excerpt(text), "Dropping malformed frame");
            }
        }
    }

    /// Writes one request. On failure the command is failed and the
    /// connection is reported lost.
    async fn write(
        &mut self,
        sink: &mut dyn FrameSink,
        outgoing: Outgoing,
    ) -> std::result::Result<(), String> {
        let id = outgoing.id;

        if !self.shared.pending.contains(id) {
            trace!(%id, "Skipping write for resolved command");
            return Ok(());
        }

        match sink.send(outgoing.frame).await {
            Ok(()) => {
                trace!(%id, "Request sent");
                self.written.insert(id);
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                let _ = self.shared.pending.fail(id, Error::connection(reason.clone()));
                error!(%id, error = %reason, "Transport write failed");
                Err(reason)
            }
        }
    }

    /// Retries the connection per the reconnect policy, serving submissions
    /// under the offline policy meanwhile.
    async fn reconnect(&mut self) -> ReconnectOutcome {
        let policy = self.shared.config.reconnect;
        let mut attempt = 0;

        while let Some(delay) = policy.delay_for(attempt) {
            attempt += 1;
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Waiting before reconnect");

            let wait = sleep(delay);
            tokio::pin!(wait);
            loop {
                tokio::select! {
                    () = &mut wait => break,
                    command = self.commands.recv() => {
                        if let Some(ack) = self.handle_offline(command) {
                            return ReconnectOutcome::Shutdown(ack);
                        }
                    }
                }
            }

            let connector = Arc::clone(&self.connector);
            let connect_timeout = self.shared.config.connect_timeout;
            let attempt_dial = async move { dial(connector.as_ref(), connect_timeout).await };
            tokio::pin!(attempt_dial);

            loop {
                tokio::select! {
                    result = &mut attempt_dial => {
                        match result {
                            Ok(parts) => return ReconnectOutcome::Connected(parts),
                            Err(e) => {
                                warn!(attempt, error = %e, "Reconnect attempt failed");
                                break;
                            }
                        }
                    }
                    command = self.commands.recv() => {
                        if let Some(ack) = self.handle_offline(command) {
                            return ReconnectOutcome::Shutdown(ack);
                        }
                    }
                }
            }
        }

        ReconnectOutcome::GaveUp
    }

    /// Handles a loop command while disconnected.
    ///
    /// Returns `Some` when the loop must shut down.
    fn handle_offline(&mut self, command: Option<LoopCommand>) -> Option<ShutdownAck> {
        match command {
            Some(LoopCommand::Send(outgoing)) => {
                self.enqueue_offline(outgoing);
                None
            }
            Some(LoopCommand::Shutdown(ack)) => Some(Some(ack)),
            None => Some(None),
        }
    }

    /// Applies the offline policy to a command that arrived while reconnecting.
    fn enqueue_offline(&mut self, outgoing: Outgoing) {
        let id = outgoing.id;

        if !self.shared.pending.contains(id) {
            return;
        }

        match self.shared.config.offline {
            OfflinePolicy::FailFast => {
                let _ = self
                    .shared
                    .pending
                    .fail(id, Error::not_open(ConnectionState::Reconnecting));
            }
            OfflinePolicy::Queue { capacity } => {
                if self.offline_queue.len() >= capacity {
                    warn!(%id, capacity, "Offline queue full");
                    let _ = self.shared.pending.fail(id, Error::QueueFull { capacity });
                } else {
                    trace!(%id, queued = self.offline_queue.len() + 1, "Command queued while reconnecting");
                    self.offline_queue.push_back(outgoing);
                }
            }
        }
    }

    /// Writes queued commands in submission order.
    ///
    /// On failure the commands not yet written stay queued.
    async fn flush_offline_queue(
        &mut self,
        sink: &mut dyn FrameSink,
    ) -> std::result::Result<(), String> {
        if self.offline_queue.is_empty() {
            return Ok(());
        }

        debug!(count = self.offline_queue.len(), "Flushing offline queue");

        while let Some(outgoing) = self.offline_queue.pop_front() {
            self.write(sink, outgoing).await?;
        }

        Ok(())
    }

    /// Fails the commands written on the lost connection.
    ///
    /// Written commands are never replayed: the remote end may already have
    /// executed them. Commands registered but not yet written are left
    /// pending; they reach the loop afterwards and follow the offline policy.
    fn drain_in_flight(&mut self) {
        let drained = self
            .written
            .drain()
            .filter(|&id| self.shared.pending.fail(id, Error::ConnectionClosed).is_ok())
            .count();

        if drained > 0 {
            warn!(count = drained, "Failed in-flight commands after connection loss");
        }
    }

    /// Terminal cleanup: reject late submissions and release everything.
    fn finish(mut self, ack: ShutdownAck) {
        self.shared.transition(ConnectionState::Closed);

        // Fail anything that reached the channel before it closed
        self.commands.close();
        let mut acks = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                LoopCommand::Send(outgoing) => {
                    let _ = self.shared.pending.fail(outgoing.id, Error::ConnectionClosed);
                }
                LoopCommand::Shutdown(ack) => acks.push(ack),
            }
        }

        self.offline_queue.clear();
        self.shared.teardown();

        for ack in ack.into_iter().chain(acks) {
            let _ = ack.send(());
        }

        debug!(endpoint = %self.shared.endpoint, "Event loop terminated");
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Dials with a timeout.
async fn dial(connector: &dyn Connector, connect_timeout: Duration) -> Result<TransportParts> {
    timeout(connect_timeout, connector.connect())
        .await
        .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))?
}

/// Best-effort close handshake.
async fn close_sink(sink: &mut dyn FrameSink) {
    match timeout(CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => debug!("Transport closed"),
        Ok(Err(e)) => debug!(error = %e, "Transport close failed"),
        Err(_) => debug!("Transport close timed out"),
    }
}

/// Truncates a frame for logging.
fn excerpt(text: &str) -> &str {
    if text.len() <= LOG_EXCERPT_LEN {
        return text;
    }
    let mut end = LOG_EXCERPT_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::oneshot::error::TryRecvError;

    use crate::protocol::{Command, Request};
    use crate::socket::ReconnectPolicy;
    use crate::transport::{MemoryAcceptor, MemoryConnector};

    fn queueing_config() -> SocketConfig {
        SocketConfig::new()
            .with_reconnect(ReconnectPolicy::exponential(3))
            .with_offline(OfflinePolicy::Queue { capacity: 4 })
    }

    fn manager_with(config: SocketConfig) -> (ConnectionManager, MemoryConnector, MemoryAcceptor) {
        let (connector, acceptor) = MemoryConnector::new();
        let shared = Arc::new(Shared::new(connector.endpoint(), config));
        let (_tx, commands) = mpsc::unbounded_channel();
        let manager = ConnectionManager {
            shared,
            connector: Arc::new(connector.clone()),
            commands,
            offline_queue: VecDeque::new(),
            written: FxHashSet::default(),
        };
        (manager, connector, acceptor)
    }

    fn outgoing(id: u64, method: &str) -> Outgoing {
        let id = CommandId::new(id);
        let frame = codec::encode(&Request::new(id, Command::new(method))).expect("encode");
        Outgoing { id, frame }
    }

    #[test]
    fn test_constants() {
        assert_eq!(CLOSE_TIMEOUT.as_secs(), 5);
        assert_eq!(LOG_EXCERPT_LEN, 256);
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let short = "{\"id\":1}";
        assert_eq!(excerpt(short), short);

        let long = "é".repeat(LOG_EXCERPT_LEN);
        let cut = excerpt(&long);
        assert!(cut.len() <= LOG_EXCERPT_LEN);
        assert!(long.starts_with(cut));
    }

    #[test]
    fn test_closing_only_moves_to_closed() {
        let shared = Shared::new("memory://".into(), SocketConfig::new());
        assert!(shared.transition(ConnectionState::Open));
        assert!(!shared.transition(ConnectionState::Open));

        assert!(shared.transition(ConnectionState::Closing));
        assert!(!shared.transition(ConnectionState::Closing));
        assert!(!shared.transition(ConnectionState::Open));
        assert!(!shared.transition(ConnectionState::Reconnecting));
        assert_eq!(shared.state(), ConnectionState::Closing);

        assert!(shared.transition(ConnectionState::Closed));
        assert!(!shared.transition(ConnectionState::Closing));
        assert_eq!(shared.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_state_changes_are_observable() {
        let shared = Shared::new("memory://".into(), SocketConfig::new());
        let mut changes = shared.subscribe();

        shared.transition(ConnectionState::Open);
        changes.changed().await.expect("sender alive");
        assert_eq!(*changes.borrow_and_update(), ConnectionState::Open);
    }

    #[test]
    fn test_teardown_drains_and_clears() {
        let shared = Shared::new("memory://".into(), SocketConfig::new());
        let mut rx = shared
            .pending
            .register(CommandId::new(1), "Page.enable")
            .expect("register");
        shared.router.add_handler("Page.loadEventFired", |_| Ok(()));

        shared.teardown();

        assert_eq!(shared.state(), ConnectionState::Closed);
        assert!(shared.pending.is_empty());
        assert!(shared.router.is_empty());
        assert!(matches!(rx.try_recv(), Ok(Err(Error::ConnectionClosed))));
    }

    #[tokio::test]
    async fn test_loss_fails_written_commands_and_queues_the_rest() {
        let (mut manager, connector, mut acceptor) = manager_with(queueing_config());
        let shared = Arc::clone(&manager.shared);
        shared.transition(ConnectionState::Open);

        let mut parts = connector.connect().await.expect("connect");
        let _peer = acceptor.accept().await.expect("peer");

        let mut written = shared
            .pending
            .register(CommandId::new(1), "Page.reload")
            .expect("register");
        manager
            .write(parts.sink.as_mut(), outgoing(1, "Page.reload"))
            .await
            .expect("write");

        // A submitter observes Reconnecting before the drain runs
        shared.transition(ConnectionState::Reconnecting);
        let mut late = shared
            .pending
            .register(CommandId::new(2), "Page.enable")
            .expect("register");
        manager.drain_in_flight();

        assert!(matches!(written.try_recv(), Ok(Err(Error::ConnectionClosed))));
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
        assert!(shared.pending.contains(CommandId::new(2)));

        // Its loop command then arrives and is queued
        let command = LoopCommand::Send(outgoing(2, "Page.enable"));
        assert!(manager.handle_offline(Some(command)).is_none());
        assert_eq!(manager.offline_queue.len(), 1);

        // and is written first on the next connection
        let mut parts = connector.connect().await.expect("reconnect");
        let mut peer = acceptor.accept().await.expect("peer");
        manager
            .flush_offline_queue(parts.sink.as_mut())
            .await
            .expect("flush");

        let request = peer.recv_request().await.expect("request");
        assert_eq!(request.id, CommandId::new(2));
        assert!(manager.offline_queue.is_empty());
        assert!(manager.written.contains(&CommandId::new(2)));
    }

    #[tokio::test]
    async fn test_flush_failure_keeps_unwritten_commands_queued() {
        let (mut manager, connector, mut acceptor) = manager_with(queueing_config());
        let shared = Arc::clone(&manager.shared);
        shared.transition(ConnectionState::Reconnecting);

        let mut first = shared
            .pending
            .register(CommandId::new(1), "A.first")
            .expect("register");
        let mut second = shared
            .pending
            .register(CommandId::new(2), "A.second")
            .expect("register");
        manager.enqueue_offline(outgoing(1, "A.first"));
        manager.enqueue_offline(outgoing(2, "A.second"));

        let mut parts = connector.connect().await.expect("connect");
        drop(acceptor.accept().await.expect("peer"));

        assert!(manager.flush_offline_queue(parts.sink.as_mut()).await.is_err());

        assert!(matches!(first.try_recv(), Ok(Err(Error::Connection { .. }))));
        assert!(matches!(second.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(manager.offline_queue.len(), 1);
        assert!(manager.written.is_empty());
    }
}
