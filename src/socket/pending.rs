//! Pending-request table.
//!
//! Tracks in-flight commands by correlation ID. Every entry is removed
//! exactly once: by [`PendingTable::resolve`], [`PendingTable::fail`],
//! [`PendingTable::complete`], [`PendingTable::remove`] or
//! [`PendingTable::drain_all`]. Removal happens under the lock; delivery to
//! the caller's oneshot happens after it is released.

// ============================================================================
// Imports
// ============================================================================

use std::time::Instant;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;
use crate::protocol::Response;

// ============================================================================
// Types
// ============================================================================

/// Receiving end of a command's resolution slot.
pub type ResolutionReceiver = oneshot::Receiver<Result<Value>>;

/// One in-flight command.
struct PendingEntry {
    /// Method, for tagging remote errors and logging.
    method: String,
    /// Single-assignment resolution slot.
    slot: oneshot::Sender<Result<Value>>,
    /// When the command was registered.
    registered_at: Instant,
}

impl PendingEntry {
    /// Delivers the outcome. A dropped receiver means the caller abandoned
    /// interest; the outcome is discarded.
    fn deliver(self, id: CommandId, outcome: Result<Value>) {
        let elapsed_ms = self.registered_at.elapsed().as_millis() as u64;
        if self.slot.send(outcome).is_err() {
            debug!(%id, method = %self.method, elapsed_ms, "Caller abandoned command");
        } else {
            trace!(%id, method = %self.method, elapsed_ms, "Command resolved");
        }
    }
}

// ============================================================================
// PendingTable
// ============================================================================

/// Map of correlation IDs to resolution slots.
///
/// # Thread Safety
///
/// Shared between submitters and the event loop behind one mutex.
pub struct PendingTable {
    entries: Mutex<FxHashMap<CommandId, PendingEntry>>,
    max_pending: usize,
}

impl PendingTable {
    /// Creates an empty table accepting at most `max_pending` entries.
    #[must_use]
    pub fn new(max_pending: usize) -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
            max_pending,
        }
    }

    /// Registers a command and returns the receiver for its outcome.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateId`] if `id` is already pending
    /// - [`Error::TooManyPending`] if the table is full
    pub fn register(&self, id: CommandId, method: &str) -> Result<ResolutionReceiver> {
        let mut entries = self.entries.lock();

        if entries.contains_key(&id) {
            return Err(Error::DuplicateId { id });
        }

        if entries.len() >= self.max_pending {
            return Err(Error::TooManyPending {
                limit: self.max_pending,
            });
        }

        let (slot, rx) = oneshot::channel();
        entries.insert(
            id,
            PendingEntry {
                method: method.to_string(),
                slot,
                registered_at: Instant::now(),
            },
        );

        Ok(rx)
    }

    /// Resolves a command with a result payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleResponse`] if `id` is not pending.
    pub fn resolve(&self, id: CommandId, result: Value) -> Result<()> {
        let entry = self.take(id)?;
        entry.deliver(id, Ok(result));
        Ok(())
    }

    /// Fails a command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleResponse`] if `id` is not pending.
    pub fn fail(&self, id: CommandId, error: Error) -> Result<()> {
        let entry = self.take(id)?;
        entry.deliver(id, Err(error));
        Ok(())
    }

    /// Resolves a command from a decoded response, converting a remote
    /// error object into [`Error::Remote`] tagged with the command's method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleResponse`] if the response ID is not pending.
    pub fn complete(&self, response: Response) -> Result<()> {
        let id = response.id;
        let entry = self.take(id)?;
        let outcome = response.into_result(&entry.method);
        entry.deliver(id, outcome);
        Ok(())
    }

    /// Removes an entry without delivering anything.
    ///
    /// Used when a submission fails before the command reaches the event loop;
    /// the caller reports the error itself.
    pub fn remove(&self, id: CommandId) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    /// Fails every pending command with an error from `make_error`.
    ///
    /// Returns the number of commands drained.
    pub fn drain_all(&self, make_error: impl Fn() -> Error) -> usize {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        let count = drained.len();

        for (id, entry) in drained {
            entry.deliver(id, Err(make_error()));
        }

        if count > 0 {
            debug!(count, "Drained pending commands");
        }

        count
    }

    /// Returns `true` if `id` is pending.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: CommandId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    /// Returns the number of pending commands.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn take(&self, id: CommandId) -> Result<PendingEntry> {
        self.entries
            .lock()
            .remove(&id)
            .ok_or(Error::StaleResponse { id })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::protocol::RemoteError;

    fn id(n: u64) -> CommandId {
        CommandId::new(n)
    }

    #[tokio::test]
    async fn test_resolve_delivers_once() {
        let table = PendingTable::new(16);
        let rx = table.register(id(1), "Page.enable").expect("register");

        table.resolve(id(1), json!({ "ok": true })).expect("resolve");
        assert!(table.is_empty());

        let outcome = rx.await.expect("delivered").expect("success");
        assert_eq!(outcome, json!({ "ok": true }));

        // second resolution is stale
        let err = table.resolve(id(1), json!({})).expect_err("stale");
        assert!(matches!(err, Error::StaleResponse { .. }));
        assert!(table.fail(id(1), Error::ConnectionClosed).is_err());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let table = PendingTable::new(16);
        let _rx = table.register(id(5), "A.b").expect("register");
        let err = table.register(id(5), "A.c").expect_err("duplicate");
        assert!(matches!(err, Error::DuplicateId { id } if id == CommandId::new(5)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_capacity_limit() {
        let table = PendingTable::new(2);
        let _a = table.register(id(1), "A.a").expect("1");
        let _b = table.register(id(2), "A.b").expect("2");
        let err = table.register(id(3), "A.c").expect_err("full");
        assert!(matches!(err, Error::TooManyPending { limit: 2 }));
    }

    #[tokio::test]
    async fn test_complete_tags_remote_error_with_method() {
        let table = PendingTable::new(16);
        let rx = table.register(id(4), "Debugger.pause").expect("register");

        table
            .complete(Response::failure(id(4), RemoteError::new(-32000, "not paused")))
            .expect("complete");

        match rx.await.expect("delivered") {
            Err(Error::Remote { method, code, .. }) => {
                assert_eq!(method, "Debugger.pause");
                assert_eq!(code, -32000);
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_response_is_stale() {
        let table = PendingTable::new(16);
        let _rx = table.register(id(1), "A.b").expect("register");

        let err = table
            .complete(Response::success(id(99), json!({})))
            .expect_err("stale");
        assert!(matches!(err, Error::StaleResponse { id } if id == CommandId::new(99)));
        assert!(table.contains(id(1)));
    }

    #[tokio::test]
    async fn test_drain_all_fails_every_entry() {
        let table = PendingTable::new(16);
        let receivers: Vec<_> = (1..=5)
            .map(|n| table.register(id(n), "Foo.bar").expect("register"))
            .collect();

        assert_eq!(table.drain_all(|| Error::ConnectionClosed), 5);
        assert!(table.is_empty());

        for rx in receivers {
            let outcome = rx.await.expect("delivered");
            assert!(matches!(outcome, Err(Error::ConnectionClosed)));
        }
    }

    #[test]
    fn test_abandoned_receiver_still_removed() {
        let table = PendingTable::new(16);
        let rx = table.register(id(1), "A.b").expect("register");
        drop(rx);

        assert!(table.resolve(id(1), json!(null)).is_ok());
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove_without_delivery() {
        let table = PendingTable::new(16);
        let mut rx = table.register(id(1), "A.b").expect("register");
        assert!(table.remove(id(1)));
        assert!(!table.remove(id(1)));
        assert!(rx.try_recv().is_err());
    }
}
