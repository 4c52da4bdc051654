//! Event router.
//!
//! Keeps per-event-name handler registries and fans incoming events out to
//! every handler registered for the event's method, in registration order.
//!
//! Dispatch runs on the socket's event loop. Handlers should return quickly
//! and hand heavy work to another task: a slow handler delays every frame
//! behind it on the same connection.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use crate::error::Result;
use crate::identifiers::HandlerId;
use crate::protocol::Event;

// ============================================================================
// Types
// ============================================================================

/// Event handler callback type.
///
/// Called for each event whose method matches the registration. An `Err`
/// return (or a panic) is logged and does not affect other handlers.
pub type EventHandler = Arc<dyn Fn(&Event) -> Result<()> + Send + Sync>;

/// One registration in an event's handler list.
#[derive(Clone)]
struct Registration {
    id: HandlerId,
    handler: EventHandler,
}

#[derive(Default)]
struct Registry {
    /// Handlers per event method, in registration order.
    by_event: FxHashMap<String, Vec<Registration>>,
    /// Reverse index for removal.
    names: FxHashMap<HandlerId, String>,
}

// ============================================================================
// EventRouter
// ============================================================================

/// Per-socket event handler registry.
#[derive(Default)]
pub struct EventRouter {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

impl EventRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `event` and returns its registration handle.
    pub fn add_handler<F>(&self, event: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
    {
        let event = event.into();
        let id = HandlerId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);

        let mut registry = self.registry.lock();
        registry
            .by_event
            .entry(event.clone())
            .or_default()
            .push(Registration {
                id,
                handler: Arc::new(handler),
            });
        registry.names.insert(id, event.clone());

        trace!(%id, event = %event, "Event handler registered");
        id
    }

    /// Removes a handler. Returns `false` if it was not registered.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut registry = self.registry.lock();

        let Some(event) = registry.names.remove(&id) else {
            return false;
        };

        if let Some(handlers) = registry.by_event.get_mut(&event) {
            handlers.retain(|r| r.id != id);
            if handlers.is_empty() {
                registry.by_event.remove(&event);
            }
        }

        trace!(%id, event = %event, "Event handler removed");
        true
    }

    /// Invokes every handler registered for the event's method.
    ///
    /// Iterates a snapshot, so handlers may register or remove handlers
    /// without deadlocking; such changes apply from the next event on.
    /// Returns the number of handlers that completed successfully.
    pub fn dispatch(&self, event: &Event) -> usize {
        let snapshot: Vec<Registration> = {
            let registry = self.registry.lock();
            match registry.by_event.get(&event.method) {
                Some(handlers) => handlers.clone(),
                None => return 0,
            }
        };

        let mut succeeded = 0;
        for registration in snapshot {
            match catch_unwind(AssertUnwindSafe(|| (registration.handler)(event))) {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(e)) => {
                    warn!(id = %registration.id, event = %event.method, error = %e, "Event handler failed");
                }
                Err(payload) => {
                    warn!(
                        id = %registration.id,
                        event = %event.method,
                        panic = %panic_message(payload.as_ref()),
                        "Event handler panicked"
                    );
                }
            }
        }

        succeeded
    }

    /// Returns the number of handlers registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.registry
            .lock()
            .by_event
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Returns the total number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.lock().names.len()
    }

    /// Returns `true` if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.lock().names.is_empty()
    }

    /// Removes every registration.
    pub fn clear(&self) {
        let mut registry = self.registry.lock();
        registry.by_event.clear();
        registry.names.clear();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::error::Error;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> EventHandler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = Arc::clone(&log);
            move |tag: &'static str| -> EventHandler {
                let log = Arc::clone(&log);
                Arc::new(move |event: &Event| {
                    log.lock().push(format!("{tag}:{}", event.method));
                    Ok(())
                })
            }
        };
        (log, make)
    }

    #[test]
    fn test_handlers_fire_in_registration_order() {
        let router = EventRouter::new();
        let (log, make) = recorder();

        let first = make("first");
        let second = make("second");
        router.add_handler("Foo.changed", move |e: &Event| first(e));
        router.add_handler("Foo.changed", move |e: &Event| second(e));

        let invoked = router.dispatch(&Event::new("Foo.changed", json!({})));
        assert_eq!(invoked, 2);
        assert_eq!(*log.lock(), vec!["first:Foo.changed", "second:Foo.changed"]);
    }

    #[test]
    fn test_removed_handler_does_not_fire() {
        let router = EventRouter::new();
        let (log, make) = recorder();

        let first = make("first");
        let second = make("second");
        let id = router.add_handler("Foo.changed", move |e: &Event| first(e));
        router.add_handler("Foo.changed", move |e: &Event| second(e));

        assert!(router.remove_handler(id));
        assert!(!router.remove_handler(id));

        router.dispatch(&Event::new("Foo.changed", json!({})));
        assert_eq!(*log.lock(), vec!["second:Foo.changed"]);
    }

    #[test]
    fn test_events_only_reach_matching_name() {
        let router = EventRouter::new();
        let (log, make) = recorder();

        let handler = make("dom");
        router.add_handler("DOM.documentUpdated", move |e: &Event| handler(e));

        assert_eq!(router.dispatch(&Event::new("CSS.styleSheetAdded", json!({}))), 0);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_failing_handlers_do_not_stop_others() {
        let router = EventRouter::new();
        let (log, make) = recorder();

        router.add_handler("Foo.changed", |_: &Event| Err(Error::handler("nope")));
        router.add_handler("Foo.changed", |_: &Event| -> Result<()> { panic!("boom") });
        let last = make("last");
        router.add_handler("Foo.changed", move |e: &Event| last(e));

        let succeeded = router.dispatch(&Event::new("Foo.changed", json!({})));
        assert_eq!(succeeded, 1);
        assert_eq!(*log.lock(), vec!["last:Foo.changed"]);

        // router still usable after a panic
        assert_eq!(router.dispatch(&Event::new("Foo.changed", json!({}))), 1);
    }

    #[test]
    fn test_handler_may_mutate_registry_during_dispatch() {
        let router = Arc::new(EventRouter::new());
        let inner = Arc::clone(&router);

        router.add_handler("Foo.changed", move |_: &Event| {
            inner.add_handler("Foo.changed", |_: &Event| Ok(()));
            Ok(())
        });

        assert_eq!(router.dispatch(&Event::new("Foo.changed", json!({}))), 1);
        assert_eq!(router.handler_count("Foo.changed"), 2);
    }

    #[test]
    fn test_clear() {
        let router = EventRouter::new();
        router.add_handler("A.x", |_: &Event| Ok(()));
        router.add_handler("B.y", |_: &Event| Ok(()));
        assert_eq!(router.len(), 2);

        router.clear();
        assert!(router.is_empty());
        assert_eq!(router.handler_count("A.x"), 0);
    }
}
