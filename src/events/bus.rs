//! Synchronous event bus for state-change notifications.
//!
//! Handlers for a kind run synchronously inside `publish`, in subscription
//! order. A handler that returns an error is logged and skipped; it never
//! prevents the remaining handlers from running and never reaches the
//! publisher. No global registry — each `EventBus` is an explicit instance,
//! and clones share one handler table so isolated test instances stay
//! isolated.

use super::types::{EventKind, GraphEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

type Handler = Arc<dyn Fn(&GraphEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
struct Registry {
    handlers: Mutex<HashMap<EventKind, Vec<(u64, Handler)>>>,
    next_id: AtomicU64,
}

/// Synchronous publish/subscribe channel for [`GraphEvent`]s.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    /// Create a new bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler to one event kind.
    ///
    /// Returns a [`Subscription`] handle; call `unsubscribe` (or drop the
    /// handle without calling it to keep the handler alive for the life of
    /// the bus).
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&GraphEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.registry.handlers.lock().expect("event bus poisoned");
        handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            registry: Arc::clone(&self.registry),
            kind,
            id,
        }
    }

    /// Publish an event to all current handlers of its kind, in
    /// subscription order. Handler failures are reported, not propagated.
    ///
    /// Handlers run outside the registry lock, so a handler may publish,
    /// subscribe, or unsubscribe on the same bus. Handlers subscribed
    /// mid-publish see only later events.
    pub fn publish(&self, event: GraphEvent) {
        let snapshot: Vec<(u64, Handler)> = {
            let handlers = self.registry.handlers.lock().expect("event bus poisoned");
            handlers
                .get(&event.kind())
                .map(|list| list.to_vec())
                .unwrap_or_default()
        };
        for (id, handler) in &snapshot {
            if let Err(e) = handler(&event) {
                warn!(kind = ?event.kind(), subscriber = id, "event handler failed: {e:#}");
            }
        }
    }

    /// Number of handlers currently subscribed to a kind.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.registry
            .handlers
            .lock()
            .expect("event bus poisoned")
            .get(&kind)
            .map_or(0, |list| list.len())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

/// Handle to one subscription; detaches the handler on `unsubscribe`.
pub struct Subscription {
    registry: Arc<Registry>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    /// Remove the handler. Events published afterwards no longer reach it.
    pub fn unsubscribe(self) {
        let mut handlers = self.registry.handlers.lock().expect("event bus poisoned");
        if let Some(list) = handlers.get_mut(&self.kind) {
            list.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::SyncFailure;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_publish_without_subscriber_no_panic() {
        let bus = EventBus::new();
        bus.publish(GraphEvent::StateChanged);
        assert_eq!(bus.subscriber_count(EventKind::StateChanged), 0);
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            let _sub = bus.subscribe(EventKind::StateChanged, move |_| {
                order.lock().unwrap().push(i);
                Ok(())
            });
        }

        bus.publish(GraphEvent::StateChanged);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_failing_handler_does_not_stop_the_rest() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));

        let _a = bus.subscribe(EventKind::SyncFailed, |_| anyhow::bail!("handler exploded"));
        let count2 = Arc::clone(&count);
        let _b = bus.subscribe(EventKind::SyncFailed, move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(GraphEvent::SyncFailed(SyncFailure::new("op", "reason")));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_detaches_handler() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));
        let count2 = Arc::clone(&count);
        let sub = bus.subscribe(EventKind::StateChanged, move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(GraphEvent::StateChanged);
        sub.unsubscribe();
        bus.publish(GraphEvent::StateChanged);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(EventKind::StateChanged), 0);
    }

    #[test]
    fn test_handler_may_publish_on_the_same_bus() {
        // A StateChanged handler that reacts by publishing again (the
        // store does exactly this via select/deselect) must not deadlock.
        let bus = EventBus::new();
        let relay = bus.clone();
        let failures = Arc::new(AtomicU32::new(0));

        let _relay_sub = bus.subscribe(EventKind::StateChanged, move |_| {
            relay.publish(GraphEvent::SyncFailed(SyncFailure::new(
                "relay", "forwarded",
            )));
            Ok(())
        });
        let failures2 = Arc::clone(&failures);
        let _count_sub = bus.subscribe(EventKind::SyncFailed, move |_| {
            failures2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(GraphEvent::StateChanged);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_subscribe_on_the_same_bus() {
        let bus = EventBus::new();
        let bus2 = bus.clone();
        let _sub = bus.subscribe(EventKind::StateChanged, move |_| {
            let _late = bus2.subscribe(EventKind::StateChanged, |_| Ok(()));
            Ok(())
        });

        bus.publish(GraphEvent::StateChanged);
        // The mid-publish subscription registered but did not see the
        // event that triggered it.
        assert_eq!(bus.subscriber_count(EventKind::StateChanged), 2);
    }

    #[test]
    fn test_kinds_are_independent() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));
        let count2 = Arc::clone(&count);
        let _sub = bus.subscribe(EventKind::SyncFailed, move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(GraphEvent::StateChanged);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clone_shares_registry() {
        let bus = EventBus::new();
        let bus2 = bus.clone();
        let count = Arc::new(AtomicU32::new(0));
        let count2 = Arc::clone(&count);
        let _sub = bus.subscribe(EventKind::StateChanged, move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus2.publish(GraphEvent::StateChanged);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_payload_reaches_handler() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None));
        let seen2 = Arc::clone(&seen);
        let _sub = bus.subscribe(EventKind::SyncFailed, move |event| {
            if let GraphEvent::SyncFailed(failure) = event {
                *seen2.lock().unwrap() = Some(failure.clone());
            }
            Ok(())
        });

        bus.publish(GraphEvent::SyncFailed(SyncFailure::new(
            "delete_node",
            "network or server error: 500",
        )));

        let failure = seen.lock().unwrap().clone().unwrap();
        assert_eq!(failure.operation, "delete_node");
    }
}
