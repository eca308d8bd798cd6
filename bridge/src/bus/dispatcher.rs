//! Listener registry and synchronous dispatch.
//!
//! Listeners are called in subscription order. Dispatch works on a snapshot
//! of the registry, so listeners may subscribe or unsubscribe from inside a
//! callback; changes take effect from the next dispatch.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::{BusEvent, EventKind};

/// Identifier of a registered listener.
pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&BusEvent) + Send + Sync>;

struct Registered {
    id: ListenerId,
    kind: EventKind,
    listener: Listener,
}

/// Process-wide dispatch table for native change events.
///
/// Constructed once and shared via `Arc` with every component that needs it.
#[derive(Default)]
pub struct ChangeEventBus {
    listeners: RwLock<Vec<Registered>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ChangeEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeEventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl ChangeEventBus {
    /// Create a new bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new bus wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a listener for one event kind.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// dropped or unsubscribed.
    pub fn subscribe<F>(self: &Arc<Self>, kind: EventKind, listener: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push(Registered {
            id,
            kind,
            listener: Arc::new(listener),
        });

        tracing::trace!(listener_id = id, ?kind, "Bus listener registered");

        Subscription {
            id,
            bus: Arc::downgrade(self),
        }
    }

    /// Register a handler for progress events of `event` carrying a freshly
    /// generated correlation id.
    ///
    /// Hand [`CorrelatedSubscription::correlation_id`] to the native request
    /// that reports the progress.
    pub fn subscribe_correlated<F>(
        self: &Arc<Self>,
        event: impl Into<String>,
        handler: F,
    ) -> CorrelatedSubscription
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        let event = event.into();
        let correlation_id = uuid::Uuid::new_v4().to_string();

        let expected_id = correlation_id.clone();
        let subscription = self.subscribe(EventKind::Progress, move |bus_event| {
            if let BusEvent::Progress(progress) = bus_event {
                if progress.event == event && progress.correlation_id == expected_id {
                    handler(&progress.payload);
                }
            }
        });

        CorrelatedSubscription {
            correlation_id,
            subscription,
        }
    }

    fn unsubscribe(&self, id: ListenerId) {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|registered| registered.id != id);
        if listeners.len() != before {
            tracing::trace!(listener_id = id, "Bus listener unregistered");
        }
    }

    /// Deliver an event to every listener of its kind.
    ///
    /// Returns the number of listeners that handled the event. A panicking
    /// listener is logged and skipped; the remaining listeners still run.
    pub fn publish(&self, event: &BusEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<(ListenerId, Listener)> = self
            .listeners
            .read()
            .iter()
            .filter(|registered| registered.kind == kind)
            .map(|registered| (registered.id, Arc::clone(&registered.listener)))
            .collect();

        let mut delivered = 0;
        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::error!(listener_id = id, ?kind, "Bus listener panicked"),
            }
        }

        tracing::debug!(?kind, recipients = delivered, "Dispatched bus event");

        delivered
    }

    /// Decode a native event envelope and dispatch it.
    pub fn publish_native(&self, json: &str) -> crate::Result<usize> {
        let event = BusEvent::from_native(json)?;
        Ok(self.publish(&event))
    }

    /// Get the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

/// Registration handle returned by [`ChangeEventBus::subscribe`].
///
/// Dropping the handle unregisters the listener.
#[must_use = "dropping a subscription unregisters its listener"]
#[derive(Debug)]
pub struct Subscription {
    id: ListenerId,
    bus: Weak<ChangeEventBus>,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Unregister the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

/// Subscription scoped to one correlation id.
#[must_use = "dropping a subscription unregisters its handler"]
#[derive(Debug)]
pub struct CorrelatedSubscription {
    correlation_id: String,
    subscription: Subscription,
}

impl CorrelatedSubscription {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn unsubscribe(self) {
        self.subscription.unsubscribe();
    }
}
