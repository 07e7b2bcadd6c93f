//! Subscription
//!
//! A Subscription is one observer's attachment to an upstream notification
//! source, plus the fan-out registry for its own descendants.
//!
//! # Lifecycle
//!
//! 1. Created detached. The descendant registry is the null registry: nested
//!    notifications are no-ops and nothing is allocated.
//!
//! 2. `try_subscribe` attaches a single, stable wrapper callback upstream and
//!    allocates a fresh descendant registry.
//!
//! 3. `try_unsubscribe` detaches the wrapper, clears the descendant registry
//!    and falls back to the null registry.
//!
//! Both transitions are idempotent.
//!
//! 4. `close` detaches for good. A closed subscription never attaches again,
//!    not even when a descendant subscribes to it.
//!
//! # Nesting
//!
//! A Subscription is itself a [`NotificationSource`]. Subscribing to it
//! attaches it upstream if needed and registers the listener in its
//! descendant registry. The owner decides when descendants hear about a
//! change by calling [`notify_nested_subs`](Subscription::notify_nested_subs),
//! which it does only after committing its own update.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use super::context::{Batch, BindContext};
use super::listeners::{Listener, ListenerRegistry};
use super::store::{NotificationSource, Unsubscribe};

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Inner {
    id: SubscriptionId,
    source: Arc<dyn NotificationSource>,
    batch: Batch,

    /// Present exactly while attached upstream.
    unsubscribe: Mutex<Option<Unsubscribe>>,

    /// Set once the owner is done with this subscription.
    closed: AtomicBool,

    /// Descendant registry. `None` is the null registry.
    listeners: Mutex<Option<ListenerRegistry>>,

    /// Change detector installed by the owner.
    on_state_change: Mutex<Option<Listener>>,

    /// The one callback ever handed upstream.
    handle_change_wrapper: Listener,
}

impl Inner {
    fn handle_change(&self) {
        // Clone out so the slot is unlocked while the detector runs.
        let callback = self.on_state_change.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// An observer's attachment to a store or to an ancestor subscription.
///
/// Clones share the same attachment.
#[derive(Clone)]
pub struct Subscription(Arc<Inner>);

impl Subscription {
    /// Create a detached subscription for the given source.
    pub fn new(source: Arc<dyn NotificationSource>, context: &BindContext) -> Self {
        Self(Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let handle_change_wrapper: Listener = Arc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_change();
                }
            });

            Inner {
                id: SubscriptionId::next(),
                source,
                batch: context.batch().clone(),
                unsubscribe: Mutex::new(None),
                closed: AtomicBool::new(false),
                listeners: Mutex::new(None),
                on_state_change: Mutex::new(None),
                handle_change_wrapper,
            }
        }))
    }

    /// Create a detached subscription wired to an ancestor's descendant registry.
    pub fn nested(parent: &Subscription, context: &BindContext) -> Self {
        Self::new(Arc::new(parent.clone()), context)
    }

    pub fn id(&self) -> SubscriptionId {
        self.0.id
    }

    /// Whether the subscription is currently attached upstream.
    pub fn is_subscribed(&self) -> bool {
        self.0.unsubscribe.lock().is_some()
    }

    /// Install the callback run on every upstream notification.
    pub fn set_on_state_change(&self, callback: Option<Listener>) {
        *self.0.on_state_change.lock() = callback;
    }

    /// The stable callback this subscription registers upstream.
    pub fn handle_change_wrapper(&self) -> Listener {
        Arc::clone(&self.0.handle_change_wrapper)
    }

    /// Attach upstream, if not already attached and not closed.
    pub fn try_subscribe(&self) {
        if self.is_closed() || self.is_subscribed() {
            return;
        }

        let handle = self.0.source.subscribe(self.handle_change_wrapper());
        *self.0.unsubscribe.lock() = Some(handle);
        *self.0.listeners.lock() = Some(ListenerRegistry::with_batch(self.0.batch.clone()));

        debug!(subscription = %self.0.id, "subscription attached");
    }

    /// Detach upstream and drop every descendant, if attached.
    pub fn try_unsubscribe(&self) {
        let Some(handle) = self.0.unsubscribe.lock().take() else {
            return;
        };
        handle.unsubscribe();

        if let Some(listeners) = self.0.listeners.lock().take() {
            listeners.clear();
        }

        debug!(subscription = %self.0.id, "subscription detached");
    }

    /// Detach and refuse to attach again.
    ///
    /// Used when the owner is torn down or rebound. Descendants that subscribe
    /// afterwards get a handle with nothing to detach.
    pub fn close(&self) {
        if self.0.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.try_unsubscribe();
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::SeqCst)
    }

    /// Notify every descendant registered through this subscription.
    ///
    /// A no-op while detached.
    pub fn notify_nested_subs(&self) {
        let listeners = self.0.listeners.lock().clone();
        if let Some(listeners) = listeners {
            listeners.notify();
        }
    }

    /// Get the number of descendants currently registered.
    pub fn nested_count(&self) -> usize {
        self.0
            .listeners
            .lock()
            .as_ref()
            .map(ListenerRegistry::len)
            .unwrap_or(0)
    }
}

impl NotificationSource for Subscription {
    fn subscribe(&self, listener: Listener) -> Unsubscribe {
        self.try_subscribe();

        let listeners = self.0.listeners.lock().clone();
        match listeners {
            Some(listeners) => listeners.subscribe_listener(listener).into(),
            None => Unsubscribe::noop(),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.0.id)
            .field("subscribed", &self.is_subscribed())
            .field("closed", &self.is_closed())
            .field("nested_count", &self.nested_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
