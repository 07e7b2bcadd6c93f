//! Store boundary.
//!
//! The store itself lives outside this crate. All the binding layer needs
//! from it is a state snapshot that is replaced wholesale on every mutation
//! and a way to subscribe a listener.

use std::sync::Arc;

use super::listeners::{Listener, ListenerGuard, ListenerRegistry};

/// Anything a [`Subscription`](super::Subscription) can attach to.
///
/// Implemented by stores and by subscriptions themselves, so a component can
/// be wired to an ancestor's descendant registry instead of the store.
pub trait NotificationSource: Send + Sync {
    /// Register a listener. It stays registered until the returned handle is
    /// called or dropped.
    fn subscribe(&self, listener: Listener) -> Unsubscribe;
}

/// An external state container.
///
/// `state` must return the same `Arc` until the state is replaced; the
/// binding layer compares snapshots by pointer.
pub trait Store: NotificationSource + 'static {
    type State: Send + Sync + 'static;

    /// The current state snapshot.
    fn state(&self) -> Arc<Self::State>;
}

/// Handle that detaches a listener from its source.
///
/// Runs at most once: either through [`unsubscribe`](Self::unsubscribe) or
/// when dropped.
#[must_use = "dropping the handle unsubscribes the listener"]
pub struct Unsubscribe(Option<Box<dyn FnOnce() + Send + Sync>>);

impl Unsubscribe {
    pub fn new<F>(unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self(Some(Box::new(unsubscribe)))
    }

    /// A handle with nothing to detach.
    pub fn noop() -> Self {
        Self(None)
    }

    pub fn unsubscribe(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(unsubscribe) = self.0.take() {
            unsubscribe();
        }
    }
}

impl From<ListenerGuard> for Unsubscribe {
    fn from(guard: ListenerGuard) -> Self {
        Self::new(move || guard.unsubscribe())
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("pending", &self.0.is_some())
            .finish()
    }
}

impl NotificationSource for ListenerRegistry {
    fn subscribe(&self, listener: Listener) -> Unsubscribe {
        self.subscribe_listener(listener).into()
    }
}
