//! Store Bindings
//!
//! This module implements the machinery that keeps a tree of observers in
//! sync with an external store: listener registries, subscriptions, and the
//! selector synchronization protocol.
//!
//! # Concepts
//!
//! ## Listener Registries
//!
//! A [`ListenerRegistry`] is an ordered set of callbacks that tolerates being
//! mutated while it is being notified. Every store and every attached
//! subscription owns one.
//!
//! ## Subscriptions
//!
//! A [`Subscription`] attaches one observer to a [`NotificationSource`]:
//! either the store itself or an ancestor subscription. Descendants subscribe
//! to their nearest ancestor, which forwards notifications only after its own
//! update is committed. This is what keeps a parent from being rendered with
//! newer state than its children saw.
//!
//! ## Selector Synchronization
//!
//! A [`SelectorSync`] derives a value from store state through a
//! [`Selector`], compares it with an [`Equality`], and asks its host to
//! re-render only when the value changed.
//!
//! # Implementation Notes
//!
//! Nothing here holds a lock across a user callback: listeners, selectors,
//! equality functions and render requests all run with every internal lock
//! released, so they may re-enter the binding freely.

mod context;
mod listeners;
mod selector;
mod store;
mod subscription;
mod sync;

pub use context::{Batch, BindContext, SyncOptions};
pub use listeners::{Listener, ListenerGuard, ListenerId, ListenerRegistry};
pub use selector::{ref_equality, shallow_equal, Equality, Identity, Selector, ShallowEq};
pub use store::{NotificationSource, Store, Unsubscribe};
pub use subscription::{Subscription, SubscriptionId};
pub use sync::{RenderRequest, Rendered, SelectorSync, SyncBuilder, SyncState};
