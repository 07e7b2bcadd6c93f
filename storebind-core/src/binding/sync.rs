//! Selector Synchronization
//!
//! A `SelectorSync` is the per-component half of a store binding. It derives
//! a value from store state, caches it across render attempts, and asks the
//! host to re-render only when the derived value actually changes.
//!
//! # Phases
//!
//! The host drives two phases per update:
//!
//! 1. **Render** ([`SelectorSync::render`]). Speculative: the host may throw
//!    the attempt away. The cached value is reused when the selector and the
//!    state snapshot are both the ones last committed and no selector failure
//!    is pending. Otherwise the selector runs again. Nothing is written.
//!
//! 2. **Commit** ([`SelectorSync::commit`]). Runs only for kept attempts. The
//!    selector, snapshot and value that were actually rendered become the
//!    cache. The first commit attaches the subscription and immediately runs
//!    the change detector once, so a mutation that landed between the render
//!    read and the attach is not lost.
//!
//! # Change Detection
//!
//! On every upstream notification the change detector re-runs the committed
//! selector against the latest state:
//!
//! - Failure: the error is recorded and a re-render is requested. The next
//!   render attempt runs the selector again and returns the error from there.
//! - Equal value: nothing to render. Descendants are told right away, since
//!   no commit will follow to do it, unless an earlier change is still
//!   waiting for its commit. That commit tells them instead.
//! - Different value: the cache is updated and a re-render is requested.
//!   Descendants are told after the resulting commit.
//!
//! # States
//!
//! ```text
//! Unsubscribed ──commit──▶ Subscribed
//!      ▲                      │
//!      └───────rebind─────────┘
//!   (any) ──teardown──▶ TornDown
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::context::BindContext;
use super::listeners::Listener;
use super::selector::{Equality, Identity, Selector};
use super::store::{NotificationSource, Store};
use super::subscription::Subscription;
use crate::error::{describe, Error, Result};

/// The host's force-rerender primitive.
pub type RenderRequest = Arc<dyn Fn() + Send + Sync>;

/// Lifecycle state of a sync instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Not attached. The next commit attaches.
    Unsubscribed,

    /// Attached; the change detector runs on every notification.
    Subscribed,

    /// Torn down. Render and commit are rejected.
    TornDown,
}

/// What the last commit rendered.
struct Snapshot<S, T> {
    selector: Option<Selector<S, T>>,
    store_state: Option<Arc<S>>,
    selected: Option<T>,
    /// Details of a selector failure seen by the change detector.
    error: Option<String>,
}

impl<S, T> Default for Snapshot<S, T> {
    fn default() -> Self {
        Self {
            selector: None,
            store_state: None,
            selected: None,
            error: None,
        }
    }
}

/// The store an instance is bound to, and the subscription made for it.
struct Binding<St> {
    store: Arc<St>,
    subscription: Subscription,
    generation: u64,
}

struct Shared<St: Store, T> {
    context: BindContext,
    parent: Option<Subscription>,
    equality: Equality<T>,
    request_render: RenderRequest,
    binding: Mutex<Binding<St>>,
    cache: Mutex<Snapshot<St::State, T>>,
    state: Mutex<SyncState>,
    /// Set when the detector requested a render; the commit that follows
    /// notifies descendants.
    notify_nested_on_commit: AtomicBool,
}

impl<St, T> Shared<St, T>
where
    St: Store,
    T: Clone + Send + Sync + 'static,
{
    fn make_subscription(&self, store: &Arc<St>) -> Subscription {
        match &self.parent {
            Some(parent) => Subscription::nested(parent, &self.context),
            None => {
                let source: Arc<dyn NotificationSource> = store.clone();
                Subscription::new(source, &self.context)
            }
        }
    }

    fn check_for_updates(&self) {
        if *self.state.lock() != SyncState::Subscribed {
            return;
        }

        let (store, subscription) = {
            let binding = self.binding.lock();
            (Arc::clone(&binding.store), binding.subscription.clone())
        };
        let (selector, current) = {
            let cache = self.cache.lock();
            (cache.selector.clone(), cache.selected.clone())
        };
        let Some(selector) = selector else {
            return;
        };

        let state = store.state();
        match selector.select(&state) {
            Ok(value) => {
                let unchanged = current
                    .as_ref()
                    .is_some_and(|current| self.equality.equals(&value, current));
                if unchanged {
                    trace!(subscription = %subscription.id(), "derived value unchanged");
                    // A render is still pending; its commit forwards instead.
                    if !self.notify_nested_on_commit.load(Ordering::SeqCst) {
                        subscription.notify_nested_subs();
                    }
                    return;
                }
                trace!(subscription = %subscription.id(), "derived value changed");
                self.cache.lock().selected = Some(value);
            }
            Err(err) => {
                let details = describe(&*err);
                debug!(
                    subscription = %subscription.id(),
                    error = %details,
                    "selector failed during change detection; deferring to render"
                );
                self.cache.lock().error = Some(details);
            }
        }

        self.notify_nested_on_commit.store(true, Ordering::SeqCst);
        (self.request_render)();
    }
}

/// A successful render attempt, to be handed back to [`SelectorSync::commit`]
/// if the host keeps it.
pub struct Rendered<S, T> {
    value: T,
    selector: Selector<S, T>,
    store_state: Arc<S>,
    generation: u64,
}

impl<S, T> Rendered<S, T> {
    /// The derived value to render with.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// The state snapshot the value was derived from.
    pub fn store_state(&self) -> &Arc<S> {
        &self.store_state
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

impl<S, T: fmt::Debug> fmt::Debug for Rendered<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rendered")
            .field("value", &self.value)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Builder for a [`SelectorSync`].
pub struct SyncBuilder<St: Store, T> {
    store: Arc<St>,
    equality: Equality<T>,
    request_render: RenderRequest,
    parent: Option<Subscription>,
    context: BindContext,
}

impl<St, T> SyncBuilder<St, T>
where
    St: Store,
    T: Clone + Send + Sync + 'static,
{
    /// Receive notifications through an ancestor's descendant registry
    /// instead of straight from the store.
    pub fn parent(mut self, parent: &Subscription) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn context(mut self, context: &BindContext) -> Self {
        self.context = context.clone();
        self
    }

    pub fn build(self) -> SelectorSync<St, T> {
        let Self {
            store,
            equality,
            request_render,
            parent,
            context,
        } = self;

        let subscription = match &parent {
            Some(parent) => Subscription::nested(parent, &context),
            None => {
                let source: Arc<dyn NotificationSource> = store.clone();
                Subscription::new(source, &context)
            }
        };

        SelectorSync {
            shared: Arc::new(Shared {
                context,
                parent,
                equality,
                request_render,
                binding: Mutex::new(Binding {
                    store,
                    subscription,
                    generation: 0,
                }),
                cache: Mutex::new(Snapshot::default()),
                state: Mutex::new(SyncState::Unsubscribed),
                notify_nested_on_commit: AtomicBool::new(false),
            }),
        }
    }
}

/// Per-component synchronization with a store.
///
/// # Example
///
/// ```rust,ignore
/// let sync = SelectorSync::new(store.clone(), Arc::new(move || host.schedule_render()));
/// let count = Selector::new(|state: &AppState| state.count);
///
/// // render phase
/// let rendered = sync.render(&count)?;
/// draw(rendered.value());
///
/// // commit phase
/// sync.commit(&rendered)?;
/// ```
pub struct SelectorSync<St: Store, T> {
    shared: Arc<Shared<St, T>>,
}

impl<St, T> SelectorSync<St, T>
where
    St: Store,
    T: Clone + Send + Sync + 'static,
{
    /// Bind to a store with identity equality and the default context.
    pub fn new(store: Arc<St>, request_render: RenderRequest) -> Self
    where
        T: Identity,
    {
        Self::builder(store, Equality::identity(), request_render).build()
    }

    /// Bind a descendant: notifications arrive through `parent` once it has
    /// committed, instead of straight from the store.
    pub fn nested(store: Arc<St>, parent: &Subscription, request_render: RenderRequest) -> Self
    where
        T: Identity,
    {
        Self::builder(store, Equality::identity(), request_render)
            .parent(parent)
            .build()
    }

    pub fn builder(
        store: Arc<St>,
        equality: Equality<T>,
        request_render: RenderRequest,
    ) -> SyncBuilder<St, T> {
        SyncBuilder {
            store,
            equality,
            request_render,
            parent: None,
            context: BindContext::default(),
        }
    }

    /// Derive the value for a render attempt.
    ///
    /// Never writes to the cache; a discarded attempt leaves no trace.
    pub fn render(&self, selector: &Selector<St::State, T>) -> Result<Rendered<St::State, T>> {
        if self.state() == SyncState::TornDown {
            return Err(Error::TornDown);
        }

        let (store, generation) = {
            let binding = self.shared.binding.lock();
            (Arc::clone(&binding.store), binding.generation)
        };
        let store_state = store.state();

        let (cached, pending_error) = {
            let cache = self.shared.cache.lock();
            let reusable = cache.error.is_none()
                && cache.selector.as_ref().is_some_and(|s| s.ptr_eq(selector))
                && cache
                    .store_state
                    .as_ref()
                    .is_some_and(|s| Arc::ptr_eq(s, &store_state));
            let cached = if reusable { cache.selected.clone() } else { None };
            (cached, cache.error.clone())
        };

        let value = match cached {
            Some(value) => value,
            None => selector.select(&store_state).map_err(|source| Error::Selector {
                source,
                previous: pending_error.filter(|_| self.shared.context.options().correlate_errors),
            })?,
        };

        Ok(Rendered {
            value,
            selector: selector.clone(),
            store_state,
            generation,
        })
    }

    /// Record a kept render attempt and attach on the first commit.
    pub fn commit(&self, rendered: &Rendered<St::State, T>) -> Result<()> {
        if self.state() == SyncState::TornDown {
            return Err(Error::TornDown);
        }

        let subscription = {
            let binding = self.shared.binding.lock();
            if rendered.generation != binding.generation {
                return Err(Error::StaleRender {
                    rendered: rendered.generation,
                    current: binding.generation,
                });
            }
            binding.subscription.clone()
        };

        {
            let mut cache = self.shared.cache.lock();
            cache.selector = Some(rendered.selector.clone());
            cache.store_state = Some(Arc::clone(&rendered.store_state));
            cache.selected = Some(rendered.value.clone());
            cache.error = None;
        }

        let first_commit = {
            let mut state = self.shared.state.lock();
            let first = *state == SyncState::Unsubscribed;
            if first {
                *state = SyncState::Subscribed;
            }
            first
        };

        if first_commit {
            subscription.set_on_state_change(Some(self.change_detector()));
            subscription.try_subscribe();
            if self.shared.context.options().check_on_subscribe {
                self.shared.check_for_updates();
            }
        } else if self.shared.notify_nested_on_commit.swap(false, Ordering::SeqCst) {
            subscription.notify_nested_subs();
        }

        Ok(())
    }

    /// Bind to a different store.
    ///
    /// The old subscription is closed and the cache is dropped; the next commit
    /// attaches a fresh one. Render attempts made against the old store can
    /// no longer be committed. Rebinding to the same store is a no-op.
    pub fn rebind(&self, store: Arc<St>) -> Result<()> {
        if self.state() == SyncState::TornDown {
            return Err(Error::TornDown);
        }

        let retired = {
            let mut binding = self.shared.binding.lock();
            if Arc::ptr_eq(&binding.store, &store) {
                return Ok(());
            }
            let subscription = self.shared.make_subscription(&store);
            binding.store = store;
            binding.generation += 1;
            std::mem::replace(&mut binding.subscription, subscription)
        };

        retired.set_on_state_change(None);
        retired.close();
        *self.shared.cache.lock() = Snapshot::default();
        *self.shared.state.lock() = SyncState::Unsubscribed;
        self.shared.notify_nested_on_commit.store(false, Ordering::SeqCst);

        debug!(subscription = %retired.id(), "store rebound; subscription retired");
        Ok(())
    }

    /// Detach for good. Idempotent; also runs on drop.
    pub fn teardown(&self) {
        let previous = std::mem::replace(&mut *self.shared.state.lock(), SyncState::TornDown);
        if previous == SyncState::TornDown {
            return;
        }

        let subscription = self.shared.binding.lock().subscription.clone();
        subscription.set_on_state_change(None);
        subscription.close();

        debug!(subscription = %subscription.id(), "selector sync torn down");
    }

    /// Run the change detector now, as if the store had notified.
    pub fn check_for_updates(&self) {
        self.shared.check_for_updates();
    }

    pub fn state(&self) -> SyncState {
        *self.shared.state.lock()
    }

    /// The subscription descendants should be wired to.
    pub fn subscription(&self) -> Subscription {
        self.shared.binding.lock().subscription.clone()
    }

    pub fn store(&self) -> Arc<St> {
        Arc::clone(&self.shared.binding.lock().store)
    }

    /// The last committed (or detector-updated) derived value.
    pub fn debug_value(&self) -> Option<T> {
        self.shared.cache.lock().selected.clone()
    }

    /// Whether a selector failure is waiting for the next render.
    pub fn has_pending_error(&self) -> bool {
        self.shared.cache.lock().error.is_some()
    }

    fn change_detector(&self) -> Listener {
        let weak: Weak<Shared<St, T>> = Arc::downgrade(&self.shared);
        Arc::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.check_for_updates();
            }
        })
    }
}

impl<St: Store, T> Drop for SelectorSync<St, T> {
    fn drop(&mut self) {
        let previous = std::mem::replace(&mut *self.shared.state.lock(), SyncState::TornDown);
        if previous != SyncState::TornDown {
            let subscription = self.shared.binding.lock().subscription.clone();
            subscription.set_on_state_change(None);
            subscription.close();
        }
    }
}

impl<St, T> fmt::Debug for SelectorSync<St, T>
where
    St: Store,
    T: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorSync")
            .field("state", &self.state())
            .field("selected", &self.debug_value())
            .field("subscription", &self.subscription())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
