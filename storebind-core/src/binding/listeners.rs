//! Listener Registry
//!
//! An ordered collection of notification callbacks. Registration order is
//! notification order.
//!
//! # Layout
//!
//! The registry is an intrusive doubly linked list. Each node owns a strong
//! reference to its successor and a weak reference to its predecessor, so
//! the list never forms a reference cycle. The registry itself holds the
//! endpoints:
//!
//! ```text
//! first ─▶ [L1] ─▶ [L2] ─▶ [L3] ◀─ last
//!           ◀┄┄┄┄┄┄ ◀┄┄┄┄┄┄        (weak)
//! ```
//!
//! # Removal During Notification
//!
//! A notification pass walks the list by re-reading each node's own `next`
//! link after invoking it, never from a pre-copied array. Unlinking a node
//! re-points its neighbours but leaves the node's own `next` untouched, so a
//! pass that is currently standing on a removed node still finds its way
//! back into the live list. Nodes that were unsubscribed before the pass
//! reached them are skipped.
//!
//! # Locking
//!
//! No lock is held while a callback runs. Callbacks are free to subscribe,
//! unsubscribe, clear, or notify re-entrantly.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use super::context::{Batch, BindContext};

/// A notification callback.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

struct Node {
    id: ListenerId,
    callback: Listener,
    /// Cleared exactly once, by the guard or by the registry being cleared.
    subscribed: AtomicBool,
    links: Mutex<Links>,
}

#[derive(Default)]
struct Links {
    prev: Option<Weak<Node>>,
    next: Option<Arc<Node>>,
}

#[derive(Default)]
struct Chain {
    first: Option<Arc<Node>>,
    last: Option<Arc<Node>>,
    len: usize,
}

impl Chain {
    /// Unlink every node and mark it unsubscribed.
    ///
    /// Walks the list iteratively so long chains do not drop recursively.
    fn detach_all(&mut self) {
        self.last = None;
        self.len = 0;
        let mut cursor = self.first.take();
        while let Some(node) = cursor {
            node.subscribed.store(false, Ordering::SeqCst);
            let mut links = node.links.lock();
            links.prev = None;
            cursor = links.next.take();
        }
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        self.detach_all();
    }
}

/// An ordered, mutation-safe collection of listeners.
///
/// Clones share the same list.
#[derive(Clone)]
pub struct ListenerRegistry {
    chain: Arc<Mutex<Chain>>,
    batch: Batch,
}

impl ListenerRegistry {
    /// Create an empty registry that notifies through the context's batch.
    pub fn new(context: &BindContext) -> Self {
        Self::with_batch(context.batch().clone())
    }

    /// Create an empty registry with an explicit batch function.
    pub fn with_batch(batch: Batch) -> Self {
        Self {
            chain: Arc::new(Mutex::new(Chain::default())),
            batch,
        }
    }

    /// Append a callback at the tail of the list.
    pub fn subscribe<F>(&self, callback: F) -> ListenerGuard
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe_listener(Arc::new(callback))
    }

    /// Append an already shared callback at the tail of the list.
    ///
    /// The same `Listener` may be registered more than once; each
    /// registration gets its own node and its own guard.
    pub fn subscribe_listener(&self, callback: Listener) -> ListenerGuard {
        let mut chain = self.chain.lock();

        let node = Arc::new(Node {
            id: ListenerId::next(),
            callback,
            subscribed: AtomicBool::new(true),
            links: Mutex::new(Links {
                prev: chain.last.as_ref().map(Arc::downgrade),
                next: None,
            }),
        });

        match chain.last.take() {
            Some(last) => last.links.lock().next = Some(Arc::clone(&node)),
            None => chain.first = Some(Arc::clone(&node)),
        }
        chain.last = Some(Arc::clone(&node));
        chain.len += 1;

        ListenerGuard {
            chain: Arc::downgrade(&self.chain),
            node,
        }
    }

    /// Invoke every linked callback in registration order.
    ///
    /// The pass runs inside the registry's batch. A panic raised by a
    /// callback propagates out of the batch untouched.
    pub fn notify(&self) {
        let chain = &self.chain;
        self.batch.run(&mut || {
            let (mut cursor, len) = {
                let chain = chain.lock();
                (chain.first.clone(), chain.len)
            };
            trace!(listeners = len, "notifying listeners");

            while let Some(node) = cursor {
                if node.subscribed.load(Ordering::SeqCst) {
                    (node.callback)();
                }
                cursor = node.links.lock().next.clone();
            }
        });
    }

    /// Snapshot of the registered listener IDs, in notification order.
    ///
    /// Intended for tests and debugging.
    pub fn get(&self) -> SmallVec<[ListenerId; 8]> {
        let mut ids = SmallVec::new();
        let mut cursor = self.chain.lock().first.clone();
        while let Some(node) = cursor {
            ids.push(node.id);
            cursor = node.links.lock().next.clone();
        }
        ids
    }

    /// Drop every registration without running any disposer.
    ///
    /// Guards for the dropped registrations become inert.
    pub fn clear(&self) {
        self.chain.lock().detach_all();
    }

    /// Get the number of linked listeners.
    pub fn len(&self) -> usize {
        self.chain.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.chain.lock().first.is_none()
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::with_batch(Batch::immediate())
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .field("batch", &self.batch)
            .finish()
    }
}

/// Disposer for one registration.
///
/// Unsubscribes on [`unsubscribe`](Self::unsubscribe) or when dropped,
/// whichever comes first. Later calls are no-ops, as are calls after the
/// registry was cleared or dropped.
#[must_use = "dropping the guard unsubscribes the listener"]
pub struct ListenerGuard {
    chain: Weak<Mutex<Chain>>,
    node: Arc<Node>,
}

impl ListenerGuard {
    pub fn id(&self) -> ListenerId {
        self.node.id
    }

    pub fn is_subscribed(&self) -> bool {
        self.node.subscribed.load(Ordering::SeqCst)
    }

    /// Unlink this registration.
    pub fn unsubscribe(&self) {
        let Some(chain) = self.chain.upgrade() else {
            return;
        };
        let mut chain = chain.lock();

        // Checked under the registry lock so a concurrent clear cannot race.
        if !self.node.subscribed.swap(false, Ordering::SeqCst) {
            return;
        }

        // The node keeps its own links so a pass standing on it can continue.
        let (prev_weak, next) = {
            let links = self.node.links.lock();
            (links.prev.clone(), links.next.clone())
        };
        let prev = prev_weak.as_ref().and_then(Weak::upgrade);

        match &next {
            Some(next) => next.links.lock().prev = prev_weak,
            None => chain.last = prev.clone(),
        }
        match &prev {
            Some(prev) => prev.links.lock().next = next,
            None => chain.first = next,
        }
        chain.len -= 1;
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("id", &self.node.id)
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
