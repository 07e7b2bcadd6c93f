//! Integration Tests for Store Bindings
//!
//! These tests drive registries, subscriptions and sync instances together
//! through a small in-test store, the way a host integration would.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use storebind_core::binding::SubscriptionId;
use storebind_core::{
    Batch, BindContext, Error, Listener, ListenerRegistry, NotificationSource, RenderRequest,
    Selector, SelectorSync, Store, SyncState, Unsubscribe, UseStoreState,
};

#[derive(Debug, Clone, PartialEq)]
struct AppState {
    count: i64,
}

struct CounterStore {
    state: Mutex<Arc<AppState>>,
    listeners: ListenerRegistry,
}

impl CounterStore {
    fn new(count: i64) -> Arc<Self> {
        Self::with_context(count, &BindContext::default())
    }

    fn with_context(count: i64, context: &BindContext) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(Arc::new(AppState { count })),
            listeners: ListenerRegistry::new(context),
        })
    }

    fn set(&self, count: i64) {
        *self.state.lock() = Arc::new(AppState { count });
        self.listeners.notify();
    }
}

impl NotificationSource for CounterStore {
    fn subscribe(&self, listener: Listener) -> Unsubscribe {
        self.listeners.subscribe_listener(listener).into()
    }
}

impl Store for CounterStore {
    type State = AppState;

    fn state(&self) -> Arc<AppState> {
        self.state.lock().clone()
    }
}

fn render_counter() -> (Arc<AtomicUsize>, RenderRequest) {
    let renders = Arc::new(AtomicUsize::new(0));
    let renders_clone = renders.clone();
    let request: RenderRequest = Arc::new(move || {
        renders_clone.fetch_add(1, Ordering::SeqCst);
    });
    (renders, request)
}

/// Test the basic flow: same reference, then a real change.
#[test]
fn rerenders_only_when_derived_value_changes() {
    let store = CounterStore::new(0);
    let use_store_state = UseStoreState::new(store.clone());
    let (renders, request) = render_counter();
    let sync = use_store_state.instance::<i64>(request);
    let count = Selector::new(|state: &AppState| state.count);

    let rendered = use_store_state.select(&sync, Some(&count)).unwrap();
    assert_eq!(*rendered.value(), 0);
    sync.commit(&rendered).unwrap();

    // Notification with an unchanged snapshot
    store.listeners.notify();
    assert_eq!(renders.load(Ordering::SeqCst), 0);

    store.set(1);
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    let rendered = use_store_state.select(&sync, Some(&count)).unwrap();
    assert_eq!(*rendered.value(), 1);
    sync.commit(&rendered).unwrap();
    assert_eq!(sync.debug_value(), Some(1));
}

/// Test that a selector failure in the detector surfaces on the next render
/// with the earlier failure attached.
#[test]
fn selector_failure_is_correlated_on_rerender() {
    let store = CounterStore::new(1);
    let use_store_state = UseStoreState::new(store.clone());
    let (renders, request) = render_counter();
    let sync = use_store_state.instance::<i64>(request);
    let inverse = Selector::fallible(|state: &AppState| {
        if state.count == 0 {
            Err("division by zero")
        } else {
            Ok(100 / state.count)
        }
    });

    sync.commit(&sync.render(&inverse).unwrap()).unwrap();

    store.set(0);
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    match sync.render(&inverse) {
        Err(Error::Selector { source, previous }) => {
            assert_eq!(source.to_string(), "division by zero");
            assert_eq!(previous.as_deref(), Some("division by zero"));
        }
        other => panic!("expected a selector error, got {other:?}"),
    }
}

/// Test that a child never hears about a change before its parent has
/// committed it.
#[test]
fn children_are_notified_after_parent_commit() {
    let store = CounterStore::new(0);
    let use_store_state = UseStoreState::new(store.clone());

    let (parent_renders, parent_request) = render_counter();
    let parent = use_store_state.instance::<i64>(parent_request);
    let parent_count = Selector::new(|state: &AppState| state.count);

    let (child_renders, child_request) = render_counter();
    let child = use_store_state
        .builder(storebind_core::Equality::identity(), child_request)
        .parent(&parent.subscription())
        .build();
    let child_count = Selector::new(|state: &AppState| state.count * 10);

    // Render top-down, commit bottom-up
    let parent_rendered = parent.render(&parent_count).unwrap();
    let child_rendered = child.render(&child_count).unwrap();
    child.commit(&child_rendered).unwrap();
    parent.commit(&parent_rendered).unwrap();

    // Only the parent is attached to the store
    assert_eq!(store.listeners.len(), 1);
    assert_eq!(parent.subscription().nested_count(), 1);

    store.set(1);
    assert_eq!(parent_renders.load(Ordering::SeqCst), 1);
    assert_eq!(child_renders.load(Ordering::SeqCst), 0);

    parent.commit(&parent.render(&parent_count).unwrap()).unwrap();
    assert_eq!(child_renders.load(Ordering::SeqCst), 1);

    let child_rendered = child.render(&child_count).unwrap();
    assert_eq!(*child_rendered.value(), 10);
    assert_eq!(parent.debug_value(), Some(1));
}

/// Test that two updates landing before the parent commits still reach the
/// child only once, and only after that commit.
#[test]
fn child_waits_for_parent_commit_across_repeated_updates() {
    let store = CounterStore::new(0);
    let use_store_state = UseStoreState::new(store.clone());

    let (parent_renders, parent_request) = render_counter();
    let parent = use_store_state.instance::<i64>(parent_request);
    let parent_count = Selector::new(|state: &AppState| state.count);

    let (child_renders, child_request) = render_counter();
    let child = SelectorSync::nested(store.clone(), &parent.subscription(), child_request);
    let child_count = Selector::new(|state: &AppState| state.count * 10);

    let parent_rendered = parent.render(&parent_count).unwrap();
    let child_rendered = child.render(&child_count).unwrap();
    child.commit(&child_rendered).unwrap();
    parent.commit(&parent_rendered).unwrap();

    store.set(1);
    store.set(1);
    assert_eq!(parent_renders.load(Ordering::SeqCst), 1);
    assert_eq!(child_renders.load(Ordering::SeqCst), 0);

    parent.commit(&parent.render(&parent_count).unwrap()).unwrap();
    assert_eq!(child_renders.load(Ordering::SeqCst), 1);
    assert_eq!(*child.render(&child_count).unwrap().value(), 10);
}

/// Test that a child mounting under a torn-down parent does not reattach the
/// parent to the store.
#[test]
fn torn_down_parent_stays_detached() {
    let store = CounterStore::new(0);
    let count = Selector::new(|state: &AppState| state.count);

    let (_, parent_request) = render_counter();
    let parent = SelectorSync::new(store.clone(), parent_request);
    parent.commit(&parent.render(&count).unwrap()).unwrap();
    assert_eq!(store.listeners.len(), 1);

    let parent_subscription = parent.subscription();
    parent.teardown();
    assert!(store.listeners.is_empty());

    let (child_renders, child_request) = render_counter();
    let child = SelectorSync::nested(store.clone(), &parent_subscription, child_request);
    child.commit(&child.render(&count).unwrap()).unwrap();
    assert!(store.listeners.is_empty());
    assert!(!parent_subscription.is_subscribed());

    store.set(1);
    assert_eq!(child_renders.load(Ordering::SeqCst), 0);

    drop(child);
    assert!(store.listeners.is_empty());
}

/// Test that a parent whose value did not change still lets its children
/// re-derive.
#[test]
fn unchanged_parent_forwards_to_children() {
    let store = CounterStore::new(2);
    let use_store_state = UseStoreState::new(store.clone());

    let (parent_renders, parent_request) = render_counter();
    let parent = use_store_state.instance::<bool>(parent_request);
    let is_even = Selector::new(|state: &AppState| state.count % 2 == 0);

    let (child_renders, child_request) = render_counter();
    let child = SelectorSync::nested(store.clone(), &parent.subscription(), child_request);
    let count = Selector::new(|state: &AppState| state.count);

    let child_rendered = child.render(&count).unwrap();
    let parent_rendered = parent.render(&is_even).unwrap();
    child.commit(&child_rendered).unwrap();
    parent.commit(&parent_rendered).unwrap();

    store.set(4);
    assert_eq!(parent_renders.load(Ordering::SeqCst), 0);
    assert_eq!(child_renders.load(Ordering::SeqCst), 1);
}

/// Test that one store mutation produces a single batch flush.
#[test]
fn batch_wraps_the_whole_notification_pass() {
    let flushes = Arc::new(AtomicUsize::new(0));
    let queued = Arc::new(Mutex::new(Vec::<&'static str>::new()));

    let batch = {
        let flushes = flushes.clone();
        Batch::new(move |work| {
            work();
            flushes.fetch_add(1, Ordering::SeqCst);
        })
    };
    let context = BindContext::default().with_batch(batch);
    let store = CounterStore::with_context(0, &context);
    let use_store_state = UseStoreState::with_context(store.clone(), context);

    let request = |name: &'static str| -> RenderRequest {
        let queued = queued.clone();
        Arc::new(move || queued.lock().push(name))
    };
    let first = use_store_state.instance::<i64>(request("first"));
    let second = use_store_state.instance::<i64>(request("second"));
    let count = Selector::new(|state: &AppState| state.count);

    first.commit(&first.render(&count).unwrap()).unwrap();
    second.commit(&second.render(&count).unwrap()).unwrap();
    flushes.store(0, Ordering::SeqCst);

    store.set(3);
    assert_eq!(flushes.load(Ordering::SeqCst), 1);
    assert_eq!(*queued.lock(), vec!["first", "second"]);
}

/// Test that a component torn down by an earlier listener in the same pass
/// is not asked to re-render.
#[test]
fn teardown_during_notification_skips_the_instance() {
    let store = CounterStore::new(0);
    let count = Selector::new(|state: &AppState| state.count);

    let victim_slot: Arc<Mutex<Option<SelectorSync<CounterStore, i64>>>> =
        Arc::new(Mutex::new(None));

    let killer_request: RenderRequest = {
        let victim_slot = victim_slot.clone();
        Arc::new(move || {
            let victim = victim_slot.lock().take();
            if let Some(victim) = victim {
                victim.teardown();
            }
        })
    };
    let killer = SelectorSync::new(store.clone(), killer_request);

    let (victim_renders, victim_request) = render_counter();
    let victim = SelectorSync::new(store.clone(), victim_request);

    killer.commit(&killer.render(&count).unwrap()).unwrap();
    victim.commit(&victim.render(&count).unwrap()).unwrap();
    *victim_slot.lock() = Some(victim);

    store.set(1);
    assert_eq!(victim_renders.load(Ordering::SeqCst), 0);
    assert_eq!(store.listeners.len(), 1);
}

/// Test that a mutation between the render read and the first commit is
/// picked up by the post-subscribe check.
#[test]
fn mutation_before_attach_is_not_lost() {
    let store = CounterStore::new(0);
    let observed = Arc::new(AtomicI64::new(-1));
    let sync_slot: Arc<Mutex<Option<Arc<SelectorSync<CounterStore, i64>>>>> =
        Arc::new(Mutex::new(None));
    let count = Selector::new(|state: &AppState| state.count);

    let request: RenderRequest = {
        let observed = observed.clone();
        let sync_slot = sync_slot.clone();
        let count = count.clone();
        Arc::new(move || {
            let sync = sync_slot.lock().clone();
            if let Some(sync) = sync {
                if let Ok(rendered) = sync.render(&count) {
                    observed.store(*rendered.value(), Ordering::SeqCst);
                }
            }
        })
    };
    let sync = Arc::new(SelectorSync::new(store.clone(), request));
    *sync_slot.lock() = Some(sync.clone());

    let rendered = sync.render(&count).unwrap();
    store.set(5);
    sync.commit(&rendered).unwrap();

    assert_eq!(observed.load(Ordering::SeqCst), 5);
    sync_slot.lock().take();
}

/// Test that teardown is final.
#[test]
fn torn_down_instances_reject_render_and_commit() {
    let store = CounterStore::new(0);
    let (_, request) = render_counter();
    let sync = SelectorSync::new(store.clone(), request);
    let count = Selector::new(|state: &AppState| state.count);

    let rendered = sync.render(&count).unwrap();
    sync.teardown();

    assert_eq!(sync.state(), SyncState::TornDown);
    assert!(matches!(sync.commit(&rendered), Err(Error::TornDown)));
    assert!(matches!(sync.render(&count), Err(Error::TornDown)));
    assert!(matches!(sync.rebind(CounterStore::new(1)), Err(Error::TornDown)));
}

/// Test that every sync instance gets its own subscription.
#[test]
fn instances_have_distinct_subscriptions() {
    let store = CounterStore::new(0);
    let use_store_state = UseStoreState::new(store);
    let (_, first_request) = render_counter();
    let (_, second_request) = render_counter();

    let first = use_store_state.instance::<i64>(first_request);
    let second = use_store_state.instance::<i64>(second_request);

    let ids: [SubscriptionId; 2] = [first.subscription().id(), second.subscription().id()];
    assert_ne!(ids[0], ids[1]);
}
