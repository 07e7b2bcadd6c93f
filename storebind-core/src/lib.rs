//! Storebind Core
//!
//! This crate binds observers to an external mutable-state store so that a
//! tree of dependents never observes torn state. It implements:
//!
//! - Listener registries that tolerate mutation during notification
//! - Subscriptions that fan notifications out in ancestor-first order
//! - A pluggable batch function for coalescing notification passes
//! - The selector synchronization protocol (render, commit, change detection)
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `binding`: Registries, subscriptions, selectors and per-instance sync
//! - `hook`: A factory that binds a store once and hands out sync instances
//! - `error`: The crate error type
//!
//! # Example
//!
//! ```rust,ignore
//! use storebind_core::{Selector, UseStoreState};
//!
//! let use_store_state = UseStoreState::new(store.clone());
//! let sync = use_store_state.instance::<i64>(request_render);
//! let count = Selector::new(|state: &AppState| state.count);
//!
//! // Render: derive (or reuse) the value
//! let rendered = use_store_state.select(&sync, Some(&count))?;
//!
//! // Commit: snapshot what was rendered, attach on first commit
//! sync.commit(&rendered)?;
//!
//! // The store changes; the host is asked to re-render only if `count` moved
//! store.dispatch(Action::Increment);
//! ```

pub mod binding;
pub mod error;
pub mod hook;

pub use binding::{
    Batch, BindContext, Equality, Listener, ListenerGuard, ListenerRegistry, NotificationSource,
    RenderRequest, Rendered, Selector, SelectorSync, Store, Subscription, SyncOptions, SyncState,
    Unsubscribe,
};
pub use error::{BoxError, Error, Result};
pub use hook::UseStoreState;
