//! Binding Context
//!
//! The context is the configuration threaded through every constructor in
//! this crate. It carries two things:
//!
//! - The batch function used by listener registries when they notify.
//! - The [`SyncOptions`] that tune the selector synchronization protocol.
//!
//! # Batching
//!
//! A host integration may coalesce the render requests produced by one store
//! mutation into a single flush. It does so by wrapping the notification pass
//! in its own batching primitive. The batch never defers the notification
//! callbacks themselves: `work` must have run by the time the batch returns.
//!
//! The default batch runs `work` immediately.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

type BatchFn = dyn Fn(&mut dyn FnMut()) + Send + Sync;

/// A pluggable batching function.
///
/// # Example
///
/// ```rust,ignore
/// let batch = Batch::new(|work| {
///     host.begin_batch();
///     work();
///     host.flush();
/// });
/// ```
#[derive(Clone)]
pub struct Batch(Option<Arc<BatchFn>>);

impl Batch {
    /// A batch that runs the work immediately.
    pub fn immediate() -> Self {
        Self(None)
    }

    /// Wrap a host batching function.
    pub fn new<F>(batch: F) -> Self
    where
        F: Fn(&mut dyn FnMut()) + Send + Sync + 'static,
    {
        Self(Some(Arc::new(batch)))
    }

    /// Run `work` through the batch.
    pub fn run(&self, work: &mut dyn FnMut()) {
        match &self.0 {
            Some(batch) => batch(work),
            None => work(),
        }
    }

    pub fn is_immediate(&self) -> bool {
        self.0.is_none()
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::immediate()
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Batch")
            .field(&if self.is_immediate() { "immediate" } else { "custom" })
            .finish()
    }
}

/// Options for the selector synchronization protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Re-run the change detector right after the first subscribe, so a
    /// mutation between the render read and the attach is not missed.
    pub check_on_subscribe: bool,

    /// Append the previous selector failure to a repeated one.
    pub correlate_errors: bool,
}

impl SyncOptions {
    /// Parse options from a JSON document. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            check_on_subscribe: true,
            correlate_errors: true,
        }
    }
}

/// Configuration handed to registries, subscriptions and sync instances.
#[derive(Debug, Clone, Default)]
pub struct BindContext {
    batch: Batch,
    options: SyncOptions,
}

impl BindContext {
    pub fn new(batch: Batch, options: SyncOptions) -> Self {
        Self { batch, options }
    }

    /// Replace the batch function.
    pub fn with_batch(mut self, batch: Batch) -> Self {
        self.batch = batch;
        self
    }

    /// Replace the options.
    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }
}
