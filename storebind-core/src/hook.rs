//! Hook factory.
//!
//! [`UseStoreState`] binds a store and a [`BindContext`] once, then hands out
//! a [`SelectorSync`] per component instance.

use std::fmt;
use std::sync::Arc;

use crate::binding::{
    BindContext, Equality, Identity, RenderRequest, Rendered, Selector, SelectorSync,
    ShallowEq, Store, SyncBuilder,
};
use crate::error::{Error, Result};

/// A store binding factory.
///
/// # Example
///
/// ```rust,ignore
/// let use_store_state = UseStoreState::new(store.clone());
///
/// // once per component instance
/// let sync = use_store_state.instance::<i64>(request_render);
///
/// // every render attempt
/// let rendered = use_store_state.select(&sync, Some(&count))?;
/// ```
pub struct UseStoreState<St: Store> {
    store: Arc<St>,
    context: BindContext,
}

impl<St: Store> UseStoreState<St> {
    pub fn new(store: Arc<St>) -> Self {
        Self::with_context(store, BindContext::default())
    }

    pub fn with_context(store: Arc<St>, context: BindContext) -> Self {
        Self { store, context }
    }

    pub fn store(&self) -> &Arc<St> {
        &self.store
    }

    pub fn context(&self) -> &BindContext {
        &self.context
    }

    /// An instance comparing derived values by identity.
    pub fn instance<T>(&self, request_render: RenderRequest) -> SelectorSync<St, T>
    where
        T: Identity + Clone + Send + Sync + 'static,
    {
        self.builder(Equality::identity(), request_render).build()
    }

    /// An instance comparing derived values with a custom equality.
    pub fn instance_with<T>(
        &self,
        equality: Equality<T>,
        request_render: RenderRequest,
    ) -> SelectorSync<St, T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.builder(equality, request_render).build()
    }

    /// An instance comparing derived values one level deep.
    pub fn with_shallow_equal<T>(&self, request_render: RenderRequest) -> SelectorSync<St, T>
    where
        T: ShallowEq + Clone + Send + Sync + 'static,
    {
        self.builder(Equality::shallow(), request_render).build()
    }

    /// A builder preloaded with this factory's store and context.
    pub fn builder<T>(&self, equality: Equality<T>, request_render: RenderRequest) -> SyncBuilder<St, T>
    where
        T: Clone + Send + Sync + 'static,
    {
        SelectorSync::builder(Arc::clone(&self.store), equality, request_render)
            .context(&self.context)
    }

    /// Run a render attempt for `sync`.
    ///
    /// Fails with [`Error::MissingSelector`] before touching the instance
    /// when no selector is given.
    pub fn select<T>(
        &self,
        sync: &SelectorSync<St, T>,
        selector: Option<&Selector<St::State, T>>,
    ) -> Result<Rendered<St::State, T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let selector = selector.ok_or(Error::MissingSelector)?;
        sync.render(selector)
    }
}

impl<St: Store> Clone for UseStoreState<St> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            context: self.context.clone(),
        }
    }
}

impl<St: Store> fmt::Debug for UseStoreState<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UseStoreState")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
