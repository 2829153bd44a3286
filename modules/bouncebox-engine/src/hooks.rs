//! Attach hooks: behaviour that runs whenever a child joins a component.
//!
//! Subscription wiring is not hard-coded into `add_component`. Every component is
//! built with two hooks, [`SeriesBindingHook`] and [`EventBindingHook`], which bind the
//! child's declared callbacks on the router that controls it. Extra hooks can be added
//! per instance, or shared across a family of components through a [`HookRegistry`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::component::Component;
use crate::error::Result;
use crate::router::Router;

/// Runs when `child` is attached to `parent`.
pub trait AttachHook {
    fn on_attach(&self, parent: &Component, child: &Component) -> Result<()>;
}

impl<F> AttachHook for F
where
    F: Fn(&Component, &Component) -> Result<()>,
{
    fn on_attach(&self, parent: &Component, child: &Component) -> Result<()> {
        self(parent, child)
    }
}

/// Binds the child's `(kind, callback)` listeners on its controlling router.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventBindingHook;

impl AttachHook for EventBindingHook {
    fn on_attach(&self, _parent: &Component, child: &Component) -> Result<()> {
        bind_listeners(child, &child.controlling_router());
        Ok(())
    }
}

/// Binds the child's `(series, callback)` bindings on its controlling router.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesBindingHook;

impl AttachHook for SeriesBindingHook {
    fn on_attach(&self, _parent: &Component, child: &Component) -> Result<()> {
        bind_series(child, &child.controlling_router());
        Ok(())
    }
}

/// Bind every event listener of `component` (declared and runtime) on `router`.
pub fn bind_listeners(component: &Component, router: &Router) {
    let listeners = component.event_callbacks();
    debug!(
        component = %component.id(),
        count = listeners.len(),
        "binding event listeners"
    );
    for (kind, callback) in listeners {
        router.bind_event(kind, callback);
    }
}

/// Bind every series binding of `component` (declared and runtime) on `router`.
pub fn bind_series(component: &Component, router: &Router) {
    let bindings = component.series_bindings();
    debug!(
        component = %component.id(),
        count = bindings.len(),
        "binding series callbacks"
    );
    for (series, callback) in bindings {
        router.bind_series(&series, callback);
    }
}

// ---------------------------------------------------------------------------
// HookRegistry
// ---------------------------------------------------------------------------

/// Attach hooks shared by every component built with the same registry.
///
/// Clones share one list. A hook added later applies to later attaches on every
/// component holding the registry.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Rc<RefCell<Vec<Rc<dyn AttachHook>>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, hook: impl AttachHook + 'static) {
        self.hooks.borrow_mut().push(Rc::new(hook));
    }

    pub fn len(&self) -> usize {
        self.hooks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.borrow().is_empty()
    }

    pub(crate) fn snapshot(&self) -> Vec<Rc<dyn AttachHook>> {
        self.hooks.borrow().clone()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.len())
            .finish()
    }
}
