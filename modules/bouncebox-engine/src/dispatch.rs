//! Dispatch backends resolve which callbacks a message reaches.
//!
//! Two strategies ship with every [`Router`](crate::Router):
//! - [`EventDispatcher`]: kind-hierarchy matching, cached per concrete kind.
//! - [`SeriesDispatcher`]: exact match on the message's series identity.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bouncebox_events::{Event, EventKind, EventRef, KindId, SeriesId};

use crate::error::Result;

/// A subscriber function. Errors abort the delivery in progress and propagate to
/// whoever called `send`.
pub type Callback = Rc<dyn Fn(&EventRef) -> anyhow::Result<()>>;

/// Wrap a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&EventRef) -> anyhow::Result<()> + 'static,
{
    Rc::new(f)
}

/// Bind a method of a shared object as a [`Callback`].
///
/// Holds only a weak reference: once `target` is dropped the callback does nothing,
/// so a router never keeps its subscribers alive.
pub fn handler<T: 'static>(
    target: &Rc<T>,
    method: fn(&T, &EventRef) -> anyhow::Result<()>,
) -> Callback {
    let target = Rc::downgrade(target);
    Rc::new(move |event| match target.upgrade() {
        Some(target) => method(&target, event),
        None => Ok(()),
    })
}

/// Something a router hands every message to.
pub trait Backend {
    fn name(&self) -> &'static str;

    fn send(&self, message: &EventRef) -> Result<()>;
}

// ---------------------------------------------------------------------------
// EventDispatcher
// ---------------------------------------------------------------------------

/// Dispatches on the message's kind and all of its ancestors.
///
/// Callbacks fire grouped by bound kind, in the order each kind was first bound.
/// Resolved lists are cached per concrete kind; every `bind` clears the cache so a late
/// binding is picked up by kinds that were already seen.
#[derive(Default)]
pub struct EventDispatcher {
    registry: RefCell<Vec<(&'static EventKind, Vec<Callback>)>>,
    cache: RefCell<HashMap<KindId, Rc<[Callback]>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, kind: &'static EventKind, callback: Callback) {
        let mut registry = self.registry.borrow_mut();
        match registry.iter_mut().find(|(bound, _)| *bound == kind) {
            Some((_, callbacks)) => callbacks.push(callback),
            None => registry.push((kind, vec![callback])),
        }
        self.cache.borrow_mut().clear();
    }

    /// Every callback a message of `kind` reaches.
    pub fn callbacks_for(&self, kind: &'static EventKind) -> Rc<[Callback]> {
        let cached = self.cache.borrow().get(&kind.id()).cloned();
        if let Some(callbacks) = cached {
            return callbacks;
        }

        let resolved: Rc<[Callback]> = self
            .registry
            .borrow()
            .iter()
            .filter(|(bound, _)| kind.is_a(bound))
            .flat_map(|(_, callbacks)| callbacks.iter().cloned())
            .collect();
        self.cache.borrow_mut().insert(kind.id(), resolved.clone());
        resolved
    }

    /// Callbacks bound to exactly `kind`, without ancestors.
    pub fn registered(&self, kind: &'static EventKind) -> Vec<Callback> {
        self.registry
            .borrow()
            .iter()
            .find(|(bound, _)| *bound == kind)
            .map(|(_, callbacks)| callbacks.clone())
            .unwrap_or_default()
    }

    /// Bound kinds in first-bind order, with their callback counts.
    pub fn bindings(&self) -> Vec<(&'static EventKind, usize)> {
        self.registry
            .borrow()
            .iter()
            .map(|(kind, callbacks)| (*kind, callbacks.len()))
            .collect()
    }

    pub fn cached_kinds(&self) -> usize {
        self.cache.borrow().len()
    }
}

impl Backend for EventDispatcher {
    fn name(&self) -> &'static str {
        "event"
    }

    fn send(&self, message: &EventRef) -> Result<()> {
        for callback in self.callbacks_for(message.kind()).iter() {
            callback(message)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SeriesDispatcher
// ---------------------------------------------------------------------------

/// Dispatches on the message's series identity. No hierarchy, no cache.
#[derive(Default)]
pub struct SeriesDispatcher {
    registry: RefCell<HashMap<SeriesId, Vec<Callback>>>,
}

impl SeriesDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, series: SeriesId, callback: Callback) {
        self.registry
            .borrow_mut()
            .entry(series)
            .or_default()
            .push(callback);
    }

    pub fn registered(&self, series: SeriesId) -> Vec<Callback> {
        self.registry
            .borrow()
            .get(&series)
            .cloned()
            .unwrap_or_default()
    }

    /// Series ids with their callback counts. Includes the empty entries created for
    /// series that were delivered but never bound.
    pub fn bindings(&self) -> Vec<(SeriesId, usize)> {
        self.registry
            .borrow()
            .iter()
            .map(|(id, callbacks)| (*id, callbacks.len()))
            .collect()
    }
}

impl Backend for SeriesDispatcher {
    fn name(&self) -> &'static str {
        "series"
    }

    fn send(&self, message: &EventRef) -> Result<()> {
        let callbacks = self
            .registry
            .borrow_mut()
            .entry(message.series().id())
            .or_default()
            .clone();
        for callback in &callbacks {
            callback(message)?;
        }
        Ok(())
    }
}
