//! Middleware: a tree node that sits between a front and its own children.
//!
//! ```text
//!            front router
//!              │     ▲
//!   bubble down│     │bubble up (broadcast as the middleware)
//!   down filter│     │up filter
//!              ▼     │
//!          down router ◄── children's bindings
//!              │     ▲
//!              ▼     │ child.broadcast
//!            children
//! ```
//!
//! Every event seen by the front passes through the down filter once and then reaches
//! the children through one shared down router. Children broadcast into the up path, so
//! the front sees their events as coming from the middleware.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use bouncebox_events::{EventRef, END_EVENT, EVENT};
use tracing::{debug, trace};

use crate::component::{Component, Relay, WeakComponent};
use crate::dispatch::callback;
use crate::error::{BusError, Result};
use crate::hooks;
use crate::router::Router;

/// Transforms an event on its way through a middleware. `None` stops the event.
pub type Filter = Rc<dyn Fn(EventRef) -> anyhow::Result<Option<EventRef>>>;

/// Wrap a closure as a [`Filter`].
pub fn filter<F>(f: F) -> Filter
where
    F: Fn(EventRef) -> anyhow::Result<Option<EventRef>> + 'static,
{
    Rc::new(f)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDirection {
    /// Front to children.
    Down,
    /// Children to front.
    Up,
}

impl FilterDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterDirection::Down => "down",
            FilterDirection::Up => "up",
        }
    }
}

struct State {
    id: String,
    component: WeakComponent,
    down_router: Router,
    children: RefCell<Vec<Component>>,
    down_filter: RefCell<Option<Filter>>,
    up_filter: RefCell<Option<Filter>>,
}

impl State {
    fn filter(&self, direction: FilterDirection) -> &RefCell<Option<Filter>> {
        match direction {
            FilterDirection::Down => &self.down_filter,
            FilterDirection::Up => &self.up_filter,
        }
    }

    fn apply(&self, direction: FilterDirection, event: EventRef) -> Result<Option<EventRef>> {
        let filter = self.filter(direction).borrow().clone();
        match filter {
            Some(filter) => Ok(filter(event)?),
            None => Ok(Some(event)),
        }
    }

    fn bubble_down(&self, event: &EventRef) -> Result<()> {
        let Some(event) = self.apply(FilterDirection::Down, event.clone())? else {
            trace!(middleware = %self.id, "down filter suppressed event");
            return Ok(());
        };
        self.down_router.send(event)
    }

    fn bubble_up(&self, event: EventRef) -> Result<()> {
        let Some(event) = self.apply(FilterDirection::Up, event)? else {
            trace!(middleware = %self.id, "up filter suppressed event");
            return Ok(());
        };
        match self.component.upgrade() {
            Some(component) => component.broadcast(event),
            None => Ok(()),
        }
    }
}

impl Relay for State {
    fn relay(&self, event: EventRef) -> Result<()> {
        self.bubble_up(event)
    }
}

/// Pass-through node. Attach it like any component; give it children with
/// [`Middleware::add_child`].
#[derive(Clone)]
pub struct Middleware {
    component: Component,
    state: Rc<State>,
}

impl Middleware {
    pub fn new(name: impl Into<String>) -> Self {
        let component = Component::builder(name).middleware().build();
        let state = Rc::new(State {
            id: component.id().to_string(),
            component: component.downgrade(),
            down_router: Router::new(),
            children: RefCell::new(Vec::new()),
            down_filter: RefCell::new(None),
            up_filter: RefCell::new(None),
        });

        let down = state.clone();
        component.add_event_listener(
            &EVENT,
            callback(move |event| Ok(down.bubble_down(event)?)),
        );
        Self { component, state }
    }

    /// The middleware's own tree node. Attach this to a parent.
    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn id(&self) -> &str {
        self.component.id()
    }

    /// Router the children's subscriptions are bound on.
    pub fn down_router(&self) -> &Router {
        &self.state.down_router
    }

    pub fn children(&self) -> Vec<Component> {
        self.state.children.borrow().clone()
    }

    /// Put `child` behind this middleware.
    pub fn add_child(&self, child: &Component) -> Result<()> {
        if self.component.same(child) {
            return Err(BusError::SelfAttach(child.id().to_string()));
        }
        if child.is_attached() {
            return Err(BusError::AlreadyAttached(child.id().to_string()));
        }
        let children = child.child_count();
        if children > 0 {
            return Err(BusError::PopulatedSubtree {
                id: child.id().to_string(),
                children,
            });
        }

        let relay: Weak<dyn Relay> = Rc::downgrade(&self.state) as Weak<dyn Relay>;
        child.attach_to_relay(&self.component, relay, self.state.down_router.clone());

        hooks::bind_series(child, &self.state.down_router);
        hooks::bind_listeners(child, &self.state.down_router);
        if let Some(end_handler) = child.end_handler() {
            self.state.down_router.bind_event(&END_EVENT, end_handler);
        }
        self.state.children.borrow_mut().push(child.clone());
        debug!(middleware = %self.id(), child = %child.id(), "middleware child added");
        Ok(())
    }

    /// Plain attach is not supported on a middleware; use [`Middleware::add_child`].
    pub fn add_component(&self, child: &Component) -> Result<()> {
        self.component.add_component(child)
    }

    /// Install the filter for `direction`. Each direction holds at most one filter.
    pub fn add_filter(&self, direction: FilterDirection, filter: Filter) -> Result<()> {
        let mut slot = self.state.filter(direction).borrow_mut();
        if slot.is_some() {
            return Err(BusError::FilterSlotTaken {
                id: self.id().to_string(),
                direction: direction.as_str(),
            });
        }
        *slot = Some(filter);
        Ok(())
    }

    pub fn has_filter(&self, direction: FilterDirection) -> bool {
        self.state.filter(direction).borrow().is_some()
    }

    /// Apply the down filter and deliver to the children.
    pub fn handle_bubble_down(&self, event: &EventRef) -> Result<()> {
        self.state.bubble_down(event)
    }

    /// Apply the up filter and broadcast as the middleware.
    pub fn handle_bubble_up(&self, event: EventRef) -> Result<()> {
        self.state.bubble_up(event)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware")
            .field("id", &self.state.id)
            .field("children", &self.state.children.borrow().len())
            .field("down_filter", &self.has_filter(FilterDirection::Down))
            .field("up_filter", &self.has_filter(FilterDirection::Up))
            .finish()
    }
}
