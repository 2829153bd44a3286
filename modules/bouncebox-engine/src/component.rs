//! The component tree: ownership, front resolution and hook-driven wiring.
//!
//! A component routes everything it broadcasts through its *front*. An unattached
//! component is its own front. `add_component` shares the parent's front with the
//! child, so a whole subtree delivers through one router. `add_contained` makes the
//! parent the child's front, scoping the child to the parent's router.

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use bouncebox_events::{Event, EventKind, EventRef, EventSeries, END_EVENT};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dispatch::Callback;
use crate::error::{BusError, Result};
use crate::hooks::{self, AttachHook, EventBindingHook, HookRegistry, SeriesBindingHook};
use crate::router::{BindKey, Router};

/// Receives broadcasts redirected away from a component's front router.
pub trait Relay {
    fn relay(&self, event: EventRef) -> Result<()>;
}

/// Where a component's broadcasts go, and which router its subscriptions live on.
#[derive(Clone)]
pub(crate) enum Route {
    Router(Router),
    Relay {
        relay: Weak<dyn Relay>,
        router: Router,
    },
}

impl Route {
    fn router(&self) -> &Router {
        match self {
            Route::Router(router) | Route::Relay { router, .. } => router,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Plain,
    Middleware,
}

struct Attachment {
    parent: Weak<Node>,
    front: Weak<Node>,
    route: Route,
    contained: bool,
}

type Subscriber = (Option<&'static EventKind>, Callback);

struct Node {
    id: String,
    name: String,
    role: Role,
    router: Router,
    attachment: RefCell<Option<Attachment>>,
    components: RefCell<Vec<Component>>,
    listeners: RefCell<Vec<(&'static EventKind, Callback)>>,
    series_bindings: RefCell<Vec<(EventSeries, Callback)>>,
    hooks: RefCell<Vec<Rc<dyn AttachHook>>>,
    registry: Option<HookRegistry>,
    end_handler: RefCell<Option<Callback>>,
    subscribers: RefCell<Vec<Subscriber>>,
    internal_router: OnceCell<Router>,
    broadcast_log: Option<RefCell<Vec<EventRef>>>,
}

/// A node in the ownership tree. Clones are handles to the same node.
#[derive(Clone)]
pub struct Component {
    node: Rc<Node>,
}

/// Non-owning handle, for callbacks that need to broadcast as their own component.
#[derive(Clone)]
pub struct WeakComponent {
    node: Weak<Node>,
}

impl WeakComponent {
    pub fn upgrade(&self) -> Option<Component> {
        self.node.upgrade().map(|node| Component { node })
    }
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    pub fn builder(name: impl Into<String>) -> ComponentBuilder {
        ComponentBuilder::new(name)
    }

    pub fn id(&self) -> &str {
        &self.node.id
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// The component's own router. Shared with every child attached through it.
    pub fn router(&self) -> &Router {
        &self.node.router
    }

    pub fn downgrade(&self) -> WeakComponent {
        WeakComponent {
            node: Rc::downgrade(&self.node),
        }
    }

    /// True when both handles point at the same node.
    pub fn same(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }

    pub fn is_middleware(&self) -> bool {
        self.node.role == Role::Middleware
    }

    // --- tree --------------------------------------------------------------

    pub fn is_attached(&self) -> bool {
        self.node.attachment.borrow().is_some()
    }

    pub fn is_contained(&self) -> bool {
        self.node
            .attachment
            .borrow()
            .as_ref()
            .is_some_and(|attachment| attachment.contained)
    }

    pub fn parent(&self) -> Option<Component> {
        let attachment = self.node.attachment.borrow();
        let node = attachment.as_ref()?.parent.upgrade()?;
        Some(Component { node })
    }

    /// The component this one routes through. Itself until attached; `None` only when
    /// the front has since been dropped.
    pub fn front(&self) -> Option<Component> {
        match self.node.attachment.borrow().as_ref() {
            None => Some(self.clone()),
            Some(attachment) => attachment.front.upgrade().map(|node| Component { node }),
        }
    }

    /// Owned children, in attach order.
    pub fn components(&self) -> Vec<Component> {
        self.node.components.borrow().clone()
    }

    /// The router this component's subscriptions are bound on once attached: its
    /// front's router, or the middleware's down-path router for middleware children.
    pub fn controlling_router(&self) -> Router {
        self.route().router().clone()
    }

    fn route(&self) -> Route {
        match self.node.attachment.borrow().as_ref() {
            Some(attachment) => attachment.route.clone(),
            None => Route::Router(self.node.router.clone()),
        }
    }

    /// Attach `child` so that it shares this component's front.
    ///
    /// Attaching is final. If an attach hook fails, the child stays attached with the
    /// bindings made by the hooks that ran before it, plus its end handler, and the
    /// hook's error is returned.
    pub fn add_component(&self, child: &Component) -> Result<()> {
        self.attach(child, false)
    }

    /// Attach `child` with this component as its front.
    pub fn add_contained(&self, child: &Component) -> Result<()> {
        self.attach(child, true)
    }

    fn attach(&self, child: &Component, contained: bool) -> Result<()> {
        if self.is_middleware() {
            return Err(BusError::PlainChildOnMiddleware(self.id().to_string()));
        }
        if self.same(child) {
            return Err(BusError::SelfAttach(self.id().to_string()));
        }
        if child.is_attached() {
            return Err(BusError::AlreadyAttached(child.id().to_string()));
        }
        let children = child.node.components.borrow().len();
        if children > 0 {
            return Err(BusError::PopulatedSubtree {
                id: child.id().to_string(),
                children,
            });
        }

        let (front, route) = if contained {
            (
                Rc::downgrade(&self.node),
                Route::Router(self.node.router.clone()),
            )
        } else {
            self.front_route()
        };
        child.set_attachment(Attachment {
            parent: Rc::downgrade(&self.node),
            front,
            route,
            contained,
        });
        self.node.components.borrow_mut().push(child.clone());
        debug!(
            parent = %self.id(),
            child = %child.id(),
            contained,
            "component attached"
        );

        // A failing hook does not detach the child; the end handler is still bound.
        let hooked = self.fire_attach_hooks(child);
        if let Some(end_handler) = child.end_handler() {
            child.controlling_router().bind_event(&END_EVENT, end_handler);
        }
        if let Err(err) = &hooked {
            warn!(parent = %self.id(), child = %child.id(), error = %err, "attach hook failed");
        }
        hooked
    }

    fn front_route(&self) -> (Weak<Node>, Route) {
        match self.node.attachment.borrow().as_ref() {
            Some(attachment) => (attachment.front.clone(), attachment.route.clone()),
            None => (
                Rc::downgrade(&self.node),
                Route::Router(self.node.router.clone()),
            ),
        }
    }

    pub(crate) fn attach_to_relay(&self, parent: &Component, relay: Weak<dyn Relay>, router: Router) {
        self.set_attachment(Attachment {
            parent: Rc::downgrade(&parent.node),
            front: Rc::downgrade(&parent.node),
            route: Route::Relay { relay, router },
            contained: true,
        });
    }

    fn set_attachment(&self, attachment: Attachment) {
        *self.node.attachment.borrow_mut() = Some(attachment);
    }

    pub(crate) fn child_count(&self) -> usize {
        self.node.components.borrow().len()
    }

    fn fire_attach_hooks(&self, child: &Component) -> Result<()> {
        let mut hooks = self.node.hooks.borrow().clone();
        if let Some(registry) = &self.node.registry {
            hooks.extend(registry.snapshot());
        }
        for hook in hooks {
            hook.on_attach(self, child)?;
        }
        Ok(())
    }

    // --- subscriptions -----------------------------------------------------

    /// Add a listener at runtime. Takes effect on the next attach (or internal router
    /// build); bindings already made are not revisited.
    pub fn add_event_listener(&self, kind: &'static EventKind, callback: Callback) {
        self.node.listeners.borrow_mut().push((kind, callback));
    }

    pub fn add_series_binding(&self, series: &EventSeries, callback: Callback) {
        self.node
            .series_bindings
            .borrow_mut()
            .push((series.clone(), callback));
    }

    /// Declared and runtime listeners, in the order they were added.
    pub fn event_callbacks(&self) -> Vec<(&'static EventKind, Callback)> {
        self.node.listeners.borrow().clone()
    }

    pub fn series_bindings(&self) -> Vec<(EventSeries, Callback)> {
        self.node.series_bindings.borrow().clone()
    }

    pub fn add_attach_hook(&self, hook: impl AttachHook + 'static) {
        self.node.hooks.borrow_mut().push(Rc::new(hook));
    }

    /// Handler for the end-of-stream event, bound when this component is attached.
    pub fn on_end(&self, callback: Callback) {
        *self.node.end_handler.borrow_mut() = Some(callback);
    }

    pub fn end_handler(&self) -> Option<Callback> {
        self.node.end_handler.borrow().clone()
    }

    /// Bind directly on this component's own router.
    pub fn bind(&self, key: impl Into<BindKey>, callback: Callback, exchange: &str) -> Result<()> {
        self.node.router.bind(key, callback, exchange)
    }

    // --- publishing --------------------------------------------------------

    /// Direct subscription, independent of the tree. `None` receives every event.
    pub fn subscribe(&self, callback: Callback, kind: Option<&'static EventKind>) {
        self.node.subscribers.borrow_mut().push((kind, callback));
    }

    /// Deliver `event` to direct subscribers whose kind filter matches.
    pub fn publish(&self, event: &EventRef) -> Result<()> {
        let subscribers = self.node.subscribers.borrow().clone();
        for (kind, callback) in subscribers {
            if kind.map_or(true, |kind| event.kind().is_a(kind)) {
                callback(event)?;
            }
        }
        Ok(())
    }

    /// Publish to subscribers, record when logging, then route through the front.
    pub fn broadcast(&self, event: EventRef) -> Result<()> {
        self.publish(&event)?;
        if let Some(log) = &self.node.broadcast_log {
            log.borrow_mut().push(event.clone());
        }
        self.send(event)
    }

    /// Route `message` through the front without publishing it.
    pub fn send(&self, message: EventRef) -> Result<()> {
        match self.route() {
            Route::Router(router) => router.send(message),
            Route::Relay { relay, .. } => match relay.upgrade() {
                Some(relay) => relay.relay(message),
                None => {
                    warn!(component = %self.id(), "relay dropped, broadcast discarded");
                    Ok(())
                }
            },
        }
    }

    /// Everything this component broadcast, when built with `log_broadcasts`.
    pub fn broadcast_log(&self) -> Vec<EventRef> {
        self.node
            .broadcast_log
            .as_ref()
            .map(|log| log.borrow().clone())
            .unwrap_or_default()
    }

    // --- isolated processing -----------------------------------------------

    /// Private router holding only this component's bindings. Built on first use.
    pub fn internal_router(&self) -> Router {
        self.node
            .internal_router
            .get_or_init(|| {
                let router = Router::new();
                hooks::bind_series(self, &router);
                hooks::bind_listeners(self, &router);
                router
            })
            .clone()
    }

    /// Run `event` through this component's own callbacks only.
    pub fn handle_event(&self, event: EventRef) -> Result<()> {
        self.internal_router().send(event)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.node.id)
            .field("role", &self.node.role)
            .field("attached", &self.is_attached())
            .field("components", &self.node.components.borrow().len())
            .finish()
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.node.id)
    }
}

// ---------------------------------------------------------------------------
// ComponentBuilder
// ---------------------------------------------------------------------------

/// Declares a component's subscriptions before it exists.
///
/// ```
/// use bouncebox_engine::{callback, Component};
/// use bouncebox_events::EVENT;
///
/// let printer = Component::builder("Printer")
///     .listen(&EVENT, callback(|event| {
///         println!("{event:?}");
///         Ok(())
///     }))
///     .build();
/// assert_eq!(printer.event_callbacks().len(), 1);
/// ```
pub struct ComponentBuilder {
    name: String,
    role: Role,
    listeners: Vec<(&'static EventKind, Callback)>,
    series_bindings: Vec<(EventSeries, Callback)>,
    hooks: Vec<Rc<dyn AttachHook>>,
    registry: Option<HookRegistry>,
    end_handler: Option<Callback>,
    log_broadcasts: bool,
}

impl ComponentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: Role::Plain,
            listeners: Vec::new(),
            series_bindings: Vec::new(),
            hooks: Vec::new(),
            registry: None,
            end_handler: None,
            log_broadcasts: false,
        }
    }

    pub fn listen(mut self, kind: &'static EventKind, callback: Callback) -> Self {
        self.listeners.push((kind, callback));
        self
    }

    pub fn bind_series(mut self, series: &EventSeries, callback: Callback) -> Self {
        self.series_bindings.push((series.clone(), callback));
        self
    }

    pub fn hook(mut self, hook: impl AttachHook + 'static) -> Self {
        self.hooks.push(Rc::new(hook));
        self
    }

    /// Hooks shared with every other component built from the same registry.
    pub fn registry(mut self, registry: HookRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn on_end(mut self, callback: Callback) -> Self {
        self.end_handler = Some(callback);
        self
    }

    pub fn log_broadcasts(mut self, enabled: bool) -> Self {
        self.log_broadcasts = enabled;
        self
    }

    pub(crate) fn middleware(mut self) -> Self {
        self.role = Role::Middleware;
        self
    }

    pub fn build(self) -> Component {
        let mut hooks: Vec<Rc<dyn AttachHook>> =
            vec![Rc::new(SeriesBindingHook), Rc::new(EventBindingHook)];
        hooks.extend(self.hooks);

        let id = format!("{}_{}", self.name, Uuid::new_v4());
        Component {
            node: Rc::new(Node {
                id,
                name: self.name,
                role: self.role,
                router: Router::new(),
                attachment: RefCell::new(None),
                components: RefCell::new(Vec::new()),
                listeners: RefCell::new(self.listeners),
                series_bindings: RefCell::new(self.series_bindings),
                hooks: RefCell::new(hooks),
                registry: self.registry,
                end_handler: RefCell::new(self.end_handler),
                subscribers: RefCell::new(Vec::new()),
                internal_router: OnceCell::new(),
                broadcast_log: self.log_broadcasts.then(|| RefCell::new(Vec::new())),
            }),
        }
    }
}

impl fmt::Debug for ComponentBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentBuilder")
            .field("name", &self.name)
            .field("listeners", &self.listeners.len())
            .field("series_bindings", &self.series_bindings.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
