//! Reentrancy-safe delivery queue in front of the dispatch backends.
//!
//! ```text
//!   send(A) ──► Idle? ──yes──► Processing ──► deliver A ──► drain queue ──► Idle
//!                  │                              │
//!                  no                     callback sends B
//!                  │                              │
//!                  └──────► queue.push_back(B) ◄──┘
//! ```
//!
//! A message sent from inside a callback is queued, never delivered inline, so
//! propagation is breadth-first: everything observes A before anything observes B.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use bouncebox_events::{Event, EventKind, EventRef, EventSeries};
use tracing::{trace, warn};

use crate::dispatch::{Backend, Callback, EventDispatcher, SeriesDispatcher};
use crate::error::{BusError, Result};

// ---------------------------------------------------------------------------
// Exchange / BindKey
// ---------------------------------------------------------------------------

/// Which backend a binding goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    Event,
    Series,
}

impl Exchange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Event => "event",
            Exchange::Series => "series",
        }
    }
}

impl FromStr for Exchange {
    type Err = BusError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "event" => Ok(Exchange::Event),
            "series" => Ok(Exchange::Series),
            other => Err(BusError::DispatcherNotFound(other.to_string())),
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a callback is bound against.
#[derive(Debug, Clone)]
pub enum BindKey {
    Kind(&'static EventKind),
    Series(EventSeries),
}

impl BindKey {
    pub fn exchange(&self) -> Exchange {
        match self {
            BindKey::Kind(_) => Exchange::Event,
            BindKey::Series(_) => Exchange::Series,
        }
    }
}

impl From<&'static EventKind> for BindKey {
    fn from(kind: &'static EventKind) -> Self {
        BindKey::Kind(kind)
    }
}

impl From<EventSeries> for BindKey {
    fn from(series: EventSeries) -> Self {
        BindKey::Series(series)
    }
}

impl From<&EventSeries> for BindKey {
    fn from(series: &EventSeries) -> Self {
        BindKey::Series(series.clone())
    }
}

impl fmt::Display for BindKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindKey::Kind(kind) => write!(f, "kind {}", kind.name()),
            BindKey::Series(series) => write!(f, "series {series}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendMode {
    Direct,
    Logged,
}

/// Delivery engine shared by a component and everything that routes through it.
///
/// Cheap to clone; clones share one queue and one set of registries.
#[derive(Clone)]
pub struct Router {
    inner: Rc<RouterInner>,
}

struct RouterInner {
    event_dispatcher: EventDispatcher,
    series_dispatcher: SeriesDispatcher,
    backends: RefCell<Vec<Rc<dyn Backend>>>,
    queue: RefCell<VecDeque<EventRef>>,
    processing: Cell<bool>,
    mode: Cell<SendMode>,
    logs: RefCell<Vec<EventRef>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RouterInner {
                event_dispatcher: EventDispatcher::new(),
                series_dispatcher: SeriesDispatcher::new(),
                backends: RefCell::new(Vec::new()),
                queue: RefCell::new(VecDeque::new()),
                processing: Cell::new(false),
                mode: Cell::new(SendMode::Direct),
                logs: RefCell::new(Vec::new()),
            }),
        }
    }

    /// A router that records every message passed to `send`.
    pub fn with_logging() -> Self {
        let router = Self::new();
        router.start_logging();
        router
    }

    // --- binding -----------------------------------------------------------

    /// Bind `callback` on the exchange named `exchange` (`"event"` or `"series"`).
    pub fn bind(&self, key: impl Into<BindKey>, callback: Callback, exchange: &str) -> Result<()> {
        let exchange = exchange.parse::<Exchange>()?;
        self.bind_on(key.into(), callback, exchange)
    }

    pub fn bind_on(&self, key: BindKey, callback: Callback, exchange: Exchange) -> Result<()> {
        match (exchange, key) {
            (Exchange::Event, BindKey::Kind(kind)) => self.bind_event(kind, callback),
            (Exchange::Series, BindKey::Series(series)) => self.bind_series(&series, callback),
            (exchange, key) => {
                return Err(BusError::ExchangeMismatch {
                    exchange: exchange.as_str(),
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn bind_event(&self, kind: &'static EventKind, callback: Callback) {
        trace!(kind = kind.name(), "bind event callback");
        self.inner.event_dispatcher.bind(kind, callback);
    }

    pub fn bind_series(&self, series: &EventSeries, callback: Callback) {
        trace!(series = %series, "bind series callback");
        self.inner.series_dispatcher.bind(series.id(), callback);
    }

    /// Register an extra backend. It receives every message after the built-in ones.
    pub fn add_backend(&self, backend: Rc<dyn Backend>) {
        self.inner.backends.borrow_mut().push(backend);
    }

    // --- delivery ----------------------------------------------------------

    /// Deliver `message` to every interested callback.
    ///
    /// Called while this router is already delivering, the message is queued and this
    /// returns immediately; the active drain delivers it in arrival order.
    ///
    /// Called while idle, the message joins the back of the queue and the queue is
    /// drained. Messages left over from a drain that a callback aborted are therefore
    /// delivered before `message`.
    pub fn send(&self, message: EventRef) -> Result<()> {
        if self.inner.mode.get() == SendMode::Logged {
            self.inner.logs.borrow_mut().push(message.clone());
        }

        self.inner.queue.borrow_mut().push_back(message);
        if self.inner.processing.get() {
            trace!(pending = self.pending(), "router busy, message queued");
            return Ok(());
        }
        self.drain()
    }

    /// Deliver everything in the queue, oldest first.
    ///
    /// After a callback error the queue keeps whatever was not yet delivered; calling
    /// `drain` resumes from there. No-op while a drain is already running.
    pub fn drain(&self) -> Result<()> {
        if self.inner.processing.get() {
            return Ok(());
        }

        let _processing = Processing::enter(&self.inner.processing);
        loop {
            let next = self.inner.queue.borrow_mut().pop_front();
            let Some(message) = next else {
                break;
            };
            if let Err(err) = self.deliver(&message) {
                warn!(
                    kind = message.kind().name(),
                    pending = self.pending(),
                    error = %err,
                    "delivery aborted by callback"
                );
                return Err(err);
            }
        }
        Ok(())
    }

    fn deliver(&self, message: &EventRef) -> Result<()> {
        self.inner.event_dispatcher.send(message)?;
        self.inner.series_dispatcher.send(message)?;

        if self.inner.backends.borrow().is_empty() {
            return Ok(());
        }
        let extra = self.inner.backends.borrow().clone();
        for backend in extra {
            backend.send(message)?;
        }
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.processing.get()
    }

    // --- logging -----------------------------------------------------------

    pub fn start_logging(&self) {
        self.inner.mode.set(SendMode::Logged);
    }

    pub fn stop_logging(&self) {
        self.inner.mode.set(SendMode::Direct);
    }

    pub fn is_logging(&self) -> bool {
        self.inner.mode.get() == SendMode::Logged
    }

    /// Messages captured while logging, in the order `send` was called.
    pub fn logs(&self) -> Vec<EventRef> {
        self.inner.logs.borrow().clone()
    }

    pub fn clear_logs(&self) {
        self.inner.logs.borrow_mut().clear();
    }

    // --- inspection --------------------------------------------------------

    pub fn event_dispatcher(&self) -> &EventDispatcher {
        &self.inner.event_dispatcher
    }

    pub fn series_dispatcher(&self) -> &SeriesDispatcher {
        &self.inner.series_dispatcher
    }

    /// True when both handles point at the same router.
    pub fn same(&self, other: &Router) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("processing", &self.is_processing())
            .field("pending", &self.pending())
            .field("logging", &self.is_logging())
            .finish()
    }
}

impl fmt::Display for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "EventDispatcher:")?;
        for (kind, count) in self.inner.event_dispatcher.bindings() {
            writeln!(f, "{}", kind.name())?;
            writeln!(f, "\t{count} callbacks")?;
        }
        writeln!(f, "SeriesDispatcher:")?;
        for (id, count) in self.inner.series_dispatcher.bindings() {
            writeln!(f, "{id}")?;
            writeln!(f, "\t{count} callbacks")?;
        }
        Ok(())
    }
}

/// Marks a router as processing; clears the flag on drop, including on error.
struct Processing<'a>(&'a Cell<bool>);

impl<'a> Processing<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for Processing<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
