//! The static type hierarchy events are dispatched against.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use crate::series::EventSeries;

/// A node in the event type hierarchy.
///
/// Kinds are declared as `static` items and compared by address, so two kinds that
/// happen to share a name are still distinct. An event of kind `K` is also an event of
/// every ancestor of `K` for dispatch purposes.
///
/// ```
/// use bouncebox_events::{EventKind, EVENT};
///
/// static TICK: EventKind = EventKind::new("Tick", Some(&EVENT));
/// static TRADE: EventKind = EventKind::new("Trade", Some(&TICK));
///
/// assert!(TRADE.is_a(&EVENT));
/// assert!(TRADE.is_a(&TICK));
/// assert!(!TICK.is_a(&TRADE));
/// ```
pub struct EventKind {
    name: &'static str,
    parent: Option<&'static EventKind>,
    series: OnceLock<EventSeries>,
}

/// Address-based identity of a kind. Used as a cache/registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KindId(usize);

impl KindId {
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl EventKind {
    pub const fn new(name: &'static str, parent: Option<&'static EventKind>) -> Self {
        Self {
            name,
            parent,
            series: OnceLock::new(),
        }
    }

    pub const fn root(name: &'static str) -> Self {
        Self::new(name, None)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<&'static EventKind> {
        self.parent
    }

    pub fn id(&self) -> KindId {
        KindId(self as *const EventKind as usize)
    }

    /// Ancestor-or-self check.
    pub fn is_a(&self, other: &EventKind) -> bool {
        self.ancestors().any(|kind| std::ptr::eq(kind, other))
    }

    /// This kind followed by its parent chain, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = &EventKind> {
        std::iter::successors(Some(self), |kind| kind.parent.map(|p| p as &EventKind))
    }

    /// Number of ancestors above this kind. `EVENT` has depth 0.
    pub fn depth(&self) -> usize {
        self.ancestors().count() - 1
    }

    /// The auto-generated series shared by every event of this kind that was not
    /// given an explicit series. Created on first use, then memoized.
    pub fn class_series(&'static self) -> &'static EventSeries {
        self.series.get_or_init(|| EventSeries::for_kind(self))
    }
}

impl PartialEq for EventKind {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for EventKind {}

impl Hash for EventKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventKind")
            .field("name", &self.name)
            .field("parent", &self.parent.map(|p| p.name))
            .finish()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ---------------------------------------------------------------------------
// Built-in kinds
// ---------------------------------------------------------------------------

/// Root of every kind hierarchy. Binding to it receives every event.
pub static EVENT: EventKind = EventKind::root("Event");

/// Events produced outside the tree, by sources.
pub static SOURCE_EVENT: EventKind = EventKind::new("SourceEvent", Some(&EVENT));

/// Announces that a box is about to start pulling from its sources.
pub static START_EVENT: EventKind = EventKind::new("StartEvent", Some(&EVENT));

/// End-of-stream: every source has been exhausted.
pub static END_EVENT: EventKind = EventKind::new("EndEvent", Some(&EVENT));
