//! Event series: immutable identities that group related events.
//!
//! A series for the 3-period moving average of AAPL 1-minute bars should always hash to
//! the same id, whichever component builds it. Identity comes from the series'
//! `repr_attrs` (and label, when present) and is computed once at construction.
//!
//! Identity hashes are stable within a process, not across machines.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::kind::EventKind;

/// Identity hash of a series. Equal ids mean equal series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesId(u64);

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A group of related events, independent of their concrete kind.
///
/// Cheap to clone; all clones share the same immutable data.
#[derive(Clone)]
pub struct EventSeries {
    inner: Arc<SeriesInner>,
}

struct SeriesInner {
    gen_id: String,
    event_kind: Option<&'static EventKind>,
    label_name: Option<String>,
    repr_attrs: Vec<(String, Value)>,
    attrs: Vec<(String, Value)>,
    event_args: Vec<String>,
    uniform: bool,
    id: SeriesId,
}

impl EventSeries {
    pub fn builder() -> SeriesBuilder {
        SeriesBuilder::default()
    }

    /// A plain series producing events of `kind`.
    pub fn new(kind: &'static EventKind) -> Self {
        Self::builder().event_kind(kind).build()
    }

    /// A uniform (gap-free) series, e.g. fixed-interval bars.
    pub fn time_series(kind: &'static EventKind) -> SeriesBuilder {
        Self::builder().event_kind(kind).uniform(true)
    }

    pub(crate) fn for_kind(kind: &'static EventKind) -> Self {
        // Kinds sharing a name are still distinct, so the address joins the identity.
        Self::builder()
            .event_kind(kind)
            .label(format!("{} series(auto)", kind.name()))
            .repr_attr("kind_id", kind.id().as_usize())
            .build()
    }

    pub fn id(&self) -> SeriesId {
        self.inner.id
    }

    pub fn gen_id(&self) -> &str {
        &self.inner.gen_id
    }

    pub fn event_kind(&self) -> Option<&'static EventKind> {
        self.inner.event_kind
    }

    pub fn label_name(&self) -> Option<&str> {
        self.inner.label_name.as_deref()
    }

    pub fn repr_attrs(&self) -> &[(String, Value)] {
        &self.inner.repr_attrs
    }

    pub fn event_args(&self) -> &[String] {
        &self.inner.event_args
    }

    pub fn is_uniform(&self) -> bool {
        self.inner.uniform
    }

    /// Look up an attribute by name, identity attributes first.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.inner
            .repr_attrs
            .iter()
            .chain(self.inner.attrs.iter())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// The attributes named in `event_args`, for copying into constructed events.
    /// Names with no matching attribute are skipped.
    pub fn args(&self) -> Map<String, Value> {
        self.inner
            .event_args
            .iter()
            .filter_map(|name| self.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }
}

impl PartialEq for EventSeries {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for EventSeries {}

impl Hash for EventSeries {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for EventSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("EventSeries");
        if let Some(kind) = self.inner.event_kind {
            s.field("event_kind", &kind.name());
        }
        for (key, value) in &self.inner.repr_attrs {
            s.field(key, value);
        }
        if let Some(label) = &self.inner.label_name {
            s.field("label_name", label);
        }
        s.field("id", &self.inner.id).finish()
    }
}

impl fmt::Display for EventSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.label_name {
            Some(label) => f.write_str(label),
            None => write!(f, "{self:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// SeriesBuilder
// ---------------------------------------------------------------------------

/// Collects series attributes; `build()` freezes them and computes the identity.
#[derive(Debug, Default)]
pub struct SeriesBuilder {
    event_kind: Option<&'static EventKind>,
    label_name: Option<String>,
    repr_attrs: Vec<(String, Value)>,
    attrs: Vec<(String, Value)>,
    event_args: Vec<String>,
    uniform: bool,
}

impl SeriesBuilder {
    pub fn event_kind(mut self, kind: &'static EventKind) -> Self {
        self.event_kind = Some(kind);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label_name = Some(label.into());
        self
    }

    /// An attribute that takes part in the series identity.
    pub fn repr_attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.repr_attrs.push((name.into(), value.into()));
        self
    }

    /// Descriptive metadata that does not affect identity.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    /// Name an attribute a factory should copy into the events it builds.
    pub fn event_arg(mut self, name: impl Into<String>) -> Self {
        self.event_args.push(name.into());
        self
    }

    pub fn uniform(mut self, uniform: bool) -> Self {
        self.uniform = uniform;
        self
    }

    pub fn build(self) -> EventSeries {
        let id = identity(&self.repr_attrs, self.label_name.as_deref());
        let gen_id = format!(
            "{}_{}",
            if self.uniform { "TimeSeries" } else { "EventSeries" },
            Uuid::new_v4()
        );

        EventSeries {
            inner: Arc::new(SeriesInner {
                gen_id,
                event_kind: self.event_kind,
                label_name: self.label_name,
                repr_attrs: self.repr_attrs,
                attrs: self.attrs,
                event_args: self.event_args,
                uniform: self.uniform,
                id,
            }),
        }
    }
}

fn identity(repr_attrs: &[(String, Value)], label: Option<&str>) -> SeriesId {
    let mut hasher = DefaultHasher::new();
    for (name, value) in repr_attrs {
        name.hash(&mut hasher);
        // serde_json::Value has no Hash impl; its compact rendering is canonical enough
        // for scalar attributes and insertion-ordered objects.
        value.to_string().hash(&mut hasher);
    }
    if let Some(label) = label {
        "label_name".hash(&mut hasher);
        label.hash(&mut hasher);
    }
    SeriesId(hasher.finish())
}
