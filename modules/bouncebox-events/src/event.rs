//! Immutable occurrence records.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::kind::{EventKind, END_EVENT, START_EVENT};
use crate::series::EventSeries;

/// Shared handle to an event. Events are never mutated once built.
pub type EventRef = Arc<dyn Event>;

/// Upcast helper so `dyn Event` can be downcast to its concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An occurrence flowing through the bus.
///
/// Implementors carry an [`EventHeader`] plus whatever payload they need:
///
/// ```
/// use bouncebox_events::{Event, EventHeader, EventKind, EVENT};
///
/// static TRADE: EventKind = EventKind::new("Trade", Some(&EVENT));
///
/// #[derive(Debug)]
/// struct Trade {
///     header: EventHeader,
///     price: f64,
/// }
///
/// impl Event for Trade {
///     fn header(&self) -> &EventHeader {
///         &self.header
///     }
/// }
///
/// let trade = Trade { header: EventHeader::new(&TRADE), price: 10.5 }.into_ref();
/// assert!(trade.kind().is_a(&EVENT));
/// assert_eq!(trade.downcast_ref::<Trade>().map(|t| t.price), Some(10.5));
/// ```
pub trait Event: AsAny + fmt::Debug + Send + Sync {
    fn header(&self) -> &EventHeader;

    /// Payload attributes exposed to exporters. Header fields are added by
    /// [`Event::to_record`].
    fn attributes(&self) -> Map<String, Value> {
        Map::new()
    }

    fn kind(&self) -> &'static EventKind {
        self.header().kind()
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.header().timestamp()
    }

    fn series(&self) -> &EventSeries {
        self.header().series()
    }

    /// Flat record of the header plus [`Event::attributes`].
    fn to_record(&self) -> Map<String, Value> {
        let mut record = self.header().record();
        record.extend(self.attributes());
        record
    }

    fn into_ref(self) -> EventRef
    where
        Self: Sized + 'static,
    {
        Arc::new(self)
    }
}

impl dyn Event {
    pub fn downcast_ref<T: Event>(&self) -> Option<&T> {
        <dyn Event as AsAny>::as_any(self).downcast_ref::<T>()
    }

    pub fn is<T: Event>(&self) -> bool {
        <dyn Event as AsAny>::as_any(self).is::<T>()
    }
}

// ---------------------------------------------------------------------------
// EventHeader
// ---------------------------------------------------------------------------

/// Fields shared by every event. Built with the `with_*` chain, then frozen inside
/// the event; there are no setters.
#[derive(Clone)]
pub struct EventHeader {
    kind: &'static EventKind,
    generated: DateTime<Utc>,
    timestamp: Option<DateTime<Utc>>,
    source_event: Option<Weak<dyn Event>>,
    series: EventSeries,
}

#[derive(Serialize)]
struct HeaderRecord<'a> {
    kind: &'a str,
    timestamp: Option<DateTime<Utc>>,
    generated: DateTime<Utc>,
    series: String,
}

impl EventHeader {
    /// Header for an event of `kind`, stamped now, in the kind's class series.
    pub fn new(kind: &'static EventKind) -> Self {
        Self {
            kind,
            generated: Utc::now(),
            timestamp: None,
            source_event: None,
            series: kind.class_series().clone(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Record the event that caused this one. Inherits its timestamp unless one was
    /// already set; a later `with_timestamp` still wins.
    pub fn with_source(mut self, source: &EventRef) -> Self {
        self.timestamp = self.timestamp.or_else(|| source.timestamp());
        self.source_event = Some(Arc::downgrade(source));
        self
    }

    pub fn with_series(mut self, series: EventSeries) -> Self {
        self.series = series;
        self
    }

    pub fn kind(&self) -> &'static EventKind {
        self.kind
    }

    pub fn generated(&self) -> DateTime<Utc> {
        self.generated
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// The causing event, if it is still alive. The header does not keep it alive.
    pub fn source_event(&self) -> Option<EventRef> {
        self.source_event.as_ref().and_then(Weak::upgrade)
    }

    pub fn has_source(&self) -> bool {
        self.source_event.is_some()
    }

    pub fn series(&self) -> &EventSeries {
        &self.series
    }

    fn record(&self) -> Map<String, Value> {
        let record = HeaderRecord {
            kind: self.kind.name(),
            timestamp: self.timestamp,
            generated: self.generated,
            series: self.series.to_string(),
        };
        match serde_json::to_value(record) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

impl fmt::Debug for EventHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHeader")
            .field("kind", &self.kind.name())
            .field("timestamp", &self.timestamp)
            .field("generated", &self.generated)
            .field("has_source", &self.has_source())
            .field("series", &self.series.to_string())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// BaseEvent
// ---------------------------------------------------------------------------

/// Payload-less event. Enough for kinds that only signal that something happened.
#[derive(Debug, Clone)]
pub struct BaseEvent {
    header: EventHeader,
}

impl BaseEvent {
    pub fn new(kind: &'static EventKind) -> Self {
        Self::from_header(EventHeader::new(kind))
    }

    pub fn at(kind: &'static EventKind, timestamp: DateTime<Utc>) -> Self {
        Self::from_header(EventHeader::new(kind).with_timestamp(timestamp))
    }

    pub fn from_header(header: EventHeader) -> Self {
        Self { header }
    }

    pub fn start() -> Self {
        Self::new(&START_EVENT)
    }

    pub fn end() -> Self {
        Self::new(&END_EVENT)
    }
}

impl Event for BaseEvent {
    fn header(&self) -> &EventHeader {
        &self.header
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::EVENT;
    use chrono::TimeZone;

    #[derive(Debug)]
    struct Quote {
        header: EventHeader,
        bid: f64,
    }

    impl Event for Quote {
        fn header(&self) -> &EventHeader {
            &self.header
        }

        fn attributes(&self) -> Map<String, Value> {
            let mut map = Map::new();
            map.insert("bid".into(), self.bid.into());
            map
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn inherits_timestamp_from_source() {
        let source = BaseEvent::at(&EVENT, ts(100)).into_ref();
        let derived = BaseEvent::from_header(EventHeader::new(&EVENT).with_source(&source));

        assert_eq!(derived.timestamp(), Some(ts(100)));
        assert!(Arc::ptr_eq(&derived.header().source_event().unwrap(), &source));
    }

    #[test]
    fn own_timestamp_wins_over_source() {
        let source = BaseEvent::at(&EVENT, ts(100)).into_ref();
        let before = EventHeader::new(&EVENT)
            .with_timestamp(ts(5))
            .with_source(&source);
        let after = EventHeader::new(&EVENT)
            .with_source(&source)
            .with_timestamp(ts(7));

        assert_eq!(before.timestamp(), Some(ts(5)));
        assert_eq!(after.timestamp(), Some(ts(7)));
    }

    #[test]
    fn source_reference_does_not_own() {
        let source = BaseEvent::at(&EVENT, ts(1)).into_ref();
        let header = EventHeader::new(&EVENT).with_source(&source);
        drop(source);

        assert!(header.has_source());
        assert!(header.source_event().is_none());
        assert_eq!(header.timestamp(), Some(ts(1)));
    }

    #[test]
    fn defaults_to_class_series() {
        let event = BaseEvent::end();
        assert_eq!(event.series(), END_EVENT.class_series());
    }

    #[test]
    fn record_merges_header_and_attributes() {
        let quote = Quote {
            header: EventHeader::new(&EVENT).with_timestamp(ts(0)),
            bid: 1.25,
        };
        let record = quote.to_record();

        assert_eq!(record["kind"], "Event");
        assert_eq!(record["bid"], 1.25);
        assert_eq!(record["series"], "Event series(auto)");
        assert!(record.contains_key("generated"));
    }

    #[test]
    fn downcast_to_concrete_type() {
        let event: EventRef = Quote {
            header: EventHeader::new(&EVENT),
            bid: 2.0,
        }
        .into_ref();

        assert!(event.is::<Quote>());
        assert!(event.downcast_ref::<BaseEvent>().is_none());
        assert_eq!(event.downcast_ref::<Quote>().unwrap().bid, 2.0);
    }
}
