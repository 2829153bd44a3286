//! Builds events that belong to a known series.

use serde_json::{Map, Value};

use crate::event::{Event, EventHeader, EventRef};
use crate::kind::{EventKind, EVENT};
use crate::series::EventSeries;

/// Keeps a series' metadata together with the events built from it.
#[derive(Debug, Clone)]
pub struct EventFactory {
    series: EventSeries,
}

impl EventFactory {
    pub fn new(series: EventSeries) -> Self {
        Self { series }
    }

    pub fn series(&self) -> &EventSeries {
        &self.series
    }

    /// Kind of the events this factory produces. Series without a kind produce
    /// plain `EVENT`s.
    pub fn kind(&self) -> &'static EventKind {
        self.series.event_kind().unwrap_or(&EVENT)
    }

    /// A fresh header already placed in this factory's series.
    pub fn header(&self) -> EventHeader {
        EventHeader::new(self.kind()).with_series(self.series.clone())
    }

    /// Attributes the series hands down to every event it produces.
    pub fn event_args(&self) -> Map<String, Value> {
        self.series.args()
    }

    pub fn build<E, F>(&self, make: F) -> EventRef
    where
        E: Event + 'static,
        F: FnOnce(EventHeader, &Map<String, Value>) -> E,
    {
        let args = self.event_args();
        make(self.header(), &args).into_ref()
    }
}
