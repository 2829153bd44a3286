//! Event data model for the bouncebox bus.
//!
//! Domain-agnostic and free of any dispatch logic: kinds (the type hierarchy),
//! immutable events, series identities and factories. The engine crate routes these.

pub mod event;
pub mod factory;
pub mod kind;
pub mod series;

pub use event::{AsAny, BaseEvent, Event, EventHeader, EventRef};
pub use factory::EventFactory;
pub use kind::{EventKind, KindId, END_EVENT, EVENT, SOURCE_EVENT, START_EVENT};
pub use series::{EventSeries, SeriesBuilder, SeriesId};
