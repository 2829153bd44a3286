//! The bus driver: pulls events from sources and feeds them to the component tree.

use bouncebox_events::{BaseEvent, Event, EventRef};
use tracing::{info, warn};

use crate::component::Component;
use crate::config::BoxConfig;
use crate::error::Result;
use crate::router::Router;
use crate::source::{Source, SourceSet};

/// Outcome of [`BounceBox::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Source events sent into the box.
    pub events: u64,
    /// False when the run stopped at the configured step limit.
    pub exhausted: bool,
}

/// Root of a component tree, driven by one or more sources.
///
/// ```
/// use bouncebox_engine::{callback, iter_source, BounceBox, Component};
/// use bouncebox_events::{BaseEvent, Event, SOURCE_EVENT};
///
/// let mut bus = BounceBox::new();
/// let counter = Component::builder("Counter")
///     .listen(&SOURCE_EVENT, callback(|_| Ok(())))
///     .build();
/// bus.add_component(&counter).unwrap();
/// bus.add_source(iter_source((0..3).map(|_| BaseEvent::new(&SOURCE_EVENT).into_ref())));
///
/// let summary = bus.run().unwrap();
/// assert_eq!(summary.events, 3);
/// ```
pub struct BounceBox {
    component: Component,
    sources: SourceSet,
    config: BoxConfig,
    started: bool,
    ended: bool,
    sent: u64,
}

impl BounceBox {
    pub fn new() -> Self {
        Self::with_config(BoxConfig::default())
    }

    pub fn with_config(config: BoxConfig) -> Self {
        let component = Component::new("BounceBox");
        if config.log_messages {
            component.router().start_logging();
        }
        Self {
            component,
            sources: SourceSet::new(),
            config,
            started: false,
            ended: false,
            sent: 0,
        }
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn router(&self) -> &Router {
        self.component.router()
    }

    pub fn config(&self) -> &BoxConfig {
        &self.config
    }

    pub fn add_component(&self, child: &Component) -> Result<()> {
        self.component.add_component(child)
    }

    pub fn add_contained(&self, child: &Component) -> Result<()> {
        self.component.add_contained(child)
    }

    pub fn add_source(&mut self, source: impl Source + 'static) {
        self.sources.push(source);
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Send `message` into the box router.
    pub fn send(&self, message: EventRef) -> Result<()> {
        self.router().send(message)
    }

    /// Broadcast from the box itself: subscribers of the box component, then its router.
    pub fn broadcast(&self, event: EventRef) -> Result<()> {
        self.component.broadcast(event)
    }

    /// Send the next source event. `None` once the sources are exhausted; the end
    /// event is broadcast the first time that happens.
    pub fn send_next(&mut self) -> Result<Option<EventRef>> {
        let Some(event) = self.sources.next_event() else {
            self.end()?;
            return Ok(None);
        };
        self.send(event.clone())?;
        self.sent += 1;
        Ok(Some(event))
    }

    /// Send up to `n` source events. Returns how many were sent.
    pub fn step(&mut self, n: usize) -> Result<usize> {
        for sent in 0..n {
            if self.send_next()?.is_none() {
                return Ok(sent);
            }
        }
        Ok(n)
    }

    /// Send until the sources are exhausted or the step limit is reached.
    pub fn run(&mut self) -> Result<RunSummary> {
        if self.sources.is_empty() {
            warn!("No sources attached, exiting");
            return Ok(RunSummary::default());
        }

        if self.config.announce_start && !self.started {
            self.broadcast(BaseEvent::start().into_ref())?;
        }
        self.started = true;

        let start = self.sent;
        loop {
            if let Some(limit) = self.config.max_steps {
                if self.sent - start >= limit {
                    info!(events = self.sent - start, limit, "step limit reached");
                    return Ok(RunSummary {
                        events: self.sent - start,
                        exhausted: false,
                    });
                }
            }
            if self.send_next()?.is_none() {
                break;
            }
        }

        info!(events = self.sent - start, "sources exhausted");
        Ok(RunSummary {
            events: self.sent - start,
            exhausted: true,
        })
    }

    /// Broadcast the end event, once.
    pub fn end(&mut self) -> Result<()> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;
        self.broadcast(BaseEvent::end().into_ref())
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Source events sent so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl Default for BounceBox {
    fn default() -> Self {
        Self::new()
    }
}

/// Pulls the next merged source event without sending it.
impl Iterator for BounceBox {
    type Item = EventRef;

    fn next(&mut self) -> Option<EventRef> {
        self.sources.next_event()
    }
}

impl std::fmt::Debug for BounceBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BounceBox")
            .field("component", &self.component.id())
            .field("sources", &self.sources.len())
            .field("sent", &self.sent)
            .field("ended", &self.ended)
            .finish()
    }
}
