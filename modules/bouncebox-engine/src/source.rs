//! Event sources and the chronological merge across them.

use bouncebox_events::{Event, EventRef};

/// Produces events until exhausted.
pub trait Source {
    /// The next event, or `None` once the source is exhausted.
    fn next_event(&mut self) -> Option<EventRef>;
}

/// Adapts any iterator of events into a [`Source`].
#[derive(Debug, Clone)]
pub struct IterSource<I> {
    iter: I,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = EventRef>,
{
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            iter: iter.into_iter(),
        }
    }
}

impl<I> Source for IterSource<I>
where
    I: Iterator<Item = EventRef>,
{
    fn next_event(&mut self) -> Option<EventRef> {
        self.iter.next()
    }
}

impl<I> From<I> for IterSource<I>
where
    I: Iterator<Item = EventRef>,
{
    fn from(iter: I) -> Self {
        Self { iter }
    }
}

/// Wrap `events` as a source.
pub fn iter_source<T>(events: T) -> IterSource<T::IntoIter>
where
    T: IntoIterator<Item = EventRef>,
{
    IterSource::from(events.into_iter())
}

struct Slot {
    source: Box<dyn Source>,
    head: Option<EventRef>,
    exhausted: bool,
}

impl Slot {
    fn fill(&mut self) {
        if self.head.is_some() || self.exhausted {
            return;
        }
        self.head = self.source.next_event();
        self.exhausted = self.head.is_none();
    }
}

/// k-way merge over sources, earliest timestamp first.
///
/// Events without a timestamp sort before timestamped ones. Ties go to the source that
/// was added first. A source that returns `None` once is never polled again.
#[derive(Default)]
pub struct SourceSet {
    slots: Vec<Slot>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: impl Source + 'static) {
        self.slots.push(Slot {
            source: Box::new(source),
            head: None,
            exhausted: false,
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// True once every source has reported exhaustion and no event is buffered.
    pub fn is_exhausted(&self) -> bool {
        self.slots
            .iter()
            .all(|slot| slot.exhausted && slot.head.is_none())
    }
}

impl Source for SourceSet {
    fn next_event(&mut self) -> Option<EventRef> {
        for slot in &mut self.slots {
            slot.fill();
        }
        let (index, _) = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.head.as_ref().map(|event| (index, event.timestamp())))
            .min_by_key(|&(index, timestamp)| (timestamp, index))?;
        self.slots[index].head.take()
    }
}
