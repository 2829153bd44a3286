use std::cell::Cell;
use std::rc::Rc;

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, TimeZone, Utc, Weekday};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bouncebox_engine::{
    filter, handler, iter_source, BounceBox, BoxConfig, Component, FilterDirection, Middleware,
};
use bouncebox_events::{BaseEvent, Event, EventRef, SOURCE_EVENT};

/// Logs every daily event it sees and reports a count at end of stream.
struct DailyPrinter {
    seen: Cell<u64>,
}

impl DailyPrinter {
    fn on_event(&self, event: &EventRef) -> anyhow::Result<()> {
        self.seen.set(self.seen.get() + 1);
        info!(kind = event.kind().name(), timestamp = ?event.timestamp(), "event");
        Ok(())
    }

    fn on_end(&self, _event: &EventRef) -> anyhow::Result<()> {
        info!(events = self.seen.get(), "end of stream");
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("bouncebox=info".parse()?))
        .init();

    let config = BoxConfig::from_env()?;
    info!(?config, "BounceBox demo starting...");

    let start = Utc
        .with_ymd_and_hms(2000, 1, 1, 0, 0, 0)
        .single()
        .context("start date is ambiguous")?;
    let days = (0..10).map(move |day| BaseEvent::at(&SOURCE_EVENT, start + Duration::days(day)).into_ref());

    let mut bus = BounceBox::with_config(config);
    bus.add_source(iter_source(days));

    // Weekdays only below this point.
    let weekdays = Middleware::new("Weekdays");
    weekdays.add_filter(
        FilterDirection::Down,
        filter(|event| {
            let weekend = event
                .timestamp()
                .is_some_and(|ts| matches!(ts.weekday(), Weekday::Sat | Weekday::Sun));
            Ok((!weekend).then_some(event))
        }),
    )?;
    bus.add_component(weekdays.component())?;

    let printer = Rc::new(DailyPrinter { seen: Cell::new(0) });
    let component = Component::builder("DailyPrinter")
        .listen(&SOURCE_EVENT, handler(&printer, DailyPrinter::on_event))
        .on_end(handler(&printer, DailyPrinter::on_end))
        .build();
    weekdays.add_child(&component)?;

    let summary = bus.run()?;
    info!(
        events = summary.events,
        delivered = printer.seen.get(),
        "BounceBox demo finished"
    );
    Ok(())
}
