// Elapsed-time rendering command

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use baysync_core::{
    ElapsedReading, Engine, EngineConfig, InMemorySharedStore, ManualClock, NoopCuePlayer,
    TimeEventKind,
};
use serde::Serialize;

use crate::output::{print_field, OutputFormat};

const SLOT: &str = "elapsed";

#[derive(Debug, Serialize)]
struct ElapsedResult {
    seconds: i64,
    elapsed: String,
    reading: &'static str,
}

pub fn run(config: EngineConfig, output: OutputFormat, seconds: i64) -> Result<()> {
    let clock = ManualClock::starting_now();
    let engine = Engine::builder(Arc::new(InMemorySharedStore::new()))
        .with_config(config)
        .with_clock(Arc::new(clock.clone()))
        .with_cue_player(Arc::new(NoopCuePlayer))
        .build();

    let events = engine.time_events();
    events.record(SLOT, "-", TimeEventKind::Called, "cli");

    let offset = Duration::from_secs(seconds.unsigned_abs());
    if seconds >= 0 {
        clock.advance(offset);
    } else {
        clock.rewind(offset);
    }

    let reading = match events.elapsed_reading(SLOT, TimeEventKind::Called) {
        ElapsedReading::Valid(_) => "valid",
        ElapsedReading::Missing => "missing",
        ElapsedReading::Negative => "negative",
        ElapsedReading::Stale => "stale",
    };
    let result = ElapsedResult {
        seconds,
        elapsed: events.elapsed(SLOT, TimeEventKind::Called),
        reading,
    };

    output.render(&result, |r| {
        print_field("Elapsed", &r.elapsed);
        print_field("Reading", r.reading);
    })
}
