// Two-context scenario command
//
// An operator console and a driver terminal share one in-memory store. The
// console calls a driver, its delay monitor flags the driver late, the terminal
// answers, the console re-calls, and the slot is loaded and finalized. Every
// signal is printed as the terminal sees it: its own directly, the console's
// through the relay.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use baysync_core::{
    format_elapsed, Clock, Engine, EngineConfig, InMemorySharedStore, LogCuePlayer, ManualClock,
    Notification, SharedStore, Signal, SignalEnvelope, SignalRelay, Slot, Subscription, Topic,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::output::{print_field, print_table, OutputFormat, TableRow};

#[derive(Debug, Serialize)]
struct StepRecord {
    at: String,
    actor: &'static str,
    action: String,
    result: String,
}

#[derive(Debug, Serialize)]
struct SignalRecord {
    at: String,
    origin: &'static str,
    topic: Topic,
    summary: String,
    signal: Signal,
}

impl TableRow for StepRecord {
    const COLUMNS: &'static [(&'static str, usize)] =
        &[("AT", 8), ("ACTOR", 9), ("ACTION", 24), ("RESULT", 24)];

    fn cells(&self) -> Vec<String> {
        vec![
            self.at.clone(),
            self.actor.to_string(),
            self.action.clone(),
            self.result.clone(),
        ]
    }
}

impl TableRow for SignalRecord {
    const COLUMNS: &'static [(&'static str, usize)] =
        &[("AT", 8), ("ORIGIN", 9), ("TOPIC", 14), ("SIGNAL", 50)];

    fn cells(&self) -> Vec<String> {
        vec![
            self.at.clone(),
            self.origin.to_string(),
            self.topic.as_str().to_string(),
            self.summary.clone(),
        ]
    }
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    steps: Vec<StepRecord>,
    signals: Vec<SignalRecord>,
    notifications: Vec<Notification>,
    slot: Slot,
}

struct Simulation {
    clock: ManualClock,
    console: Engine,
    terminal: Engine,
    relay: SignalRelay,
    subscriptions: Vec<Subscription>,
    start: DateTime<Utc>,
    steps: Vec<StepRecord>,
    signals: Vec<SignalRecord>,
}

impl Simulation {
    fn new(config: EngineConfig) -> Self {
        let store: Arc<dyn SharedStore> = Arc::new(InMemorySharedStore::new());
        let clock = ManualClock::starting_now();
        let build = || {
            Engine::builder(store.clone())
                .with_config(config.clone())
                .with_clock(Arc::new(clock.clone()))
                .with_cue_player(Arc::new(LogCuePlayer))
                .build()
        };
        let console = build();
        let terminal = build();
        let relay = terminal.relay();
        let subscriptions = Topic::ALL.iter().map(|t| terminal.subscribe(*t)).collect();

        Self {
            start: clock.now(),
            clock,
            console,
            terminal,
            relay,
            subscriptions,
            steps: Vec::new(),
            signals: Vec::new(),
        }
    }

    fn wait(&self, by: Duration) {
        self.clock.advance(by);
    }

    fn record(&mut self, actor: &'static str, action: String, result: String) {
        self.steps.push(StepRecord {
            at: offset_label(self.start, self.clock.now()),
            actor,
            action,
            result,
        });

        self.relay.drain();
        let mut envelopes: Vec<SignalEnvelope> = self
            .subscriptions
            .iter_mut()
            .flat_map(|sub| sub.drain())
            .collect();
        // UUID v7 ids order by emission time
        envelopes.sort_by_key(|e| e.id);

        let console_id = self.console.context_id();
        for envelope in envelopes {
            self.signals.push(SignalRecord {
                at: offset_label(self.start, envelope.emitted_at),
                origin: if envelope.origin == console_id {
                    "console"
                } else {
                    "terminal"
                },
                topic: envelope.signal.topic(),
                summary: describe(&envelope.signal),
                signal: envelope.signal,
            });
        }
    }
}

pub fn run(
    config: EngineConfig,
    output: OutputFormat,
    quiet: bool,
    slot: &str,
    driver: &str,
    decline: bool,
) -> Result<()> {
    let grace = config.grace_period;
    let mut sim = Simulation::new(config);

    let called = sim.console.slots().call(slot, driver, "console")?;
    sim.record(
        "console",
        format!("call {driver} to {slot}"),
        called.status.to_string(),
    );

    sim.wait(grace / 2);
    let raised = sim.console.delay_monitor().tick();
    sim.record("console", "delay scan".to_string(), format!("{raised} raised"));

    sim.wait(grace / 2 + Duration::from_secs(1));
    let raised = sim.console.delay_monitor().tick();
    sim.record("console", "delay scan".to_string(), format!("{raised} raised"));

    sim.wait(Duration::from_secs(10));
    let responses = sim.terminal.driver_responses();
    let (action, answer) = if decline {
        ("decline entry", responses.decline_entry(slot, driver))
    } else {
        ("confirm entry", responses.confirm_entry(slot, driver))
    };
    sim.record("terminal", action.to_string(), answer.kind.to_string());

    sim.wait(Duration::from_secs(20));
    let recalled = sim.console.slots().call(slot, driver, "console")?;
    sim.record(
        "console",
        format!("re-call {driver} to {slot}"),
        recalled.status.to_string(),
    );

    sim.wait(Duration::from_secs(30));
    let loading = sim.terminal.slots().begin_loading(slot, "terminal")?;
    sim.record(
        "terminal",
        "begin loading".to_string(),
        loading.status.to_string(),
    );

    sim.wait(Duration::from_secs(5 * 60));
    let finalized = sim.console.slots().finalize(slot, "console")?;
    sim.record(
        "console",
        "finalize".to_string(),
        finalized.status.to_string(),
    );

    let report = SimulationReport {
        notifications: sim.terminal.notifications().list(),
        slot: sim.terminal.slots().get(slot),
        steps: sim.steps,
        signals: sim.signals,
    };

    output.render(&report, |report| {
        if !quiet {
            println!("Steps");
            print_table(&report.steps);
            println!();
            println!("Signals seen by the terminal");
        }

        print_table(&report.signals);

        if !quiet {
            println!();
            print_field("Slot", &report.slot.id);
            print_field("Status", &report.slot.status.to_string());
            print_field("Notifications", &report.notifications.len().to_string());
            for n in &report.notifications {
                println!("  - [{}] {}", n.kind, n.message);
            }
        }
    })
}

/// Time since the start of the scenario, as `+MM:SS`
fn offset_label(start: DateTime<Utc>, at: DateTime<Utc>) -> String {
    let offset = (at - start).to_std().unwrap_or_default();
    format!("+{}", format_elapsed(offset))
}

/// One-line description of a signal for text output
fn describe(signal: &Signal) -> String {
    match signal {
        Signal::NotificationCreated { notification } => {
            format!("{}: {}", notification.kind, notification.message)
        }
        Signal::NotificationsUpdated { removed } => format!("notifications removed: {removed}"),
        Signal::DelayRaised {
            slot_id,
            driver_tag,
            source,
        } => format!("delay {slot_id} {driver_tag} ({source})"),
        Signal::AutomaticDelayRaised {
            slot_id,
            driver_tag,
        } => format!("automatic delay {slot_id} {driver_tag}"),
        Signal::ManualDelayRaised {
            slot_id,
            driver_tag,
        } => format!("manual delay {slot_id} {driver_tag}"),
        Signal::AlertsCleared { slot_id, source } => {
            format!("alerts cleared {slot_id} by {source}")
        }
        Signal::AlertsClearedBatch { count, source, .. } => {
            format!("alerts cleared on {count} slots by {source}")
        }
        Signal::TimeEventRecorded { event } => {
            format!("{} {} by {}", event.slot_id, event.kind, event.source)
        }
        Signal::TimeEventCleared { slot_id, kind } => match kind {
            Some(kind) => format!("{slot_id} {kind} cleared"),
            None => format!("{slot_id} timers cleared"),
        },
        Signal::SlotTransitioned {
            slot_id, from, to, ..
        } => format!("{slot_id} {from} -> {to}"),
    }
}
