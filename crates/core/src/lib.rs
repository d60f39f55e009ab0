// Notification & Time-Event Synchronization Engine
//
// This crate keeps several independently running execution contexts (operator
// consoles, the driver terminal, admin dashboards) in agreement about loading
// slots: who was called when, which drivers are late, which notifications are
// live, and which alerts have been retracted.
//
// Key design decisions:
// - All shared state lives behind the SharedStore trait (last-write-wins, no locks)
// - Each context is an Engine that owns its components; nothing is module-global
// - Changes fan out as typed signals through a per-context SignalHub, mirrored to
//   the store so other contexts' relays can re-deliver them
// - Storage failures are logged and degraded; only rejected slot transitions are
//   returned as errors
// - Time comes from a Clock trait so every window is testable

pub mod alerts;
pub mod audio;
pub mod clock;
pub mod config;
pub mod delay;
pub mod driver_responses;
pub mod engine;
pub mod error;
pub mod keys;
pub mod model;
pub mod monitor;
pub mod notifications;
pub mod relay;
pub mod signals;
pub mod slots;
pub mod store;
pub mod telemetry;
pub mod time_events;

// Re-exports for convenience
pub use alerts::{AlertManager, ClearReport, ClearStep};
pub use audio::{AudioCue, CueDispatcher, CuePlayer, LogCuePlayer, NoopCuePlayer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use delay::{DelayDetector, DelayOutcome};
pub use driver_responses::DriverResponses;
pub use engine::{Engine, EngineBuilder};
pub use error::{Result, SlotAction, TransitionError};
pub use model::{
    ClearMarker, DelayMarker, DelaySource, Notification, NotificationType, ResponseMarker, Slot,
    SlotAlert, SlotStatus, TimeEvent, TimeEventKind,
};
pub use monitor::DelayMonitor;
pub use notifications::NotificationBus;
pub use relay::SignalRelay;
pub use signals::{Signal, SignalEnvelope, SignalHub, Subscription, Topic};
pub use slots::SlotMachine;
pub use store::{ChangeKind, InMemorySharedStore, SharedStore, StoreChange, StoreError};
pub use time_events::{format_elapsed, ElapsedReading, EventScope, TimeEventRegistry};
