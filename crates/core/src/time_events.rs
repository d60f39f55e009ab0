// Time-Event Registry
//
// Records one timestamp per (slot, milestone). Writes are last-write-wins; no
// history is kept here. Elapsed-time rendering clamps absent, future and stale
// timestamps to "00:00" instead of failing, since a bad timer must never break
// the screen that shows it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::clock::{to_chrono, Clock};
use crate::keys;
use crate::model::{TimeEvent, TimeEventKind};
use crate::signals::{Signal, SignalHub};
use crate::store::typed::{read_json, remove_key, write_json};
use crate::store::SharedStore;

/// Rendering of a zero or clamped duration
pub const ZERO_ELAPSED: &str = "00:00";

/// Which time events to clear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventScope {
    Only(TimeEventKind),
    All,
}

impl From<TimeEventKind> for EventScope {
    fn from(kind: TimeEventKind) -> Self {
        EventScope::Only(kind)
    }
}

/// Why an elapsed reading was clamped to zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElapsedReading {
    Valid(Duration),
    Missing,
    /// The timestamp lies in the future (clock skew between contexts)
    Negative,
    /// Older than the configured stale cutoff
    Stale,
}

impl ElapsedReading {
    /// Duration to display: zero unless the reading is valid
    pub fn clamped(&self) -> Duration {
        match self {
            Self::Valid(d) => *d,
            _ => Duration::ZERO,
        }
    }
}

pub struct TimeEventRegistry {
    store: Arc<dyn SharedStore>,
    hub: Arc<SignalHub>,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
}

impl TimeEventRegistry {
    pub fn new(
        store: Arc<dyn SharedStore>,
        hub: Arc<SignalHub>,
        clock: Arc<dyn Clock>,
        stale_after: Duration,
    ) -> Self {
        Self {
            store,
            hub,
            clock,
            stale_after,
        }
    }

    /// Record a milestone now, overwriting any previous one for `(slot_id, kind)`.
    pub fn record(
        &self,
        slot_id: &str,
        driver_tag: &str,
        kind: TimeEventKind,
        source: &str,
    ) -> DateTime<Utc> {
        let event = TimeEvent {
            slot_id: slot_id.to_string(),
            driver_tag: driver_tag.to_string(),
            timestamp: self.clock.now(),
            kind,
            source: source.to_string(),
        };

        if write_json(self.store.as_ref(), &keys::time_event(slot_id, kind), &event) {
            debug!(slot_id, driver_tag, kind = %kind, source, "Time event recorded");
        }

        let timestamp = event.timestamp;
        self.hub.emit(Signal::TimeEventRecorded { event });
        timestamp
    }

    /// Full record for a milestone
    pub fn event(&self, slot_id: &str, kind: TimeEventKind) -> Option<TimeEvent> {
        read_json(self.store.as_ref(), &keys::time_event(slot_id, kind))
    }

    /// Timestamp of a milestone
    pub fn get(&self, slot_id: &str, kind: TimeEventKind) -> Option<DateTime<Utc>> {
        self.event(slot_id, kind).map(|e| e.timestamp)
    }

    pub fn has(&self, slot_id: &str, kind: TimeEventKind) -> bool {
        self.get(slot_id, kind).is_some()
    }

    /// Clear one milestone or all of them for a slot
    pub fn clear(&self, slot_id: &str, scope: impl Into<EventScope>) {
        let scope = scope.into();
        let kinds: &[TimeEventKind] = match &scope {
            EventScope::Only(kind) => std::slice::from_ref(kind),
            EventScope::All => &TimeEventKind::ALL,
        };

        for kind in kinds {
            remove_key(self.store.as_ref(), &keys::time_event(slot_id, *kind));
        }

        let kind = match scope {
            EventScope::Only(kind) => Some(kind),
            EventScope::All => None,
        };
        debug!(slot_id, ?kind, "Time events cleared");
        self.hub.emit(Signal::TimeEventCleared {
            slot_id: slot_id.to_string(),
            kind,
        });
    }

    /// Classify the age of a milestone
    pub fn elapsed_reading(&self, slot_id: &str, kind: TimeEventKind) -> ElapsedReading {
        let Some(at) = self.get(slot_id, kind) else {
            return ElapsedReading::Missing;
        };

        let delta = self.clock.now().signed_duration_since(at);
        if delta < chrono::Duration::zero() {
            return ElapsedReading::Negative;
        }
        if delta > to_chrono(self.stale_after) {
            return ElapsedReading::Stale;
        }
        // Non-negative here, so the conversion cannot fail
        ElapsedReading::Valid(delta.to_std().unwrap_or_default())
    }

    /// Elapsed time since a milestone, rendered as `MM:SS` (or `HH:MM:SS`).
    ///
    /// Absent, future and stale timestamps render as `"00:00"`.
    pub fn elapsed(&self, slot_id: &str, kind: TimeEventKind) -> String {
        let reading = self.elapsed_reading(slot_id, kind);
        match reading {
            ElapsedReading::Valid(d) => format_elapsed(d),
            ElapsedReading::Missing => {
                debug!(slot_id, kind = %kind, "No time event recorded, elapsed clamped to zero");
                ZERO_ELAPSED.to_string()
            }
            ElapsedReading::Negative => {
                warn!(slot_id, kind = %kind, "Time event lies in the future, elapsed clamped to zero");
                ZERO_ELAPSED.to_string()
            }
            ElapsedReading::Stale => {
                warn!(
                    slot_id,
                    kind = %kind,
                    stale_after_secs = self.stale_after.as_secs(),
                    "Time event is stale, elapsed clamped to zero"
                );
                ZERO_ELAPSED.to_string()
            }
        }
    }
}

/// Render a duration as `MM:SS`, switching to `HH:MM:SS` from one hour.
pub fn format_elapsed(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}
