// Delay Detector
//
// Decides whether a called driver is late and, if so, raises a delay alert.
// No delay state is kept in memory: eligibility is derived on every call from
// the `called` time event and the per-(slot, driver) last-notified marker, so any
// context can run detection against the shared store.
//
// Automatic reports are dropped once the slot is loading or finalized, and
// otherwise pass two gates:
// - grace period: the `called` event must be older than `grace_period`
// - suppression: no automatic alert for this (slot, driver) within `auto_suppression`
// Manual reports skip both gates and leave a manual-delay marker behind.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::alerts::AlertManager;
use crate::audio::{AudioCue, CueDispatcher};
use crate::clock::{later_by, Clock};
use crate::keys;
use crate::model::{DelayMarker, DelaySource, Notification, NotificationType, TimeEventKind};
use crate::notifications::NotificationBus;
use crate::signals::{Signal, SignalHub};
use crate::store::typed::{read_json, remove_key, write_json};
use crate::store::SharedStore;
use crate::time_events::TimeEventRegistry;

/// Result of a delay report
#[derive(Debug, Clone, PartialEq)]
pub enum DelayOutcome {
    /// A delay notification was published
    Raised(Notification),

    /// Automatic report for a slot with no `called` event
    NotCalled,

    /// Automatic report for a slot the driver has already reached
    Arrived,

    /// The driver was called too recently to be late
    GracePeriod { remaining: Duration },

    /// An automatic alert for this driver was raised too recently
    Suppressed { remaining: Duration },
}

impl DelayOutcome {
    pub fn is_raised(&self) -> bool {
        matches!(self, Self::Raised(_))
    }

    pub fn notification(&self) -> Option<&Notification> {
        match self {
            Self::Raised(n) => Some(n),
            _ => None,
        }
    }
}

pub struct DelayDetector {
    store: Arc<dyn SharedStore>,
    hub: Arc<SignalHub>,
    clock: Arc<dyn Clock>,
    registry: Arc<TimeEventRegistry>,
    bus: Arc<NotificationBus>,
    alerts: Arc<AlertManager>,
    cues: CueDispatcher,
    grace_period: Duration,
    auto_suppression: Duration,
}

impl DelayDetector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn SharedStore>,
        hub: Arc<SignalHub>,
        clock: Arc<dyn Clock>,
        registry: Arc<TimeEventRegistry>,
        bus: Arc<NotificationBus>,
        alerts: Arc<AlertManager>,
        cues: CueDispatcher,
        grace_period: Duration,
        auto_suppression: Duration,
    ) -> Self {
        Self {
            store,
            hub,
            clock,
            registry,
            bus,
            alerts,
            cues,
            grace_period,
            auto_suppression,
        }
    }

    /// Report that a driver may be late for a slot.
    #[instrument(skip(self))]
    pub fn report_delay(&self, slot_id: &str, driver_tag: &str, manual: bool) -> DelayOutcome {
        let source = if manual {
            DelaySource::Manual
        } else {
            DelaySource::Automatic
        };

        if !manual {
            if let Some(outcome) = self.check_automatic(slot_id, driver_tag) {
                return outcome;
            }
        }

        let now = self.clock.now();
        let marker = DelayMarker {
            slot_id: slot_id.to_string(),
            driver_tag: driver_tag.to_string(),
            raised_at: now,
            source,
        };

        if manual {
            write_json(self.store.as_ref(), &keys::manual_delay(slot_id), &marker);
        }

        // A response to an earlier delay does not answer this one
        remove_key(self.store.as_ref(), &keys::delay_responded(slot_id));

        let message = match source {
            DelaySource::Automatic => format!("Driver {driver_tag} is late for slot {slot_id}"),
            DelaySource::Manual => format!("Driver {driver_tag} flagged late for slot {slot_id}"),
        };
        let notification = self.bus.publish(
            NotificationType::DriverDelay,
            message.clone(),
            Some(slot_id),
            Some(driver_tag),
        );

        self.hub.emit(Signal::DelayRaised {
            slot_id: slot_id.to_string(),
            driver_tag: driver_tag.to_string(),
            source,
        });
        self.hub.emit(match source {
            DelaySource::Automatic => Signal::AutomaticDelayRaised {
                slot_id: slot_id.to_string(),
                driver_tag: driver_tag.to_string(),
            },
            DelaySource::Manual => Signal::ManualDelayRaised {
                slot_id: slot_id.to_string(),
                driver_tag: driver_tag.to_string(),
            },
        });

        self.alerts.set_delay_alert(&marker);
        self.alerts.raise_admin_alert(
            slot_id,
            Some(driver_tag),
            NotificationType::DriverDelay,
            message,
        );

        self.cues.dispatch(match source {
            DelaySource::Automatic => AudioCue::DriverDelay,
            DelaySource::Manual => AudioCue::ManualDelay,
        });

        write_json(
            self.store.as_ref(),
            &keys::delay_notified(slot_id, driver_tag),
            &marker,
        );

        info!(
            slot_id,
            driver_tag,
            source = %source,
            notification_id = %notification.id,
            "Delay raised"
        );
        DelayOutcome::Raised(notification)
    }

    /// Apply the grace period and suppression gates. `None` means proceed.
    fn check_automatic(&self, slot_id: &str, driver_tag: &str) -> Option<DelayOutcome> {
        let now = self.clock.now();

        let Some(called_at) = self.registry.get(slot_id, TimeEventKind::Called) else {
            debug!(slot_id, driver_tag, "Slot not called, delay ignored");
            return Some(DelayOutcome::NotCalled);
        };

        if self.registry.has(slot_id, TimeEventKind::Loading)
            || self.registry.has(slot_id, TimeEventKind::Finalized)
        {
            debug!(slot_id, driver_tag, "Driver already at the slot, delay ignored");
            return Some(DelayOutcome::Arrived);
        }

        let grace_ends = later_by(called_at, self.grace_period);
        if now < grace_ends {
            let remaining = (grace_ends - now).to_std().unwrap_or_default();
            debug!(
                slot_id,
                driver_tag,
                remaining_secs = remaining.as_secs(),
                "Within grace period, delay ignored"
            );
            return Some(DelayOutcome::GracePeriod { remaining });
        }

        let last: Option<DelayMarker> = read_json(
            self.store.as_ref(),
            &keys::delay_notified(slot_id, driver_tag),
        );
        if let Some(last) = last {
            let quiet_until = later_by(last.raised_at, self.auto_suppression);
            if now < quiet_until {
                let remaining = (quiet_until - now).to_std().unwrap_or_default();
                debug!(
                    slot_id,
                    driver_tag,
                    remaining_secs = remaining.as_secs(),
                    "Delay recently notified, suppressed"
                );
                return Some(DelayOutcome::Suppressed { remaining });
            }
        }

        None
    }

    /// Manual-delay marker for a slot
    pub fn manual_delay(&self, slot_id: &str) -> Option<DelayMarker> {
        read_json(self.store.as_ref(), &keys::manual_delay(slot_id))
    }

    /// Last delay marker raised for a (slot, driver) pair
    pub fn last_notified(&self, slot_id: &str, driver_tag: &str) -> Option<DelayMarker> {
        read_json(
            self.store.as_ref(),
            &keys::delay_notified(slot_id, driver_tag),
        )
    }
}
