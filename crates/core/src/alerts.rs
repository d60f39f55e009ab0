// Alert Lifecycle Manager
//
// Owns the per-slot alert key families and retracts all of them when a slot's
// state is superseded (new call, finalize, reset).
//
// Clearing is a cascade of independent removals, not a transaction. A step that
// fails is logged and recorded in the ClearReport, and the remaining steps still
// run: a partially cleared slot is better than one whose alerts can never be
// retracted. After the cascade, an AlertsCleared signal is emitted and the global
// last-clear marker is written so contexts that miss the signal can still notice.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::keys;
use crate::model::{ClearMarker, DelayMarker, NotificationType, SlotAlert};
use crate::notifications::NotificationBus;
use crate::signals::{Signal, SignalHub};
use crate::store::typed::{exists, read_json, read_list, write_json};
use crate::store::SharedStore;

/// One removal step of the clear cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearStep {
    SlotAlerts,
    AdminAlerts,
    DelayAlert,
    ManualDelay,
    DelayNotified,
    Notifications,
}

/// Outcome of clearing one slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearReport {
    pub slot_id: String,
    /// Notifications removed from the global list
    pub notifications_removed: usize,
    /// Steps that failed and may have left records behind
    pub failed: Vec<ClearStep>,
}

impl ClearReport {
    /// Whether every step succeeded
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct AlertManager {
    store: Arc<dyn SharedStore>,
    hub: Arc<SignalHub>,
    bus: Arc<NotificationBus>,
    clock: Arc<dyn Clock>,
}

impl AlertManager {
    pub fn new(
        store: Arc<dyn SharedStore>,
        hub: Arc<SignalHub>,
        bus: Arc<NotificationBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            hub,
            bus,
            clock,
        }
    }

    // ========================================================================
    // Clearing
    // ========================================================================

    /// Retract every alert for a slot.
    #[instrument(skip(self))]
    pub fn clear_for_slot(&self, slot_id: &str, source: &str) -> ClearReport {
        let report = self.clear_quietly(slot_id);
        self.hub.emit(Signal::AlertsCleared {
            slot_id: slot_id.to_string(),
            source: source.to_string(),
        });
        self.write_last_clear(vec![slot_id.to_string()], source);

        if report.is_complete() {
            info!(slot_id, source, "Slot alerts cleared");
        } else {
            warn!(slot_id, source, failed = ?report.failed, "Slot alerts partially cleared");
        }
        report
    }

    /// Retract every alert for several slots, then announce the batch.
    pub fn clear_for_slots<S: AsRef<str>>(&self, slot_ids: &[S], source: &str) -> Vec<ClearReport> {
        let reports: Vec<ClearReport> = slot_ids
            .iter()
            .map(|id| self.clear_for_slot(id.as_ref(), source))
            .collect();

        let slot_ids: Vec<String> = slot_ids.iter().map(|id| id.as_ref().to_string()).collect();
        let count = slot_ids.len();
        self.hub.emit(Signal::AlertsClearedBatch {
            slot_ids: slot_ids.clone(),
            count,
            source: source.to_string(),
        });
        self.write_last_clear(slot_ids, source);
        info!(count, source, "Batch alert clear finished");

        reports
    }

    fn clear_quietly(&self, slot_id: &str) -> ClearReport {
        let mut report = ClearReport {
            slot_id: slot_id.to_string(),
            notifications_removed: 0,
            failed: Vec::new(),
        };

        let steps = [
            (ClearStep::SlotAlerts, keys::slot_alerts(slot_id)),
            (ClearStep::AdminAlerts, keys::admin_alerts(slot_id)),
            (ClearStep::DelayAlert, keys::delay_alert(slot_id)),
            (ClearStep::ManualDelay, keys::manual_delay(slot_id)),
        ];
        for (step, key) in steps {
            if let Err(e) = self.store.remove(&key) {
                error!(slot_id, key = %key, ?step, error = %e, "Alert clear step failed");
                report.failed.push(step);
            }
        }

        if !self.clear_delay_notified(slot_id) {
            report.failed.push(ClearStep::DelayNotified);
        }

        match self.bus.try_clear_for_slot(slot_id, None) {
            Ok(removed) => report.notifications_removed = removed,
            Err(e) => {
                error!(slot_id, error = %e, "Alert clear step failed: notifications");
                report.failed.push(ClearStep::Notifications);
            }
        }

        report
    }

    fn clear_delay_notified(&self, slot_id: &str) -> bool {
        let keys = match self.store.keys_with_prefix(&keys::delay_notified_prefix(slot_id)) {
            Ok(keys) => keys,
            Err(e) => {
                error!(slot_id, error = %e, "Failed to list delay markers");
                return false;
            }
        };

        let mut ok = true;
        for key in keys {
            if let Err(e) = self.store.remove(&key) {
                error!(slot_id, key = %key, error = %e, "Failed to remove delay marker");
                ok = false;
            }
        }
        ok
    }

    fn write_last_clear(&self, slot_ids: Vec<String>, source: &str) {
        let marker = ClearMarker {
            slot_ids,
            source: source.to_string(),
            cleared_at: self.clock.now(),
            context_id: self.hub.context_id(),
        };
        write_json(self.store.as_ref(), keys::LAST_CLEAR, &marker);
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Whether the slot has any direct alert, admin alert or delay alert.
    pub fn has_active_alerts(&self, slot_id: &str) -> bool {
        !self.slot_alerts(slot_id).is_empty()
            || !self.admin_alerts(slot_id).is_empty()
            || exists(self.store.as_ref(), &keys::delay_alert(slot_id))
    }

    pub fn slot_alerts(&self, slot_id: &str) -> Vec<SlotAlert> {
        read_list(self.store.as_ref(), &keys::slot_alerts(slot_id))
    }

    pub fn admin_alerts(&self, slot_id: &str) -> Vec<SlotAlert> {
        read_list(self.store.as_ref(), &keys::admin_alerts(slot_id))
    }

    /// Active delay alert for the slot
    pub fn delay_alert(&self, slot_id: &str) -> Option<DelayMarker> {
        read_json(self.store.as_ref(), &keys::delay_alert(slot_id))
    }

    /// Most recent clear performed by any context
    pub fn last_clear(&self) -> Option<ClearMarker> {
        read_json(self.store.as_ref(), keys::LAST_CLEAR)
    }

    /// Whether any context cleared `slot_id` after `since`.
    ///
    /// Only the latest clear is remembered, so this is a recovery hint for a
    /// context that may have missed an `AlertsCleared` signal.
    pub fn cleared_since(&self, slot_id: &str, since: DateTime<Utc>) -> bool {
        self.last_clear()
            .map(|m| m.cleared_at > since && m.slot_ids.iter().any(|id| id == slot_id))
            .unwrap_or(false)
    }

    // ========================================================================
    // Raising
    // ========================================================================

    /// Append a direct (operator-facing) alert for a slot
    pub fn raise_slot_alert(
        &self,
        slot_id: &str,
        driver_tag: Option<&str>,
        kind: NotificationType,
        message: impl Into<String>,
    ) -> SlotAlert {
        self.append(keys::slot_alerts(slot_id), slot_id, driver_tag, kind, message)
    }

    /// Append an admin-facing alert for a slot
    pub fn raise_admin_alert(
        &self,
        slot_id: &str,
        driver_tag: Option<&str>,
        kind: NotificationType,
        message: impl Into<String>,
    ) -> SlotAlert {
        self.append(keys::admin_alerts(slot_id), slot_id, driver_tag, kind, message)
    }

    /// Mark the slot as having an active delay alert
    pub fn set_delay_alert(&self, marker: &DelayMarker) -> bool {
        write_json(self.store.as_ref(), &keys::delay_alert(&marker.slot_id), marker)
    }

    fn append(
        &self,
        key: String,
        slot_id: &str,
        driver_tag: Option<&str>,
        kind: NotificationType,
        message: impl Into<String>,
    ) -> SlotAlert {
        let alert = SlotAlert {
            id: Uuid::now_v7().to_string(),
            slot_id: slot_id.to_string(),
            driver_tag: driver_tag.map(str::to_string),
            kind,
            message: message.into(),
            raised_at: self.clock.now(),
        };

        let mut alerts: Vec<SlotAlert> = read_list(self.store.as_ref(), &key);
        alerts.push(alert.clone());
        write_json(self.store.as_ref(), &key, &alerts);
        alert
    }
}
