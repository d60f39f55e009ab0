// Driver responses to a call
//
// A driver answers a call from the yard terminal by confirming or declining
// entry. Declining also raises a direct alert on the slot so the operator
// console keeps showing it until the slot is called again or reset.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::alerts::AlertManager;
use crate::clock::Clock;
use crate::keys;
use crate::model::{Notification, NotificationType, ResponseMarker};
use crate::notifications::NotificationBus;
use crate::store::typed::{exists, read_json, write_json};
use crate::store::SharedStore;

pub struct DriverResponses {
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    bus: Arc<NotificationBus>,
    alerts: Arc<AlertManager>,
}

impl DriverResponses {
    pub fn new(
        store: Arc<dyn SharedStore>,
        clock: Arc<dyn Clock>,
        bus: Arc<NotificationBus>,
        alerts: Arc<AlertManager>,
    ) -> Self {
        Self {
            store,
            clock,
            bus,
            alerts,
        }
    }

    /// The driver is on the way in.
    #[instrument(skip(self))]
    pub fn confirm_entry(&self, slot_id: &str, driver_tag: &str) -> Notification {
        self.mark_responded(slot_id, driver_tag);
        info!(slot_id, driver_tag, "Driver confirmed entry");
        self.bus.publish(
            NotificationType::DriverEnterConfirmation,
            format!("Driver {driver_tag} confirmed entry to slot {slot_id}"),
            Some(slot_id),
            Some(driver_tag),
        )
    }

    /// The driver will not enter the slot.
    #[instrument(skip(self))]
    pub fn decline_entry(&self, slot_id: &str, driver_tag: &str) -> Notification {
        self.mark_responded(slot_id, driver_tag);
        let message = format!("Driver {driver_tag} will not enter slot {slot_id}");

        self.alerts.raise_slot_alert(
            slot_id,
            Some(driver_tag),
            NotificationType::DriverWontEnter,
            message.clone(),
        );
        info!(slot_id, driver_tag, "Driver declined entry");
        self.bus.publish(
            NotificationType::DriverWontEnter,
            message,
            Some(slot_id),
            Some(driver_tag),
        )
    }

    /// Response recorded for the slot's current delay, if any
    pub fn delay_response(&self, slot_id: &str) -> Option<ResponseMarker> {
        read_json(self.store.as_ref(), &keys::delay_responded(slot_id))
    }

    // Only a response to an outstanding delay is worth remembering
    fn mark_responded(&self, slot_id: &str, driver_tag: &str) {
        let delayed = exists(self.store.as_ref(), &keys::delay_alert(slot_id))
            || exists(self.store.as_ref(), &keys::manual_delay(slot_id));
        if !delayed {
            return;
        }

        let marker = ResponseMarker {
            slot_id: slot_id.to_string(),
            driver_tag: driver_tag.to_string(),
            responded_at: self.clock.now(),
        };
        write_json(self.store.as_ref(), &keys::delay_responded(slot_id), &marker);
    }
}
