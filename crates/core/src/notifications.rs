// Notification Bus
//
// The single path through which alert-worthy events become visible
// notifications. The list is stored newest-first under one global key and
// bounded to `max_notifications` entries.
//
// Dedup: a publish whose (type, slot_id, driver_tag) matches an unread
// notification younger than `dedup_window` returns that notification instead of
// creating a new one. Acknowledgment deletes the record.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, instrument};

use crate::clock::{within, Clock};
use crate::keys;
use crate::model::{Notification, NotificationType};
use crate::signals::{Signal, SignalHub};
use crate::store::typed::{read_list, write_json};
use crate::store::{SharedStore, StoreError};

pub struct NotificationBus {
    store: Arc<dyn SharedStore>,
    hub: Arc<SignalHub>,
    clock: Arc<dyn Clock>,
    dedup_window: Duration,
    max_notifications: usize,
    // Serializes read-modify-write of the list within this context
    write_lock: Mutex<()>,
}

impl NotificationBus {
    pub fn new(
        store: Arc<dyn SharedStore>,
        hub: Arc<SignalHub>,
        clock: Arc<dyn Clock>,
        dedup_window: Duration,
        max_notifications: usize,
    ) -> Self {
        Self {
            store,
            hub,
            clock,
            dedup_window,
            max_notifications: max_notifications.max(1),
            write_lock: Mutex::new(()),
        }
    }

    /// Publish a notification, or return the live duplicate if one exists.
    #[instrument(skip(self, message))]
    pub fn publish(
        &self,
        kind: NotificationType,
        message: impl Into<String>,
        slot_id: Option<&str>,
        driver_tag: Option<&str>,
    ) -> Notification {
        let _guard = self.write_lock.lock();
        let now = self.clock.now();
        let mut list = self.load();

        if let Some(existing) = list.iter().find(|n| {
            !n.read
                && n.has_dedup_key(kind, slot_id, driver_tag)
                && within(now, n.created_at, self.dedup_window)
        }) {
            debug!(
                notification_id = %existing.id,
                ?slot_id,
                ?driver_tag,
                "Duplicate notification suppressed"
            );
            return existing.clone();
        }

        let notification = Notification::new(kind, message, slot_id, driver_tag, now);
        list.insert(0, notification.clone());
        if list.len() > self.max_notifications {
            let evicted = list.len() - self.max_notifications;
            list.truncate(self.max_notifications);
            debug!(evicted, "Oldest notifications evicted");
        }

        if !self.persist(&list) {
            // Nothing was stored, so nothing is announced
            return notification;
        }

        info!(
            notification_id = %notification.id,
            ?slot_id,
            ?driver_tag,
            "Notification published"
        );
        self.hub.emit(Signal::NotificationCreated {
            notification: notification.clone(),
        });
        notification
    }

    /// Acknowledge (delete) a notification. Returns whether it existed.
    pub fn acknowledge(&self, id: &str) -> bool {
        let _guard = self.write_lock.lock();
        let mut list = self.load();
        let before = list.len();
        list.retain(|n| n.id != id);

        if list.len() == before {
            debug!(notification_id = id, "Acknowledged notification not found");
            return false;
        }

        if self.persist(&list) {
            debug!(notification_id = id, "Notification acknowledged");
            self.hub.emit(Signal::NotificationsUpdated { removed: 1 });
            true
        } else {
            false
        }
    }

    /// Remove every notification.
    pub fn clear_all(&self) {
        let _guard = self.write_lock.lock();
        let removed = self.load().len();
        if self.persist(&[]) {
            info!(removed, "All notifications cleared");
            self.hub.emit(Signal::NotificationsUpdated { removed });
        }
    }

    /// Remove notifications for a slot, optionally restricted to some types.
    /// Returns the number removed.
    pub fn clear_for_slot(&self, slot_id: &str, types: Option<&[NotificationType]>) -> usize {
        match self.try_clear_for_slot(slot_id, types) {
            Ok(removed) => removed,
            Err(e) => {
                error!(slot_id, error = %e, "Failed to clear slot notifications");
                0
            }
        }
    }

    /// Like `clear_for_slot`, but reports a failed write to the caller.
    pub(crate) fn try_clear_for_slot(
        &self,
        slot_id: &str,
        types: Option<&[NotificationType]>,
    ) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock();
        let mut list = self.load();
        let before = list.len();
        list.retain(|n| {
            let slot_matches = n.slot_id.as_deref() == Some(slot_id);
            let type_matches = types.map_or(true, |types| types.contains(&n.kind));
            !(slot_matches && type_matches)
        });

        let removed = before - list.len();
        if removed == 0 {
            return Ok(0);
        }

        let raw = serde_json::to_string(&list).map_err(|e| StoreError::Serialization {
            key: keys::NOTIFICATIONS.to_string(),
            reason: e.to_string(),
        })?;
        self.store.set(keys::NOTIFICATIONS, raw)?;

        debug!(slot_id, removed, "Slot notifications cleared");
        self.hub.emit(Signal::NotificationsUpdated { removed });
        Ok(removed)
    }

    /// Current notifications, newest first
    pub fn list(&self) -> Vec<Notification> {
        self.load()
    }

    /// Notifications referring to a slot
    pub fn for_slot(&self, slot_id: &str) -> Vec<Notification> {
        self.load()
            .into_iter()
            .filter(|n| n.slot_id.as_deref() == Some(slot_id))
            .collect()
    }

    pub fn unread_count(&self) -> usize {
        self.load().iter().filter(|n| !n.read).count()
    }

    fn load(&self) -> Vec<Notification> {
        read_list(self.store.as_ref(), keys::NOTIFICATIONS)
    }

    fn persist(&self, list: &[Notification]) -> bool {
        write_json(self.store.as_ref(), keys::NOTIFICATIONS, list)
    }
}
