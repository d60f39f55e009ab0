// Slot State Machine
//
// The only entry points that change a slot's status. Valid paths:
//
//   open ──call──▶ called ──begin_loading──▶ loading ──finalize──▶ finalized
//                    ▲ │
//                    └─┘ call (re-call a driver who has not arrived)
//
// `reset` returns any slot to open. Guards always read the persisted slot, so a
// transition made by another context is respected.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use crate::alerts::AlertManager;
use crate::clock::Clock;
use crate::error::{Result, SlotAction, TransitionError};
use crate::keys;
use crate::model::{NotificationType, Slot, SlotStatus, TimeEventKind};
use crate::notifications::NotificationBus;
use crate::signals::{Signal, SignalHub};
use crate::store::typed::{exists, read_json, read_list, remove_key, write_json};
use crate::store::SharedStore;
use crate::time_events::{EventScope, TimeEventRegistry};

pub struct SlotMachine {
    store: Arc<dyn SharedStore>,
    hub: Arc<SignalHub>,
    clock: Arc<dyn Clock>,
    registry: Arc<TimeEventRegistry>,
    bus: Arc<NotificationBus>,
    alerts: Arc<AlertManager>,
    // Serializes guard-then-write within this context
    transition_lock: Mutex<()>,
}

impl SlotMachine {
    pub fn new(
        store: Arc<dyn SharedStore>,
        hub: Arc<SignalHub>,
        clock: Arc<dyn Clock>,
        registry: Arc<TimeEventRegistry>,
        bus: Arc<NotificationBus>,
        alerts: Arc<AlertManager>,
    ) -> Self {
        Self {
            store,
            hub,
            clock,
            registry,
            bus,
            alerts,
            transition_lock: Mutex::new(()),
        }
    }

    /// Current persisted state of a slot. Unknown slots are open.
    pub fn get(&self, slot_id: &str) -> Slot {
        read_json(self.store.as_ref(), &keys::slot(slot_id)).unwrap_or_else(|| Slot::open(slot_id))
    }

    /// Every slot that has been persisted at least once
    pub fn slots(&self) -> Vec<Slot> {
        let ids: Vec<String> = read_list(self.store.as_ref(), keys::SLOT_INDEX);
        ids.iter().map(|id| self.get(id)).collect()
    }

    /// Slots currently waiting for their driver
    pub fn called_slots(&self) -> Vec<Slot> {
        self.slots()
            .into_iter()
            .filter(|s| s.status == SlotStatus::Called)
            .collect()
    }

    /// Call a driver to a slot.
    ///
    /// Alerts from the previous cycle are cleared first. The call is announced
    /// as `delayed_driver_called` when the slot was carrying a delay.
    #[instrument(skip(self))]
    pub fn call(&self, slot_id: &str, driver_tag: &str, source: &str) -> Result<Slot> {
        let _guard = self.transition_lock.lock();
        let current = self.get(slot_id);
        if !matches!(current.status, SlotStatus::Open | SlotStatus::Called) {
            return Err(self.reject(&current, SlotAction::Call));
        }

        let was_delayed = exists(self.store.as_ref(), &keys::delay_alert(slot_id))
            || exists(self.store.as_ref(), &keys::manual_delay(slot_id));

        self.alerts.clear_for_slot(slot_id, source);
        remove_key(self.store.as_ref(), &keys::delay_responded(slot_id));

        let called_at = self
            .registry
            .record(slot_id, driver_tag, TimeEventKind::Called, source);
        let next = Slot {
            id: slot_id.to_string(),
            status: SlotStatus::Called,
            current_driver_tag: Some(driver_tag.to_string()),
            called_at: Some(called_at),
            last_transition_at: Some(called_at),
        };
        self.commit(&current, &next, source);

        let (kind, message) = if was_delayed {
            (
                NotificationType::DelayedDriverCalled,
                format!("Delayed driver {driver_tag} called again to slot {slot_id}"),
            )
        } else {
            (
                NotificationType::AnalystCall,
                format!("Driver {driver_tag} called to slot {slot_id}"),
            )
        };
        self.bus
            .publish(kind, message, Some(slot_id), Some(driver_tag));

        Ok(next)
    }

    /// The called driver arrived and loading starts.
    #[instrument(skip(self))]
    pub fn begin_loading(&self, slot_id: &str, source: &str) -> Result<Slot> {
        let _guard = self.transition_lock.lock();
        let current = self.get(slot_id);
        if current.status != SlotStatus::Called {
            return Err(self.reject(&current, SlotAction::BeginLoading));
        }

        let driver_tag = current.current_driver_tag.clone().unwrap_or_default();
        let at = self
            .registry
            .record(slot_id, &driver_tag, TimeEventKind::Loading, source);
        let next = Slot {
            status: SlotStatus::Loading,
            last_transition_at: Some(at),
            ..current.clone()
        };
        self.commit(&current, &next, source);
        Ok(next)
    }

    /// Loading finished. Any alert still open for the slot is retracted.
    #[instrument(skip(self))]
    pub fn finalize(&self, slot_id: &str, source: &str) -> Result<Slot> {
        let _guard = self.transition_lock.lock();
        let current = self.get(slot_id);
        if current.status != SlotStatus::Loading {
            return Err(self.reject(&current, SlotAction::Finalize));
        }

        let driver_tag = current.current_driver_tag.clone().unwrap_or_default();
        let at = self
            .registry
            .record(slot_id, &driver_tag, TimeEventKind::Finalized, source);
        self.alerts.clear_for_slot(slot_id, source);

        let next = Slot {
            status: SlotStatus::Finalized,
            last_transition_at: Some(at),
            ..current.clone()
        };
        self.commit(&current, &next, source);
        Ok(next)
    }

    /// Return a slot to open from any state, dropping its timers and alerts.
    #[instrument(skip(self))]
    pub fn reset(&self, slot_id: &str, source: &str) -> Slot {
        let _guard = self.transition_lock.lock();
        let current = self.get(slot_id);

        self.registry.clear(slot_id, EventScope::All);
        self.alerts.clear_for_slot(slot_id, source);
        remove_key(self.store.as_ref(), &keys::delay_responded(slot_id));

        let next = Slot {
            last_transition_at: Some(self.clock.now()),
            ..Slot::open(slot_id)
        };
        self.commit(&current, &next, source);
        next
    }

    fn reject(&self, current: &Slot, action: SlotAction) -> TransitionError {
        warn!(
            slot_id = %current.id,
            status = %current.status,
            %action,
            "Slot transition rejected"
        );
        TransitionError::invalid(current.id.clone(), current.status, action)
    }

    fn commit(&self, from: &Slot, to: &Slot, source: &str) {
        write_json(self.store.as_ref(), &keys::slot(&to.id), to);
        self.index(&to.id);

        info!(
            slot_id = %to.id,
            from = %from.status,
            to = %to.status,
            source,
            "Slot transitioned"
        );
        self.hub.emit(Signal::SlotTransitioned {
            slot_id: to.id.clone(),
            from: from.status,
            to: to.status,
            source: source.to_string(),
        });
    }

    fn index(&self, slot_id: &str) {
        let mut ids: Vec<String> = read_list(self.store.as_ref(), keys::SLOT_INDEX);
        if !ids.iter().any(|id| id == slot_id) {
            ids.push(slot_id.to_string());
            write_json(self.store.as_ref(), keys::SLOT_INDEX, &ids);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{DelayMarker, DelaySource};
    use crate::signals::Topic;
    use crate::store::faulty::FaultyStore;
    use crate::store::InMemorySharedStore;
    use std::time::Duration;
    use uuid::Uuid;

    struct Fixture {
        clock: ManualClock,
        store: Arc<dyn SharedStore>,
        hub: Arc<SignalHub>,
        registry: Arc<TimeEventRegistry>,
        bus: Arc<NotificationBus>,
        alerts: Arc<AlertManager>,
        slots: SlotMachine,
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(InMemorySharedStore::new()))
    }

    fn fixture_with(store: Arc<dyn SharedStore>) -> Fixture {
        let clock = ManualClock::starting_now();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let hub = Arc::new(SignalHub::new(Uuid::now_v7(), 64, shared_clock.clone()));
        let registry = Arc::new(TimeEventRegistry::new(
            store.clone(),
            hub.clone(),
            shared_clock.clone(),
            Duration::from_secs(24 * 60 * 60),
        ));
        let bus = Arc::new(NotificationBus::new(
            store.clone(),
            hub.clone(),
            shared_clock.clone(),
            Duration::from_secs(30),
            50,
        ));
        let alerts = Arc::new(AlertManager::new(
            store.clone(),
            hub.clone(),
            bus.clone(),
            shared_clock.clone(),
        ));
        let slots = SlotMachine::new(
            store.clone(),
            hub.clone(),
            shared_clock,
            registry.clone(),
            bus.clone(),
            alerts.clone(),
        );
        Fixture {
            clock,
            store,
            hub,
            registry,
            bus,
            alerts,
            slots,
        }
    }

    #[test]
    fn test_unknown_slot_is_open() {
        let f = fixture();
        assert_eq!(f.slots.get("D-04").status, SlotStatus::Open);
        assert!(f.slots.slots().is_empty());
    }

    #[test]
    fn test_full_lifecycle() {
        let f = fixture();
        let mut sub = f.hub.subscribe(Topic::Slots);

        let called = f.slots.call("D-04", "TRK-7", "desk").unwrap();
        assert_eq!(called.status, SlotStatus::Called);
        assert_eq!(called.current_driver_tag.as_deref(), Some("TRK-7"));
        assert!(f.registry.has("D-04", TimeEventKind::Called));

        f.clock.advance(Duration::from_secs(60));
        let loading = f.slots.begin_loading("D-04", "desk").unwrap();
        assert_eq!(loading.status, SlotStatus::Loading);
        assert_eq!(loading.called_at, called.called_at);

        f.clock.advance(Duration::from_secs(600));
        let done = f.slots.finalize("D-04", "desk").unwrap();
        assert_eq!(done.status, SlotStatus::Finalized);
        assert!(f.registry.has("D-04", TimeEventKind::Finalized));
        assert_eq!(f.registry.elapsed("D-04", TimeEventKind::Loading), "10:00");

        let transitions: Vec<(SlotStatus, SlotStatus)> = sub
            .drain()
            .into_iter()
            .filter_map(|e| match e.signal {
                Signal::SlotTransitioned { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect();
        assert_eq!(
            transitions,
            vec![
                (SlotStatus::Open, SlotStatus::Called),
                (SlotStatus::Called, SlotStatus::Loading),
                (SlotStatus::Loading, SlotStatus::Finalized),
            ]
        );
        assert_eq!(f.slots.slots().len(), 1);
    }

    #[test]
    fn test_finalize_open_slot_is_rejected() {
        let f = fixture();
        let err = f.slots.finalize("D-04", "desk").unwrap_err();

        assert_eq!(
            err,
            TransitionError::invalid("D-04", SlotStatus::Open, SlotAction::Finalize)
        );
        assert_eq!(f.slots.get("D-04").status, SlotStatus::Open);
        assert!(!f.registry.has("D-04", TimeEventKind::Finalized));
    }

    #[test]
    fn test_guards_reject_out_of_order_actions() {
        let f = fixture();
        assert!(f.slots.begin_loading("D-04", "desk").is_err());

        f.slots.call("D-04", "TRK-7", "desk").unwrap();
        assert!(f.slots.finalize("D-04", "desk").is_err());

        f.slots.begin_loading("D-04", "desk").unwrap();
        assert!(matches!(
            f.slots.call("D-04", "TRK-8", "desk"),
            Err(TransitionError::InvalidTransition {
                from: SlotStatus::Loading,
                action: SlotAction::Call,
                ..
            })
        ));
        assert_eq!(f.slots.get("D-04").current_driver_tag.as_deref(), Some("TRK-7"));
    }

    #[test]
    fn test_guard_reads_persisted_state() {
        let f = fixture();
        f.slots.call("D-04", "TRK-7", "desk").unwrap();

        // Another context moved the slot on
        let mut slot = f.slots.get("D-04");
        slot.status = SlotStatus::Loading;
        write_json(f.store.as_ref(), &keys::slot("D-04"), &slot);

        assert!(f.slots.begin_loading("D-04", "desk").is_err());
        assert!(f.slots.finalize("D-04", "desk").is_ok());
    }

    #[test]
    fn test_call_publishes_analyst_call() {
        let f = fixture();
        f.slots.call("D-04", "TRK-7", "desk").unwrap();

        let list = f.bus.for_slot("D-04");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].kind, NotificationType::AnalystCall);
    }

    #[test]
    fn test_recall_clears_prior_alerts_and_flags_delay() {
        let f = fixture();
        f.slots.call("D-04", "TRK-7", "desk").unwrap();
        f.alerts.set_delay_alert(&DelayMarker {
            slot_id: "D-04".to_string(),
            driver_tag: "TRK-7".to_string(),
            raised_at: f.clock.now(),
            source: DelaySource::Automatic,
        });
        f.alerts
            .raise_admin_alert("D-04", Some("TRK-7"), NotificationType::DriverDelay, "late");
        f.bus.publish(
            NotificationType::DriverDelay,
            "late",
            Some("D-04"),
            Some("TRK-7"),
        );

        f.clock.advance(Duration::from_secs(200));
        f.slots.call("D-04", "TRK-7", "desk").unwrap();

        assert!(!f.alerts.has_active_alerts("D-04"));
        let list = f.bus.for_slot("D-04");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].kind, NotificationType::DelayedDriverCalled);
        assert_eq!(
            f.registry.get("D-04", TimeEventKind::Called),
            Some(f.clock.now())
        );
    }

    #[test]
    fn test_reset_from_any_state() {
        let f = fixture();
        f.slots.call("D-04", "TRK-7", "desk").unwrap();
        f.slots.begin_loading("D-04", "desk").unwrap();
        f.alerts
            .raise_slot_alert("D-04", None, NotificationType::DriverWontEnter, "no");

        let slot = f.slots.reset("D-04", "supervisor");

        assert_eq!(slot.status, SlotStatus::Open);
        assert!(slot.current_driver_tag.is_none());
        assert_eq!(f.slots.get("D-04"), slot);
        for kind in TimeEventKind::ALL {
            assert!(!f.registry.has("D-04", kind));
        }
        assert!(!f.alerts.has_active_alerts("D-04"));

        // Reset of an untouched slot is allowed too
        assert_eq!(f.slots.reset("D-05", "supervisor").status, SlotStatus::Open);
    }

    #[test]
    fn test_transition_degrades_when_store_rejects_writes() {
        let store = Arc::new(FaultyStore::new());
        let f = fixture_with(store.clone());
        store.fail_set("baysync:");
        let mut sub = f.hub.subscribe(Topic::Slots);

        let called = f.slots.call("D-04", "TRK-7", "desk").unwrap();

        // The caller gets the new state, but nothing was persisted
        assert_eq!(called.status, SlotStatus::Called);
        assert_eq!(f.slots.get("D-04").status, SlotStatus::Open);
        assert!(f.slots.slots().is_empty());
        assert!(f.bus.list().is_empty());
        assert_eq!(sub.drain().len(), 1);

        // Guards read persisted state, so the slot still cannot start loading
        assert!(f.slots.begin_loading("D-04", "desk").is_err());
    }
}
