// Engine
//
// One Engine is one execution context (an operator console, the driver
// terminal, an admin dashboard). It owns its signal hub and every component,
// all sharing the same store handle. Several engines built on one store form a
// single synchronized yard.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::alerts::AlertManager;
use crate::audio::{CueDispatcher, CuePlayer, LogCuePlayer};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::delay::DelayDetector;
use crate::driver_responses::DriverResponses;
use crate::monitor::DelayMonitor;
use crate::notifications::NotificationBus;
use crate::relay::SignalRelay;
use crate::signals::{SignalHub, Subscription, Topic};
use crate::slots::SlotMachine;
use crate::store::SharedStore;
use crate::time_events::TimeEventRegistry;

pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn SharedStore>,
    hub: Arc<SignalHub>,
    registry: Arc<TimeEventRegistry>,
    bus: Arc<NotificationBus>,
    alerts: Arc<AlertManager>,
    detector: Arc<DelayDetector>,
    slots: Arc<SlotMachine>,
    responses: Arc<DriverResponses>,
}

impl Engine {
    /// Start building an engine on top of a shared store
    pub fn builder(store: Arc<dyn SharedStore>) -> EngineBuilder {
        EngineBuilder::new(store)
    }

    pub fn context_id(&self) -> Uuid {
        self.hub.context_id()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }

    pub fn hub(&self) -> &Arc<SignalHub> {
        &self.hub
    }

    pub fn time_events(&self) -> &TimeEventRegistry {
        &self.registry
    }

    pub fn notifications(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    pub fn delays(&self) -> &DelayDetector {
        &self.detector
    }

    pub fn slots(&self) -> &SlotMachine {
        &self.slots
    }

    pub fn driver_responses(&self) -> &DriverResponses {
        &self.responses
    }

    /// Subscribe to a signal topic on this context's hub
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.hub.subscribe(topic)
    }

    /// Relay that delivers other contexts' signals to this context
    pub fn relay(&self) -> SignalRelay {
        SignalRelay::new(self.hub.clone(), self.store.clone())
    }

    /// Background delay scanner for this context
    pub fn delay_monitor(&self) -> DelayMonitor {
        DelayMonitor::new(
            self.slots.clone(),
            self.detector.clone(),
            self.config.monitor_interval,
        )
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("context_id", &self.hub.context_id())
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for an [`Engine`]
pub struct EngineBuilder {
    store: Arc<dyn SharedStore>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    cue_player: Arc<dyn CuePlayer>,
    context_id: Option<Uuid>,
}

impl EngineBuilder {
    /// Create a builder with default configuration and the system clock
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            cue_player: Arc::new(LogCuePlayer),
            context_id: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a different time source (tests pass a `ManualClock`)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cue_player(mut self, player: Arc<dyn CuePlayer>) -> Self {
        self.cue_player = player;
        self
    }

    /// Fix the context id (a fresh UUID v7 otherwise)
    pub fn with_context_id(mut self, context_id: Uuid) -> Self {
        self.context_id = Some(context_id);
        self
    }

    /// Build the engine
    pub fn build(self) -> Engine {
        let Self {
            store,
            config,
            clock,
            cue_player,
            context_id,
        } = self;
        let context_id = context_id.unwrap_or_else(Uuid::now_v7);

        let hub = Arc::new(
            SignalHub::new(context_id, config.signal_capacity, clock.clone())
                .with_store(store.clone()),
        );
        let registry = Arc::new(TimeEventRegistry::new(
            store.clone(),
            hub.clone(),
            clock.clone(),
            config.stale_after,
        ));
        let bus = Arc::new(NotificationBus::new(
            store.clone(),
            hub.clone(),
            clock.clone(),
            config.dedup_window,
            config.max_notifications,
        ));
        let alerts = Arc::new(AlertManager::new(
            store.clone(),
            hub.clone(),
            bus.clone(),
            clock.clone(),
        ));
        let detector = Arc::new(DelayDetector::new(
            store.clone(),
            hub.clone(),
            clock.clone(),
            registry.clone(),
            bus.clone(),
            alerts.clone(),
            CueDispatcher::new(cue_player, config.audio_enabled),
            config.grace_period,
            config.auto_suppression,
        ));
        let slots = Arc::new(SlotMachine::new(
            store.clone(),
            hub.clone(),
            clock.clone(),
            registry.clone(),
            bus.clone(),
            alerts.clone(),
        ));
        let responses = Arc::new(DriverResponses::new(
            store.clone(),
            clock,
            bus.clone(),
            alerts.clone(),
        ));

        info!(context_id = %context_id, "Engine built");

        Engine {
            config,
            store,
            hub,
            registry,
            bus,
            alerts,
            detector,
            slots,
            responses,
        }
    }
}
