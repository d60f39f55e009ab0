// Fan-out signals
//
// Every state change the engine makes is announced as a Signal on a Topic.
// Delivery is two-layered:
// - in-process: one tokio broadcast channel per topic, read through a Subscription
// - cross-context: the envelope is appended to a capped per-topic log in the
//   shared store; other contexts pick it up through `SignalRelay`
//
// Signals are hints, not state. Consumers that need correctness re-read the
// store, because a signal can arrive before the writes it announces are visible
// to a slow context.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::keys;
use crate::model::{DelaySource, Notification, SlotStatus, TimeEvent, TimeEventKind};
use crate::store::typed::{read_list, write_json};
use crate::store::SharedStore;

/// Envelopes kept per topic in the shared store log
pub const SIGNAL_LOG_CAPACITY: usize = 32;

// ============================================================================
// Topics and signals
// ============================================================================

/// Subscription topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Notifications,
    Delays,
    Alerts,
    TimeEvents,
    Slots,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Self::Notifications,
        Self::Delays,
        Self::Alerts,
        Self::TimeEvents,
        Self::Slots,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notifications => "notifications",
            Self::Delays => "delays",
            Self::Alerts => "alerts",
            Self::TimeEvents => "time_events",
            Self::Slots => "slots",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change announcement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    // =========================================================================
    // Notifications
    // =========================================================================
    /// A new notification was persisted (carries the full record)
    NotificationCreated { notification: Notification },

    /// Notifications were acknowledged or cleared; re-read the list
    NotificationsUpdated { removed: usize },

    // =========================================================================
    // Delays
    // =========================================================================
    /// A delay was raised, whatever its source
    DelayRaised {
        slot_id: String,
        driver_tag: String,
        source: DelaySource,
    },

    /// A delay was raised by the detector from elapsed time
    AutomaticDelayRaised { slot_id: String, driver_tag: String },

    /// A delay was raised by an operator
    ManualDelayRaised { slot_id: String, driver_tag: String },

    // =========================================================================
    // Alerts
    // =========================================================================
    /// Every alert for a slot was retracted
    AlertsCleared { slot_id: String, source: String },

    /// Several slots were cleared in one batch
    AlertsClearedBatch {
        slot_ids: Vec<String>,
        count: usize,
        source: String,
    },

    // =========================================================================
    // Time events and slots
    // =========================================================================
    TimeEventRecorded { event: TimeEvent },

    /// `kind` is `None` when every kind was cleared
    TimeEventCleared {
        slot_id: String,
        kind: Option<TimeEventKind>,
    },

    SlotTransitioned {
        slot_id: String,
        from: SlotStatus,
        to: SlotStatus,
        source: String,
    },
}

impl Signal {
    /// Topic this signal is published on
    pub fn topic(&self) -> Topic {
        match self {
            Self::NotificationCreated { .. } | Self::NotificationsUpdated { .. } => {
                Topic::Notifications
            }
            Self::DelayRaised { .. }
            | Self::AutomaticDelayRaised { .. }
            | Self::ManualDelayRaised { .. } => Topic::Delays,
            Self::AlertsCleared { .. } | Self::AlertsClearedBatch { .. } => Topic::Alerts,
            Self::TimeEventRecorded { .. } | Self::TimeEventCleared { .. } => Topic::TimeEvents,
            Self::SlotTransitioned { .. } => Topic::Slots,
        }
    }

    /// Signal type name (matches the serialized `type` tag)
    pub fn signal_type(&self) -> &'static str {
        match self {
            Self::NotificationCreated { .. } => "notification_created",
            Self::NotificationsUpdated { .. } => "notifications_updated",
            Self::DelayRaised { .. } => "delay_raised",
            Self::AutomaticDelayRaised { .. } => "automatic_delay_raised",
            Self::ManualDelayRaised { .. } => "manual_delay_raised",
            Self::AlertsCleared { .. } => "alerts_cleared",
            Self::AlertsClearedBatch { .. } => "alerts_cleared_batch",
            Self::TimeEventRecorded { .. } => "time_event_recorded",
            Self::TimeEventCleared { .. } => "time_event_cleared",
            Self::SlotTransitioned { .. } => "slot_transitioned",
        }
    }
}

/// A signal with delivery metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    /// Unique envelope id (UUID v7)
    pub id: Uuid,

    /// Execution context that emitted the signal
    pub origin: Uuid,

    pub emitted_at: DateTime<Utc>,

    pub signal: Signal,
}

// ============================================================================
// SignalHub
// ============================================================================

/// Publish-subscribe hub owned by one execution context.
pub struct SignalHub {
    context_id: Uuid,
    senders: HashMap<Topic, broadcast::Sender<SignalEnvelope>>,
    store: Option<Arc<dyn SharedStore>>,
    clock: Arc<dyn Clock>,
    // Serializes read-modify-write of the store signal logs within this context
    mirror_lock: Mutex<()>,
}

impl SignalHub {
    /// Create a hub that only delivers in-process.
    pub fn new(context_id: Uuid, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let senders = Topic::ALL
            .into_iter()
            .map(|topic| (topic, broadcast::channel(capacity.max(1)).0))
            .collect();

        Self {
            context_id,
            senders,
            store: None,
            clock,
            mirror_lock: Mutex::new(()),
        }
    }

    /// Also mirror every emitted signal to the shared store for other contexts.
    pub fn with_store(mut self, store: Arc<dyn SharedStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Identifier of the owning execution context
    pub fn context_id(&self) -> Uuid {
        self.context_id
    }

    /// Emit a signal locally and to other contexts.
    pub fn emit(&self, signal: Signal) -> SignalEnvelope {
        let envelope = SignalEnvelope {
            id: Uuid::now_v7(),
            origin: self.context_id,
            emitted_at: self.clock.now(),
            signal,
        };

        self.deliver(envelope.clone());
        self.mirror(&envelope);
        envelope
    }

    /// Deliver an envelope to local subscribers only.
    pub(crate) fn deliver(&self, envelope: SignalEnvelope) {
        let topic = envelope.signal.topic();
        if let Some(sender) = self.senders.get(&topic) {
            debug!(
                topic = %topic,
                signal_type = envelope.signal.signal_type(),
                envelope_id = %envelope.id,
                subscriber_count = sender.receiver_count(),
                "Signal delivered"
            );
            // Dropped silently when nobody subscribes to the topic
            let _ = sender.send(envelope);
        }
    }

    fn mirror(&self, envelope: &SignalEnvelope) {
        let Some(store) = &self.store else {
            return;
        };

        let key = keys::signal(envelope.signal.topic());
        let _guard = self.mirror_lock.lock();
        let mut log: Vec<SignalEnvelope> = read_list(store.as_ref(), &key);
        log.push(envelope.clone());
        if log.len() > SIGNAL_LOG_CAPACITY {
            let excess = log.len() - SIGNAL_LOG_CAPACITY;
            log.drain(..excess);
        }
        if !write_json(store.as_ref(), &key, &log) {
            warn!(
                envelope_id = %envelope.id,
                "Signal not mirrored; other contexts will only see it on re-read"
            );
        }
    }

    /// Subscribe to a topic.
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let rx = self.senders[&topic].subscribe();
        debug!(topic = %topic, "Subscribed");
        Subscription { topic, rx }
    }

    /// End a subscription.
    pub fn unsubscribe(&self, subscription: Subscription) {
        debug!(topic = %subscription.topic, "Unsubscribed");
        drop(subscription);
    }

    /// Number of live subscriptions for a topic
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.senders[&topic].receiver_count()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// A live subscription to one topic. Dropping it unsubscribes.
pub struct Subscription {
    topic: Topic,
    rx: broadcast::Receiver<SignalEnvelope>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Wait for the next signal. Returns `None` once the hub is gone.
    ///
    /// A subscriber that falls behind skips the signals it missed and keeps
    /// going; it should re-read the store to catch up.
    pub async fn recv(&mut self) -> Option<SignalEnvelope> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "Subscriber lagged, signals dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next signal if one is already queued.
    pub fn try_recv(&mut self) -> Option<SignalEnvelope> {
        loop {
            match self.rx.try_recv() {
                Ok(envelope) => return Some(envelope),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "Subscriber lagged, signals dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Every signal currently queued.
    pub fn drain(&mut self) -> Vec<SignalEnvelope> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Turn the subscription into a stream, skipping lag gaps.
    pub fn into_stream(self) -> impl Stream<Item = SignalEnvelope> {
        BroadcastStream::new(self.rx).filter_map(|item| item.ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::InMemorySharedStore;

    fn hub() -> SignalHub {
        SignalHub::new(Uuid::now_v7(), 16, Arc::new(ManualClock::starting_now()))
    }

    fn cleared(slot_id: &str) -> Signal {
        Signal::AlertsCleared {
            slot_id: slot_id.to_string(),
            source: "test".to_string(),
        }
    }

    #[test]
    fn test_topic_routing() {
        assert_eq!(cleared("A").topic(), Topic::Alerts);
        assert_eq!(
            Signal::NotificationsUpdated { removed: 1 }.topic(),
            Topic::Notifications
        );
        assert_eq!(
            Signal::ManualDelayRaised {
                slot_id: "A".into(),
                driver_tag: "T".into()
            }
            .topic(),
            Topic::Delays
        );
    }

    #[test]
    fn test_signal_type_matches_serde_tag() {
        let signal = cleared("A");
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["type"], signal.signal_type());
    }

    #[test]
    fn test_subscribers_only_receive_their_topic() {
        let hub = hub();
        let mut alerts = hub.subscribe(Topic::Alerts);
        let mut slots = hub.subscribe(Topic::Slots);

        hub.emit(cleared("A"));

        let envelope = alerts.try_recv().unwrap();
        assert_eq!(envelope.origin, hub.context_id());
        assert_eq!(envelope.signal, cleared("A"));
        assert!(slots.try_recv().is_none());
    }

    #[test]
    fn test_unsubscribe_drops_receiver() {
        let hub = hub();
        let sub = hub.subscribe(Topic::Alerts);
        assert_eq!(hub.subscriber_count(Topic::Alerts), 1);

        hub.unsubscribe(sub);
        assert_eq!(hub.subscriber_count(Topic::Alerts), 0);

        // Emitting without subscribers is fine
        hub.emit(cleared("A"));
    }

    #[test]
    fn test_mirror_log_is_capped() {
        let store = Arc::new(InMemorySharedStore::new());
        let hub = hub().with_store(store.clone());

        for i in 0..(SIGNAL_LOG_CAPACITY + 5) {
            hub.emit(cleared(&format!("S{i}")));
        }

        let log: Vec<SignalEnvelope> =
            read_list(store.as_ref(), &keys::signal(Topic::Alerts));
        assert_eq!(log.len(), SIGNAL_LOG_CAPACITY);
        assert_eq!(log.last().unwrap().signal, cleared(&format!("S{}", SIGNAL_LOG_CAPACITY + 4)));
        assert_eq!(log.first().unwrap().signal, cleared("S5"));
    }

    #[tokio::test]
    async fn test_recv_and_stream() {
        let hub = hub();
        let mut sub = hub.subscribe(Topic::Alerts);
        let stream_sub = hub.subscribe(Topic::Alerts);

        hub.emit(cleared("A"));
        hub.emit(cleared("B"));

        assert_eq!(sub.recv().await.unwrap().signal, cleared("A"));
        assert_eq!(sub.drain().len(), 1);

        let mut stream = Box::pin(stream_sub.into_stream());
        assert_eq!(stream.next().await.unwrap().signal, cleared("A"));
        assert_eq!(stream.next().await.unwrap().signal, cleared("B"));
    }
}
