// Cross-context signal relay
//
// Turns store change notifications on the per-topic signal logs into local
// signal deliveries. Only envelopes emitted by other contexts are re-delivered;
// this context's own envelopes were already delivered when emitted.
//
// The logs are read-modify-write without locking, so two contexts emitting on
// the same topic at the same moment can lose one entry. That window is accepted:
// signals are hints and consumers re-read state (see `AlertManager::last_clear`).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::keys;
use crate::signals::{SignalEnvelope, SignalHub, Topic};
use crate::store::typed::read_list;
use crate::store::{SharedStore, StoreChange};

/// Forwards signals written by other contexts to local subscribers.
pub struct SignalRelay {
    hub: Arc<SignalHub>,
    store: Arc<dyn SharedStore>,
    changes: broadcast::Receiver<StoreChange>,
    last_seen: HashMap<Topic, Uuid>,
}

impl SignalRelay {
    /// Create a relay. Signals already in the store logs are treated as seen.
    pub fn new(hub: Arc<SignalHub>, store: Arc<dyn SharedStore>) -> Self {
        let changes = store.watch();
        let last_seen = Topic::ALL
            .into_iter()
            .filter_map(|topic| {
                let log: Vec<SignalEnvelope> = read_list(store.as_ref(), &keys::signal(topic));
                log.last().map(|e| (topic, e.id))
            })
            .collect();

        Self {
            hub,
            store,
            changes,
            last_seen,
        }
    }

    /// Forward everything that changed since the last call. Returns the number
    /// of signals delivered locally.
    pub fn drain(&mut self) -> usize {
        let mut topics: Vec<Topic> = Vec::new();
        let mut lagged = false;

        loop {
            match self.changes.try_recv() {
                Ok(change) => {
                    if let Some(topic) = keys::signal_topic(&change.key) {
                        if !topics.contains(&topic) {
                            topics.push(topic);
                        }
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Relay lagged behind store changes, rescanning all topics");
                    lagged = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        if lagged {
            topics = Topic::ALL.to_vec();
        }

        topics.into_iter().map(|topic| self.forward(topic)).sum()
    }

    /// Run until `shutdown` flips to `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(context_id = %self.hub.context_id(), "Signal relay started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                change = self.changes.recv() => match change {
                    Ok(change) => {
                        if let Some(topic) = keys::signal_topic(&change.key) {
                            self.forward(topic);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Relay lagged behind store changes, rescanning all topics");
                        for topic in Topic::ALL {
                            self.forward(topic);
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        info!(context_id = %self.hub.context_id(), "Signal relay stopped");
    }

    fn forward(&mut self, topic: Topic) -> usize {
        let log: Vec<SignalEnvelope> = read_list(self.store.as_ref(), &keys::signal(topic));
        let Some(last) = log.last() else {
            return 0;
        };

        // Resume after the last envelope we saw. If it was evicted from the log
        // (or overwritten by a concurrent writer) replay the whole log.
        let start = self
            .last_seen
            .get(&topic)
            .and_then(|seen| log.iter().position(|e| e.id == *seen))
            .map(|pos| pos + 1)
            .unwrap_or(0);
        self.last_seen.insert(topic, last.id);

        let own = self.hub.context_id();
        let mut delivered = 0;
        for envelope in &log[start..] {
            if envelope.origin != own {
                self.hub.deliver(envelope.clone());
                delivered += 1;
            }
        }

        if delivered > 0 {
            debug!(topic = %topic, delivered, "Relayed signals from other contexts");
        }
        delivered
    }
}
