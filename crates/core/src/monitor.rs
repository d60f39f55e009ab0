// Delay monitor
//
// Background timer that periodically issues automatic delay reports for every
// slot waiting on its driver. All gating lives in the detector, so running the
// monitor in several contexts at once only costs duplicate reads: the
// suppression marker and notification dedup keep the alert count down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::delay::DelayDetector;
use crate::slots::SlotMachine;

pub struct DelayMonitor {
    slots: Arc<SlotMachine>,
    detector: Arc<DelayDetector>,
    interval: Duration,
}

impl DelayMonitor {
    pub fn new(slots: Arc<SlotMachine>, detector: Arc<DelayDetector>, interval: Duration) -> Self {
        Self {
            slots,
            detector,
            interval,
        }
    }

    /// Run one scan. Returns the number of delays raised.
    pub fn tick(&self) -> usize {
        let mut raised = 0;
        for slot in self.slots.called_slots() {
            let Some(driver_tag) = slot.current_driver_tag.as_deref() else {
                continue;
            };
            if self.detector.report_delay(&slot.id, driver_tag, false).is_raised() {
                raised += 1;
            }
        }

        if raised > 0 {
            debug!(raised, "Delay scan raised alerts");
        }
        raised
    }

    /// Scan every `interval` until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "Delay monitor started");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Delay monitor stopped");
    }
}
