// Clock abstraction
//
// Every time-window decision (dedup window, grace period, suppression window,
// elapsed clamp) reads the current time through a Clock. Production engines use
// SystemClock; tests inject a ManualClock and move time explicitly.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Source of wall-clock time for the engine.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same instant, so several engines built from clones of one
/// `ManualClock` observe a single timeline.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Create a clock frozen at the current system time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward.
    pub fn advance(&self, by: std::time::Duration) {
        let mut now = self.now.write();
        *now = later_by(*now, by);
    }

    /// Move the clock backward (used to simulate skewed contexts).
    pub fn rewind(&self, by: std::time::Duration) {
        let mut now = self.now.write();
        *now = earlier_by(*now, by);
    }

    /// Jump to an absolute instant.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.write() = at;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_now()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// Convert a std duration into a chrono duration, saturating on overflow.
pub(crate) fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::max_value())
}

/// `at + by`, saturating at the latest representable instant.
pub(crate) fn later_by(at: DateTime<Utc>, by: std::time::Duration) -> DateTime<Utc> {
    at.checked_add_signed(to_chrono(by))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `at - by`, saturating at the earliest representable instant.
pub(crate) fn earlier_by(at: DateTime<Utc>, by: std::time::Duration) -> DateTime<Utc> {
    at.checked_sub_signed(to_chrono(by))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// True when `at` lies less than `window` before `now`.
///
/// Timestamps in the future (clock skew between contexts) count as inside the
/// window.
pub(crate) fn within(now: DateTime<Utc>, at: DateTime<Utc>, window: std::time::Duration) -> bool {
    now.signed_duration_since(at) < to_chrono(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_manual_clock_advance_and_rewind() {
        let start = Utc::now();
        let clock = ManualClock::new(start);

        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now() - start, chrono::Duration::seconds(90));

        clock.rewind(Duration::from_secs(30));
        assert_eq!(clock.now() - start, chrono::Duration::seconds(60));
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::starting_now();
        let other = clock.clone();

        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now(), other.now());
    }

    #[test]
    fn test_within_window() {
        let now = Utc::now();
        let window = Duration::from_secs(30);

        assert!(within(now, now - chrono::Duration::seconds(29), window));
        assert!(!within(now, now - chrono::Duration::seconds(30), window));
        assert!(within(now, now + chrono::Duration::seconds(10), window));
    }

    #[test]
    fn test_manual_clock_saturates_instead_of_overflowing() {
        let clock = ManualClock::starting_now();

        clock.advance(Duration::from_secs(1_000_000_000_000_000));
        assert_eq!(clock.now(), DateTime::<Utc>::MAX_UTC);

        clock.rewind(Duration::from_secs(9_000_000_000_000_000));
        assert_eq!(clock.now(), DateTime::<Utc>::MIN_UTC);
    }
}
