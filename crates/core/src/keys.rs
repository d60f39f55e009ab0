// Shared store key families
//
// Every persisted record lives under the `baysync:` namespace. Per-slot families
// embed the slot id as one escaped segment (`%` and `:` are percent-encoded), so a
// prefix scan for slot "A1" matches neither "A10" nor "A1:x".

use crate::model::TimeEventKind;
use crate::signals::Topic;

/// Encode an id so it occupies exactly one `:`-separated key segment.
fn segment(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for c in id.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            c => out.push(c),
        }
    }
    out
}

/// Global notification list (newest first).
pub const NOTIFICATIONS: &str = "baysync:notifications";

/// Global "last clear" marker written after every alert clear.
pub const LAST_CLEAR: &str = "baysync:alerts:last_clear";

/// Index of every slot id that has been persisted at least once.
pub const SLOT_INDEX: &str = "baysync:slots:index";

/// Prefix shared by every cross-context signal log key.
pub const SIGNAL_PREFIX: &str = "baysync:signal:";

/// Direct (operator-facing) alerts for a slot.
pub fn slot_alerts(slot_id: &str) -> String {
    format!("baysync:alerts:slot:{}", segment(slot_id))
}

/// Admin-facing alerts for a slot.
pub fn admin_alerts(slot_id: &str) -> String {
    format!("baysync:alerts:admin:{}", segment(slot_id))
}

/// Active delay-alert marker for a slot.
pub fn delay_alert(slot_id: &str) -> String {
    format!("baysync:alerts:delay:{}", segment(slot_id))
}

/// "Manually delayed" marker for a slot.
pub fn manual_delay(slot_id: &str) -> String {
    format!("baysync:delay:manual:{}", segment(slot_id))
}

/// "Delayed driver responded" marker for a slot.
pub fn delay_responded(slot_id: &str) -> String {
    format!("baysync:delay:responded:{}", segment(slot_id))
}

/// Last automatic delay notification for a (slot, driver) pair.
pub fn delay_notified(slot_id: &str, driver_tag: &str) -> String {
    format!("{}{}", delay_notified_prefix(slot_id), segment(driver_tag))
}

/// Prefix covering every driver's last-notified marker for a slot.
pub fn delay_notified_prefix(slot_id: &str) -> String {
    format!("baysync:delay:notified:{}:", segment(slot_id))
}

/// Time event for a (slot, kind) pair.
pub fn time_event(slot_id: &str, kind: TimeEventKind) -> String {
    format!("baysync:time:{}:{}", segment(slot_id), kind.as_str())
}

/// Slot record.
pub fn slot(slot_id: &str) -> String {
    format!("baysync:slot:{}", segment(slot_id))
}

/// Cross-context signal log for a topic.
pub fn signal(topic: Topic) -> String {
    format!("{SIGNAL_PREFIX}{}", topic.as_str())
}

/// Topic whose signal log lives at `key`, if any.
pub fn signal_topic(key: &str) -> Option<Topic> {
    key.strip_prefix(SIGNAL_PREFIX).and_then(Topic::parse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_notified_prefix_does_not_overlap() {
        let a1 = delay_notified("A1", "TRK-7");
        assert!(a1.starts_with(&delay_notified_prefix("A1")));
        assert!(!a1.starts_with(&delay_notified_prefix("A10")));
        assert!(!delay_notified("A10", "TRK-7").starts_with(&delay_notified_prefix("A1")));
    }

    #[test]
    fn test_delay_notified_prefix_ignores_slot_ids_with_separator() {
        let nested = delay_notified("A1:x", "TRK-7");
        assert!(!nested.starts_with(&delay_notified_prefix("A1")));
        assert!(nested.starts_with(&delay_notified_prefix("A1:x")));
        assert_ne!(slot_alerts("A1:x"), slot_alerts("A1%3Ax"));
    }

    #[test]
    fn test_signal_topic_round_trip() {
        for topic in Topic::ALL {
            assert_eq!(signal_topic(&signal(topic)), Some(topic));
        }
        assert_eq!(signal_topic(NOTIFICATIONS), None);
        assert_eq!(signal_topic("baysync:signal:unknown"), None);
    }

    #[test]
    fn test_time_event_key_includes_kind() {
        assert_eq!(
            time_event("D-04", TimeEventKind::Called),
            "baysync:time:D-04:called"
        );
    }
}
