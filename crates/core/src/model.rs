// Domain records persisted in the shared store
//
// These types are the wire format between execution contexts: every context
// serializes them to JSON under the key families in `keys`, and any other
// context may read them back. Field names are snake_case on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Notifications
// ============================================================================

/// Kind of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// An analyst called a driver to a slot
    AnalystCall,

    /// A called driver has not shown up in time
    DriverDelay,

    /// A driver that was flagged late has been called again
    DelayedDriverCalled,

    /// The driver declined to enter the slot
    DriverWontEnter,

    /// The driver confirmed entry to the slot
    DriverEnterConfirmation,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnalystCall => "analyst_call",
            Self::DriverDelay => "driver_delay",
            Self::DelayedDriverCalled => "delayed_driver_called",
            Self::DriverWontEnter => "driver_wont_enter",
            Self::DriverEnterConfirmation => "driver_enter_confirmation",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-visible notification.
///
/// Acknowledging a notification deletes it, so `read` is persisted for wire
/// compatibility but is never flipped to `true` by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Opaque identifier (UUID v7)
    pub id: String,

    /// Notification kind
    #[serde(rename = "type")]
    pub kind: NotificationType,

    /// Human-readable message
    pub message: String,

    /// Slot the notification refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<String>,

    /// Driver the notification refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_tag: Option<String>,

    /// Creation time
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub read: bool,
}

impl Notification {
    /// Create a fresh, unread notification
    pub fn new(
        kind: NotificationType,
        message: impl Into<String>,
        slot_id: Option<&str>,
        driver_tag: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            kind,
            message: message.into(),
            slot_id: slot_id.map(str::to_string),
            driver_tag: driver_tag.map(str::to_string),
            created_at,
            read: false,
        }
    }

    /// Whether this notification has the dedup key `(kind, slot_id, driver_tag)`
    pub fn has_dedup_key(
        &self,
        kind: NotificationType,
        slot_id: Option<&str>,
        driver_tag: Option<&str>,
    ) -> bool {
        self.kind == kind
            && self.slot_id.as_deref() == slot_id
            && self.driver_tag.as_deref() == driver_tag
    }
}

// ============================================================================
// Time events
// ============================================================================

/// Slot lifecycle milestone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeEventKind {
    Called,
    Loading,
    Finalized,
}

impl TimeEventKind {
    pub const ALL: [TimeEventKind; 3] = [Self::Called, Self::Loading, Self::Finalized];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Called => "called",
            Self::Loading => "loading",
            Self::Finalized => "finalized",
        }
    }
}

impl std::fmt::Display for TimeEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timestamped milestone for a slot. One per `(slot_id, kind)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEvent {
    pub slot_id: String,
    pub driver_tag: String,
    pub timestamp: DateTime<Utc>,
    pub kind: TimeEventKind,
    /// Who recorded the milestone (console name, device id, ...)
    pub source: String,
}

// ============================================================================
// Slots
// ============================================================================

/// Slot lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Open,
    Called,
    Loading,
    Finalized,
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Called => write!(f, "called"),
            Self::Loading => write!(f, "loading"),
            Self::Finalized => write!(f, "finalized"),
        }
    }
}

/// A loading bay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: String,
    pub status: SlotStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_driver_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub called_at: Option<DateTime<Utc>>,
    /// `None` only for a slot that has never transitioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_at: Option<DateTime<Utc>>,
}

impl Slot {
    /// A slot that has never been touched.
    pub fn open(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: SlotStatus::Open,
            current_driver_tag: None,
            called_at: None,
            last_transition_at: None,
        }
    }
}

// ============================================================================
// Alerts and delay markers
// ============================================================================

/// An entry in a per-slot direct or admin alert list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotAlert {
    pub id: String,
    pub slot_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_tag: Option<String>,
    pub kind: NotificationType,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// How a delay was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelaySource {
    /// Derived from elapsed time by the delay detector
    Automatic,

    /// Explicit operator action
    Manual,
}

impl std::fmt::Display for DelaySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Automatic => write!(f, "automatic"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Marker stored for active delay alerts, manual delays and the
/// per-(slot, driver) last-notified suppression marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayMarker {
    pub slot_id: String,
    pub driver_tag: String,
    pub raised_at: DateTime<Utc>,
    pub source: DelaySource,
}

/// Written when a delayed driver answers (confirms or declines entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMarker {
    pub slot_id: String,
    pub driver_tag: String,
    pub responded_at: DateTime<Utc>,
}

/// Global "last clear" marker, used by contexts that missed an
/// `AlertsCleared` signal to notice the clear on their next read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearMarker {
    pub slot_ids: Vec<String>,
    pub source: String,
    pub cleared_at: DateTime<Utc>,
    /// Execution context that performed the clear
    pub context_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_wire_format() {
        let n = Notification::new(
            NotificationType::DriverDelay,
            "late",
            Some("D-04"),
            Some("TRK-7"),
            Utc::now(),
        );
        let json = serde_json::to_value(&n).unwrap();

        assert_eq!(json["type"], "driver_delay");
        assert_eq!(json["slot_id"], "D-04");
        assert_eq!(json["read"], false);
    }

    #[test]
    fn test_notification_without_slot_omits_fields() {
        let n = Notification::new(
            NotificationType::AnalystCall,
            "hello",
            None,
            None,
            Utc::now(),
        );
        let json = serde_json::to_value(&n).unwrap();

        assert!(json.get("slot_id").is_none());
        assert!(json.get("driver_tag").is_none());
    }

    #[test]
    fn test_dedup_key_matching() {
        let n = Notification::new(
            NotificationType::DriverDelay,
            "late",
            Some("D-04"),
            Some("TRK-7"),
            Utc::now(),
        );

        assert!(n.has_dedup_key(NotificationType::DriverDelay, Some("D-04"), Some("TRK-7")));
        assert!(!n.has_dedup_key(NotificationType::DriverDelay, Some("D-04"), Some("TRK-8")));
        assert!(!n.has_dedup_key(NotificationType::AnalystCall, Some("D-04"), Some("TRK-7")));
        assert!(!n.has_dedup_key(NotificationType::DriverDelay, None, Some("TRK-7")));
    }

    #[test]
    fn test_fresh_slot_is_open() {
        let slot = Slot::open("D-04");
        assert_eq!(slot.status, SlotStatus::Open);
        assert!(slot.last_transition_at.is_none());
    }
}
