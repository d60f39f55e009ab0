// Error types surfaced to callers
//
// Storage failures never reach callers (they are logged and degraded at each
// component boundary, see `store::typed`). The only failure handed back is a
// rejected slot transition, because it signals a caller acting on stale state.

use thiserror::Error;

use crate::model::SlotStatus;

pub use crate::store::StoreError;

/// Result type alias for slot transitions
pub type Result<T> = std::result::Result<T, TransitionError>;

/// Slot state machine action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAction {
    Call,
    BeginLoading,
    Finalize,
}

impl std::fmt::Display for SlotAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::BeginLoading => write!(f, "begin_loading"),
            Self::Finalize => write!(f, "finalize"),
        }
    }
}

/// Errors returned by the slot state machine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The slot is not in a state the action can start from
    #[error("cannot {action} slot {slot_id}: slot is {from}")]
    InvalidTransition {
        slot_id: String,
        from: SlotStatus,
        action: SlotAction,
    },
}

impl TransitionError {
    /// Create an invalid transition error
    pub fn invalid(slot_id: impl Into<String>, from: SlotStatus, action: SlotAction) -> Self {
        TransitionError::InvalidTransition {
            slot_id: slot_id.into(),
            from,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = TransitionError::invalid("D-04", SlotStatus::Open, SlotAction::Finalize);
        assert_eq!(err.to_string(), "cannot finalize slot D-04: slot is open");
    }
}
