//! SharedStore trait definition

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Error type for store operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Store is unreachable or refused the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Value could not be encoded or decoded
    #[error("serialization error for key {key}: {reason}")]
    Serialization { key: String, reason: String },
}

/// What happened to a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Set,
    Removed,
}

/// Change notification fired whenever any context writes or removes a key.
///
/// Carries no value: consumers re-read the key, since the value may have been
/// overwritten again by the time the notification is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
    pub kind: ChangeKind,
}

/// Key-value store shared by every execution context.
///
/// Writes are last-write-wins per key. There is no compare-and-swap and no
/// transaction: the engine is built to tolerate interleaved writers.
pub trait SharedStore: Send + Sync {
    /// Read a key
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a key, overwriting any previous value
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// List every key starting with `prefix`
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Subscribe to change notifications for every key
    fn watch(&self) -> broadcast::Receiver<StoreChange>;
}
