//! JSON helpers over a SharedStore
//!
//! These helpers implement the engine's storage failure policy in one place:
//! - unreadable or malformed values are logged and treated as absent
//! - failed writes are logged and reported as `false`, never propagated

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};

use super::traits::SharedStore;

/// Read and decode a JSON value, treating any failure as absent.
pub fn read_json<T: DeserializeOwned>(store: &dyn SharedStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(key, error = %e, "Failed to read shared store, treating as absent");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "Malformed value in shared store, treating as absent");
            None
        }
    }
}

/// Read a JSON list, treating absent or malformed values as empty.
pub fn read_list<T: DeserializeOwned>(store: &dyn SharedStore, key: &str) -> Vec<T> {
    read_json(store, key).unwrap_or_default()
}

/// Encode and write a JSON value. Returns whether the write went through.
pub fn write_json<T: Serialize + ?Sized>(store: &dyn SharedStore, key: &str, value: &T) -> bool {
    let raw = match serde_json::to_string(value) {
        Ok(raw) => raw,
        Err(e) => {
            error!(key, error = %e, "Failed to encode value for shared store");
            return false;
        }
    };

    match store.set(key, raw) {
        Ok(()) => true,
        Err(e) => {
            error!(key, error = %e, "Failed to write shared store");
            false
        }
    }
}

/// Remove a key. Returns whether the removal went through.
pub fn remove_key(store: &dyn SharedStore, key: &str) -> bool {
    match store.remove(key) {
        Ok(()) => true,
        Err(e) => {
            error!(key, error = %e, "Failed to remove key from shared store");
            false
        }
    }
}

/// Whether a key currently holds any value (malformed values count).
pub fn exists(store: &dyn SharedStore, key: &str) -> bool {
    match store.get(key) {
        Ok(value) => value.is_some(),
        Err(e) => {
            warn!(key, error = %e, "Failed to read shared store, treating as absent");
            false
        }
    }
}
