//! In-memory implementation of SharedStore

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::trace;

use super::traits::*;

/// Buffer size of the change-notification channel
const CHANGE_CAPACITY: usize = 1024;

/// In-memory implementation of SharedStore
///
/// Share one instance (behind an `Arc`) between several engines to simulate
/// independent execution contexts writing to the same store.
///
/// # Example
///
/// ```
/// use baysync_core::{InMemorySharedStore, SharedStore};
///
/// let store = InMemorySharedStore::new();
/// store.set("key", "value".to_string()).unwrap();
/// assert_eq!(store.get("key").unwrap().as_deref(), Some("value"));
/// ```
pub struct InMemorySharedStore {
    entries: RwLock<HashMap<String, String>>,
    changes: broadcast::Sender<StoreChange>,
}

impl InMemorySharedStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            changes,
        }
    }

    /// Get the number of keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All keys, sorted (for debugging and tests)
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn notify(&self, key: &str, kind: ChangeKind) {
        trace!(key, ?kind, "Store change");
        // No receivers is fine: nobody is watching yet
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
            kind,
        });
    }
}

impl Default for InMemorySharedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStore for InMemorySharedStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_string(), value);
        self.notify(key, ChangeKind::Set);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let existed = self.entries.write().remove(key).is_some();
        if existed {
            self.notify(key, ChangeKind::Removed);
        }
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .entries
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn watch(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let store = InMemorySharedStore::new();

        store.set("a", "1".to_string()).unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));

        store.set("a", "2".to_string()).unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));

        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_missing_key_is_ok() {
        let store = InMemorySharedStore::new();
        assert!(store.remove("missing").is_ok());
    }

    #[test]
    fn test_keys_with_prefix() {
        let store = InMemorySharedStore::new();
        store.set("x:1", "a".to_string()).unwrap();
        store.set("x:2", "b".to_string()).unwrap();
        store.set("y:1", "c".to_string()).unwrap();

        let mut keys = store.keys_with_prefix("x:").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["x:1".to_string(), "x:2".to_string()]);
    }

    #[test]
    fn test_watch_sees_sets_and_removes() {
        let store = InMemorySharedStore::new();
        let mut changes = store.watch();

        store.set("a", "1".to_string()).unwrap();
        store.remove("a").unwrap();
        // Removing again does not notify
        store.remove("a").unwrap();

        let first = changes.try_recv().unwrap();
        assert_eq!(first.key, "a");
        assert_eq!(first.kind, ChangeKind::Set);

        let second = changes.try_recv().unwrap();
        assert_eq!(second.kind, ChangeKind::Removed);

        assert!(changes.try_recv().is_err());
    }
}
