//! Store wrapper that fails selected operations, for exercising degraded paths

use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{InMemorySharedStore, SharedStore, StoreChange, StoreError};

/// In-memory store that refuses writes or removals of keys under chosen prefixes.
///
/// Prefixes can be changed at any time, so a test can populate state normally and
/// then break the store.
#[derive(Default)]
pub(crate) struct FaultyStore {
    inner: InMemorySharedStore,
    fail_set: Mutex<Vec<String>>,
    fail_remove: Mutex<Vec<String>>,
}

impl FaultyStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make `set` fail for keys starting with `prefix`
    pub(crate) fn fail_set(&self, prefix: impl Into<String>) {
        self.fail_set.lock().push(prefix.into());
    }

    /// Make `remove` fail for keys starting with `prefix`
    pub(crate) fn fail_remove(&self, prefix: impl Into<String>) {
        self.fail_remove.lock().push(prefix.into());
    }

    fn refuses(prefixes: &Mutex<Vec<String>>, key: &str) -> bool {
        prefixes.lock().iter().any(|p| key.starts_with(p.as_str()))
    }
}

impl SharedStore for FaultyStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        if Self::refuses(&self.fail_set, key) {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        if Self::refuses(&self.fail_remove, key) {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.inner.remove(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.keys_with_prefix(prefix)
    }

    fn watch(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.watch()
    }
}
