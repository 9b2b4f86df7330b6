//! Keyed repositories for long-lived registrations (schedules, webhook
//! routes, …).
//!
//! Callers receive a `Repository` instead of reaching for process-wide
//! maps, so each host decides where registrations live.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// `get/put/remove` by string key.
pub trait Repository<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;

    /// Store `value`, returning the previous value for `key` if any.
    fn put(&self, key: &str, value: V) -> Option<V>;

    fn remove(&self, key: &str) -> Option<V>;

    fn keys(&self) -> Vec<String>;
}

/// `Repository` held in memory.  A writer that panicked mid-update does not
/// lock everyone else out; its partial state is kept.
#[derive(Debug)]
pub struct MemoryRepository<V> {
    entries: RwLock<HashMap<String, V>>,
}

impl<V> Default for MemoryRepository<V> {
    fn default() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }
}

impl<V> MemoryRepository<V> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<V: Clone + Send + Sync> Repository<V> for MemoryRepository<V> {
    fn get(&self, key: &str) -> Option<V> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    fn put(&self, key: &str, value: V) -> Option<V> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).insert(key.to_owned(), value)
    }

    fn remove(&self, key: &str) -> Option<V> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).remove(key)
    }

    fn keys(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}
