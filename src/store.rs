//! Pluggable key-value storage for limiter state.

use std::collections::HashMap;
use std::sync::RwLock;

/// Storage interface the admission controller reads and writes through.
///
/// The controller needs point lookups, point writes, deletes and a full
/// scan for the cleanup sweep, so the surface is deliberately small. The
/// default implementation keeps everything in process memory; a shared
/// deployment can substitute its own implementation without touching the
/// admission logic.
pub trait KeyValueStore<V: Clone>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;
    fn set(&self, key: &str, value: V);
    fn delete(&self, key: &str);
    fn entries(&self) -> Vec<(String, V)>;
}

/// In-memory store backed by a `HashMap` behind an `RwLock`.
pub struct MemoryStore<V> {
    inner: RwLock<HashMap<String, V>>,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, V>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, V>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync> KeyValueStore<V> for MemoryStore<V> {
    fn get(&self, key: &str) -> Option<V> {
        self.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: V) {
        self.write().insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) {
        self.write().remove(key);
    }

    fn entries(&self) -> Vec<(String, V)> {
        self.read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
