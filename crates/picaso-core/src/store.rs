//! Key-Value Storage
//!
//! Small string store that holds per-profile state (quota window, artwork
//! snapshot) between pipeline runs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backing medium could not be read or written
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Stored value could not be decoded
    #[error("Corrupt value under '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// A lock was poisoned by a panicking writer
    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// String key-value store trait
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remove a value (no-op when absent)
    fn delete(&self, key: &str) -> StoreResult<()>;
}

/// In-memory store (for development/testing)
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// Prefixes every key so several profiles can share one backing store
pub struct ScopedStore {
    inner: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl ScopedStore {
    pub fn new(inner: Arc<dyn KeyValueStore>, scope: &str) -> Self {
        Self {
            inner,
            prefix: format!("{scope}:"),
        }
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

impl KeyValueStore for ScopedStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(&self.scoped(key))
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.inner.set(&self.scoped(key), value)
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.delete(&self.scoped(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryKeyValueStore::new();
        assert!(store.get("k").unwrap().is_none());

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));

        store.delete("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn test_scoped_stores_are_isolated() {
        let shared: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let alice = ScopedStore::new(shared.clone(), "alice");
        let bob = ScopedStore::new(shared.clone(), "bob");

        alice.set("count", "1").unwrap();
        assert!(bob.get("count").unwrap().is_none());
        assert_eq!(shared.get("alice:count").unwrap().as_deref(), Some("1"));
    }
}
