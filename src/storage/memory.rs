//! In-process store, for tests and ephemeral sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::DurableStore;
use crate::error::Result;

/// Map-backed [`DurableStore`].
///
/// Clone is cheap and all clones share the same records, so a test can hand
/// one clone to a cache and inspect or reuse the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with one record.
    pub fn with_record(key: &str, value: &str) -> Self {
        let store = Self::new();
        store.put_sync(key, value);
        store
    }

    /// Synchronous peek at a record.
    pub fn get_sync(&self, key: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put_sync(&self, key: &str, value: &str) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_sync(key))
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        self.put_sync(key, value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}
