//! Key-value store used to mirror task progress across processes.

use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::Result;

/// Minimal string key-value store
///
/// Writes are last-writer-wins; there is no compare-and-swap.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Insert or replace `key`
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove `key`; removing an absent key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Every key currently stored, in no particular order
    async fn scan_all_keys(&self) -> Result<Vec<String>>;
}

/// Process-local [`KeyValueStore`]
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKvStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn scan_all_keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}
