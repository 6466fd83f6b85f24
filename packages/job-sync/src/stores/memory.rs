//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::StoreResult;
use crate::traits::store::KeyValueStore;

/// In-memory key-value store.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Map<String, Value>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with entries.
    pub fn with_entries(entries: Map<String, Value>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn set_many(&self, entries: Vec<(String, Value)>) -> StoreResult<()> {
        let mut guard = self.entries.write().await;
        for (key, value) in entries {
            guard.insert(key, value);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn snapshot(&self) -> StoreResult<Map<String, Value>> {
        Ok(self.entries.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("stats").await.unwrap(), None);

        store.set("stats", json!({"pendingSync": 1})).await.unwrap();
        assert_eq!(
            store.get("stats").await.unwrap(),
            Some(json!({"pendingSync": 1}))
        );

        store.remove("stats").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_set_many_and_clear() {
        let store = MemoryStore::new();
        store
            .set_many(vec![
                ("pendingJobs".to_string(), json!([])),
                ("trackedJobs".to_string(), json!([{"id": "job_1"}])),
            ])
            .await
            .unwrap();
        assert_eq!(store.len().await, 2);

        store.clear().await.unwrap();
        assert!(store.snapshot().await.unwrap().is_empty());
    }

    #[test]
    fn test_with_entries_seeds_store() {
        let mut entries = Map::new();
        entries.insert("lastSync".to_string(), json!("2024-01-01T00:00:00Z"));
        let store = MemoryStore::with_entries(entries);

        let value = tokio_test::block_on(store.get("lastSync"));
        assert_eq!(
            tokio_test::assert_ok!(value),
            Some(json!("2024-01-01T00:00:00Z"))
        );
    }
}
