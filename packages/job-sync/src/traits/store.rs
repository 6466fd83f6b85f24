//! Key-value storage trait backing the local job store.
//!
//! Values are JSON documents keyed by name, the same shape as browser
//! extension storage. Typed access lives in [`crate::job_store::JobStore`].

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreResult;

/// Durable key-value persistence.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Store a value, replacing any previous one.
    async fn set(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Store several values atomically: either all are written or none.
    async fn set_many(&self, entries: Vec<(String, Value)>) -> StoreResult<()>;

    /// Remove a key. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// Remove every key.
    async fn clear(&self) -> StoreResult<()>;

    /// Copy of every stored entry.
    async fn snapshot(&self) -> StoreResult<Map<String, Value>>;
}
