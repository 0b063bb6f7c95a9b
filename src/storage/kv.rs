//! Key-value storage primitive — the platform seam the fallback snapshot is
//! persisted through. One JSON-serializable blob per key, no schema.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::StorageError;

/// Asynchronous get/set/remove over a single JSON blob per key.
///
/// Implementors must be `Send + Sync`; the snapshot backend shares the store
/// behind an `Arc`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<Value>, StorageError>;
    async fn set_item(&self, key: &str, value: Value) -> Result<(), StorageError>;
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory `KeyValueStore` — the default platform store in tests and on
/// hosts without a persistent primitive.
#[derive(Default)]
pub struct MemoryKvStore {
    items: Mutex<HashMap<String, Value>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a key directly, bypassing the trait (test setup helper).
    pub fn seed(&self, key: &str, value: Value) {
        self.items.lock().insert(key.to_string(), value);
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get_item(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.items.lock().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.items.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_store_round_trips() {
        let kv = MemoryKvStore::new();
        assert_eq!(kv.get_item("k").await.unwrap(), None);

        kv.set_item("k", json!({ "a": 1 })).await.unwrap();
        assert_eq!(kv.get_item("k").await.unwrap(), Some(json!({ "a": 1 })));

        kv.remove_item("k").await.unwrap();
        assert_eq!(kv.get_item("k").await.unwrap(), None);
    }
}
