use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{KvStore, StoreResult};

/// Process-local store. Every operation runs under one lock, so
/// `set_if_absent` is trivially atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Value>>> {
        let entries = self.entries.read().await;
        Ok(keys.iter().map(|key| entries.get(key).cloned()).collect())
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Value) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn scan(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_if_absent_keeps_first_value() {
        let store = MemoryStore::new();

        assert!(store.set_if_absent("slot:a", json!("1")).await.unwrap());
        assert!(!store.set_if_absent("slot:a", json!("2")).await.unwrap());
        assert_eq!(store.get("slot:a").await.unwrap(), Some(json!("1")));
    }

    #[tokio::test]
    async fn test_scan_stops_at_prefix_boundary() {
        let store = MemoryStore::new();
        for key in ["application:1", "application:2", "applicationz", "slot:x"] {
            store.set(key, json!(true)).await.unwrap();
        }

        let keys = store.scan("application:").await.unwrap();
        assert_eq!(keys, vec!["application:1".to_string(), "application:2".to_string()]);
    }

    #[tokio::test]
    async fn test_mget_aligns_with_keys() {
        let store = MemoryStore::new();
        store.set("a", json!(1)).await.unwrap();

        let values = store
            .mget(&["missing".to_string(), "a".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![None, Some(json!(1))]);
    }

    #[tokio::test]
    async fn test_delete_reports_removal() {
        let store = MemoryStore::new();
        store.set("a", json!(1)).await.unwrap();

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.is_empty().await);
    }
}
