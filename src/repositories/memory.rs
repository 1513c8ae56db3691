use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Map, Value};

use super::store::{push_id, DocumentStore};

/// In-process store backend. One map entry per record; the entry API locks
/// a record for the duration of a mutation, which gives the same per-record
/// atomicity the hosted backend offers.
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn child_key<'a>(parent: &str, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(parent)?.strip_prefix('/')?;
        (!rest.is_empty() && !rest.contains('/')).then_some(rest)
    }

    fn children(&self, parent: &str) -> Vec<(String, Value)> {
        let mut children: Vec<(String, Value)> = self
            .records
            .iter()
            .filter_map(|entry| {
                Self::child_key(parent, entry.key())
                    .map(|key| (key.to_string(), entry.value().clone()))
            })
            .collect();
        children.sort_by(|a, b| a.0.cmp(&b.0));
        children
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, anyhow::Error> {
        Ok(self.records.get(path).map(|entry| entry.value().clone()))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), anyhow::Error> {
        self.records.insert(path.to_string(), value);
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), anyhow::Error> {
        let mut entry = self
            .records
            .entry(path.to_string())
            .or_insert_with(|| json!({}));
        let record = entry
            .value_mut()
            .as_object_mut()
            .ok_or_else(|| anyhow::anyhow!("record at {} is not an object", path))?;
        for (key, value) in fields {
            if value.is_null() {
                record.remove(&key);
            } else {
                record.insert(key, value);
            }
        }
        Ok(())
    }

    async fn push(&self, parent: &str, value: Value) -> Result<String, anyhow::Error> {
        let key = push_id();
        self.records.insert(format!("{parent}/{key}"), value);
        Ok(key)
    }

    async fn increment(&self, path: &str, field: &str, delta: i64) -> Result<i64, anyhow::Error> {
        let mut entry = self
            .records
            .entry(path.to_string())
            .or_insert_with(|| json!({}));
        let record = entry
            .value_mut()
            .as_object_mut()
            .ok_or_else(|| anyhow::anyhow!("record at {} is not an object", path))?;
        let current = record.get(field).and_then(Value::as_i64).unwrap_or(0);
        let next = current + delta;
        record.insert(field.to_string(), json!(next));
        Ok(next)
    }

    async fn set_if_absent(
        &self,
        path: &str,
        field: &str,
        value: Value,
    ) -> Result<bool, anyhow::Error> {
        let mut entry = self
            .records
            .entry(path.to_string())
            .or_insert_with(|| json!({}));
        let record = entry
            .value_mut()
            .as_object_mut()
            .ok_or_else(|| anyhow::anyhow!("record at {} is not an object", path))?;
        if record.get(field).is_some_and(|existing| !existing.is_null()) {
            return Ok(false);
        }
        record.insert(field.to_string(), value);
        Ok(true)
    }

    async fn list(&self, parent: &str) -> Result<Vec<(String, Value)>, anyhow::Error> {
        Ok(self.children(parent))
    }

    async fn query_equal(
        &self,
        parent: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<(String, Value)>, anyhow::Error> {
        Ok(self
            .children(parent)
            .into_iter()
            .filter(|(_, record)| record.get(field).and_then(Value::as_str) == Some(value))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn concurrent_increments_do_not_lose_updates() {
        let store = Arc::new(MemoryStore::new());

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment("users/u1", "coins", 7).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let record = store.get("users/u1").await.unwrap().unwrap();
        assert_eq!(record["coins"], json!(350));
    }

    #[tokio::test]
    async fn increment_defaults_missing_record_to_zero() {
        let store = MemoryStore::new();
        let balance = store.increment("users/new", "coins", 50).await.unwrap();
        assert_eq!(balance, 50);
    }

    #[tokio::test]
    async fn set_if_absent_writes_exactly_once() {
        let store = MemoryStore::new();
        assert!(store
            .set_if_absent("users/u1", "referredBy", json!("CODE1234"))
            .await
            .unwrap());
        assert!(!store
            .set_if_absent("users/u1", "referredBy", json!("OTHER"))
            .await
            .unwrap());

        let record = store.get("users/u1").await.unwrap().unwrap();
        assert_eq!(record["referredBy"], json!("CODE1234"));
    }

    #[tokio::test]
    async fn push_keys_ascend_and_list_returns_direct_children_only() {
        let store = MemoryStore::new();
        let first = store.push("earnings/u1", json!({"amount": 1})).await.unwrap();
        let second = store.push("earnings/u1", json!({"amount": 2})).await.unwrap();
        store.set("earnings/u2/other", json!({"amount": 3})).await.unwrap();

        assert!(first < second);

        let children = store.list("earnings/u1").await.unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].0, first);
        assert_eq!(children[1].0, second);
    }

    #[tokio::test]
    async fn update_merges_and_null_removes() {
        let store = MemoryStore::new();
        store.set("users/u1", json!({"coins": 10, "phone": "123"})).await.unwrap();

        let mut fields = Map::new();
        fields.insert("fullName".to_string(), json!("Ada"));
        fields.insert("phone".to_string(), Value::Null);
        store.update("users/u1", fields).await.unwrap();

        let record = store.get("users/u1").await.unwrap().unwrap();
        assert_eq!(record["coins"], json!(10));
        assert_eq!(record["fullName"], json!("Ada"));
        assert!(record.get("phone").is_none());
    }

    #[tokio::test]
    async fn query_equal_matches_string_fields() {
        let store = MemoryStore::new();
        store.set("users/u1", json!({"referralCode": "AAAA"})).await.unwrap();
        store.set("users/u2", json!({"referredBy": "AAAA"})).await.unwrap();
        store.set("users/u3", json!({"referredBy": "BBBB"})).await.unwrap();

        let referred = store.query_equal("users", "referredBy", "AAAA").await.unwrap();
        assert_eq!(referred.len(), 1);
        assert_eq!(referred[0].0, "u2");
    }
}
