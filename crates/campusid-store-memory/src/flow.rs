//! In-memory flow store.
//!
//! Entries expire by TTL; an expired entry behaves exactly like a
//! missing one. The single write lock makes `delete` report true to at
//! most one of any set of concurrent callers, which is the atomicity the
//! single-use code guarantee rests on.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use campusid_auth::storage::StorageError;
use campusid_auth::storage::flow::FlowStore;

struct Entry {
    value: Value,
    expires_at: OffsetDateTime,
}

impl Entry {
    fn is_live(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at
    }
}

/// TTL-aware in-memory key/value store.
#[derive(Default)]
pub struct InMemoryFlowStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryFlowStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired entries. Expiry is otherwise lazy; call this from a
    /// periodic task when the key population grows unbounded.
    pub async fn evict_expired(&self) {
        let now = OffsetDateTime::now_utc();
        self.entries.write().await.retain(|_, e| e.is_live(now));
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    /// Returns whether the store holds no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn put(
        &self,
        key: &str,
        value: Value,
        ttl: Duration,
        create_only: bool,
    ) -> Result<(), StorageError> {
        let now = OffsetDateTime::now_utc();
        let mut entries = self.entries.write().await;
        if create_only {
            if let Some(existing) = entries.get(key) {
                if existing.is_live(now) {
                    return Err(StorageError::AlreadyExists);
                }
            }
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let now = OffsetDateTime::now_utc();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let now = OffsetDateTime::now_utc();
        let mut entries = self.entries.write().await;
        match entries.remove(key) {
            Some(entry) => Ok(entry.is_live(now)),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryFlowStore::new();
        store
            .put("k", json!({"a": 1}), Duration::from_secs(60), false)
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));
        assert!(store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_only_conflict() {
        let store = InMemoryFlowStore::new();
        store
            .put("k", json!(1), Duration::from_secs(60), true)
            .await
            .unwrap();
        let err = store
            .put("k", json!(2), Duration::from_secs(60), true)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists));

        // A plain put overwrites.
        store
            .put("k", json!(3), Duration::from_secs(60), false)
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent() {
        let store = InMemoryFlowStore::new();
        store
            .put("k", json!(1), Duration::from_millis(10), true)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        // A dead key does not block create-only writes.
        store
            .put("k", json!(2), Duration::from_secs(60), true)
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_delete_of_expired_entry_reports_false() {
        let store = InMemoryFlowStore::new();
        store
            .put("k", json!(1), Duration::from_millis(10), true)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_deletes_have_one_winner() {
        let store = Arc::new(InMemoryFlowStore::new());
        for _ in 0..50 {
            store
                .put("code", json!(1), Duration::from_secs(60), true)
                .await
                .unwrap();

            let mut handles = Vec::new();
            for _ in 0..8 {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    store.delete("code").await.unwrap()
                }));
            }
            let mut winners = 0;
            for handle in handles {
                if handle.await.unwrap() {
                    winners += 1;
                }
            }
            assert_eq!(winners, 1);
        }
    }

    #[tokio::test]
    async fn test_evict_expired() {
        let store = InMemoryFlowStore::new();
        store
            .put("live", json!(1), Duration::from_secs(60), false)
            .await
            .unwrap();
        store
            .put("dead", json!(1), Duration::from_millis(10), false)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        store.evict_expired().await;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("live").await.unwrap(), Some(json!(1)));
    }
}
