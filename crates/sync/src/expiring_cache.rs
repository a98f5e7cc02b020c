//! Time-limited cache entries over the local key-value store.
//!
//! Each entry is stored as `{ value, expiry }`. Reading an entry past its
//! expiry treats it as absent and purges it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::kv_store::KvStore;

#[derive(Serialize, Deserialize)]
struct CacheEntry<T> {
    value: T,
    expiry: DateTime<Utc>,
}

/// Cache with caller-specified time-to-live per entry.
#[derive(Clone)]
pub struct ExpiringCache {
    store: Arc<dyn KvStore>,
    namespace: String,
}

impl core::fmt::Debug for ExpiringCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl ExpiringCache {
    /// Entries live under `cache:{key}` unless another namespace is chosen.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            namespace: "cache".to_string(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), StoreError> {
        self.set_at(key, value, ttl, Utc::now()).await
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.get_at(key, Utc::now()).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.store.delete(&self.full_key(key)).await
    }

    pub(crate) async fn set_at<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let entry = CacheEntry {
            value,
            expiry: now + ttl,
        };
        let record = serde_json::to_string(&entry)?;
        self.store.put(&self.full_key(key), &record).await
    }

    pub(crate) async fn get_at<T: DeserializeOwned>(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<T>, StoreError> {
        let full_key = self.full_key(key);
        let Some(record) = self.store.get(&full_key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<CacheEntry<T>>(&record) {
            Ok(entry) if entry.expiry > now => Ok(Some(entry.value)),
            Ok(_) => {
                tracing::debug!(key, "cache entry expired");
                self.store.delete(&full_key).await?;
                Ok(None)
            }
            Err(err) => {
                tracing::warn!(key, "discarding unreadable cache entry: {err}");
                self.store.delete(&full_key).await?;
                Ok(None)
            }
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::InMemoryKvStore;

    fn cache() -> (ExpiringCache, InMemoryKvStore) {
        let kv = InMemoryKvStore::new();
        (ExpiringCache::new(Arc::new(kv.clone())), kv)
    }

    #[tokio::test]
    async fn fresh_entries_are_returned() {
        let (cache, _) = cache();
        cache
            .set("feed:home", &vec!["P1".to_string(), "P2".to_string()], Duration::minutes(5))
            .await
            .unwrap();

        let feed: Option<Vec<String>> = cache.get("feed:home").await.unwrap();
        assert_eq!(feed.unwrap(), vec!["P1", "P2"]);
    }

    #[tokio::test]
    async fn expired_entries_are_absent_and_purged() {
        let (cache, kv) = cache();
        let now = Utc::now();
        cache.set_at("k", &42u32, Duration::seconds(30), now).await.unwrap();

        let before: Option<u32> = cache.get_at("k", now + Duration::seconds(29)).await.unwrap();
        assert_eq!(before, Some(42));

        let after: Option<u32> = cache.get_at("k", now + Duration::seconds(30)).await.unwrap();
        assert_eq!(after, None);
        assert_eq!(kv.get("cache:k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn entries_are_stored_as_value_and_expiry() {
        let (cache, kv) = cache();
        cache.set("k", &"v", Duration::hours(1)).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&kv.get("cache:k").await.unwrap().unwrap()).unwrap();
        assert_eq!(raw["value"], "v");
        assert!(raw["expiry"].is_string());
    }

    #[tokio::test]
    async fn wrongly_typed_entries_read_as_absent() {
        let (cache, kv) = cache();
        cache.set("k", &"text", Duration::hours(1)).await.unwrap();

        let as_number: Option<u64> = cache.get("k").await.unwrap();
        assert_eq!(as_number, None);
        assert_eq!(kv.get("cache:k").await.unwrap(), None);
    }
}
