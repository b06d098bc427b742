//! The key/value contract the application store and ticket registry
//! persist through: per-name hash fields plus one atomic counter,
//! grounded in the original implementation's `redis.hset`/`hget`/`hdel`/
//! `hgetall`/`incr` calls against hashes `mfcloud-apps`,
//! `mfcloud-deployments`, `vars`, and counter `mfcloud-ticket-id`.
//! Swapping in a real backing store (redis, sqlite, etcd) means writing
//! one more impl of [`KvStore`]; nothing above this trait needs to change.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::McloudResult;
use crate::ids::InMemoryCounter;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn hget(&self, hash: &str, field: &str) -> McloudResult<Option<String>>;
    async fn hset(&self, hash: &str, field: &str, value: String) -> McloudResult<()>;
    async fn hdel(&self, hash: &str, field: &str) -> McloudResult<()>;
    async fn hgetall(&self, hash: &str) -> McloudResult<HashMap<String, String>>;

    /// Atomically increment the counter at `key` and return the new value.
    /// Implementations backed by an unavailable store should fall back to
    /// an in-memory counter rather than fail the caller outright.
    async fn incr(&self, key: &str) -> McloudResult<u64>;
}

/// Reference `KvStore`: one process-local map per hash name, plus one
/// [`InMemoryCounter`] per counter key. Used in tests and as the default
/// store when no persistent backend is configured.
#[derive(Default)]
pub struct InMemoryKvStore {
    hashes: DashMap<String, DashMap<String, String>>,
    counters: DashMap<String, InMemoryCounter>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn hget(&self, hash: &str, field: &str) -> McloudResult<Option<String>> {
        Ok(self.hashes.get(hash).and_then(|h| h.get(field).map(|v| v.clone())))
    }

    async fn hset(&self, hash: &str, field: &str, value: String) -> McloudResult<()> {
        self.hashes
            .entry(hash.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn hdel(&self, hash: &str, field: &str) -> McloudResult<()> {
        if let Some(h) = self.hashes.get(hash) {
            h.remove(field);
        }
        Ok(())
    }

    async fn hgetall(&self, hash: &str) -> McloudResult<HashMap<String, String>> {
        Ok(self
            .hashes
            .get(hash)
            .map(|h| h.iter().map(|kv| (kv.key().clone(), kv.value().clone())).collect())
            .unwrap_or_default())
    }

    async fn incr(&self, key: &str) -> McloudResult<u64> {
        let counter = self
            .counters
            .entry(key.to_string())
            .or_insert_with(InMemoryCounter::new);
        Ok(counter.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_starts_at_one_and_is_monotonic_per_key() {
        let store = InMemoryKvStore::new();
        assert_eq!(store.incr("mcloud-ticket-id").await.unwrap(), 1);
        assert_eq!(store.incr("mcloud-ticket-id").await.unwrap(), 2);
        assert_eq!(store.incr("other-key").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn hash_set_get_del_round_trip() {
        let store = InMemoryKvStore::new();
        assert_eq!(store.hget("mcloud-apps", "demo").await.unwrap(), None);
        store.hset("mcloud-apps", "demo", "{}".into()).await.unwrap();
        assert_eq!(store.hget("mcloud-apps", "demo").await.unwrap(), Some("{}".to_string()));
        store.hdel("mcloud-apps", "demo").await.unwrap();
        assert_eq!(store.hget("mcloud-apps", "demo").await.unwrap(), None);
    }

    #[tokio::test]
    async fn hgetall_returns_every_field_in_the_hash() {
        let store = InMemoryKvStore::new();
        store.hset("mcloud-apps", "demo", "{}".into()).await.unwrap();
        store.hset("mcloud-apps", "other", "{}".into()).await.unwrap();
        let all = store.hgetall("mcloud-apps").await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains_key("demo"));
        assert!(all.contains_key("other"));
    }
}
