use crate::domain::ports::KeyValueStore;
use crate::error::Result;
use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use serde_json::Value;
use std::time::{Duration, Instant};

const DEFAULT_CAPACITY: u64 = 100_000;

#[derive(Clone)]
struct Entry {
    value: Value,
    ttl: Duration,
}

/// Expires each entry after the ttl it was written with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// A bounded in-process key-value store with per-entry time-to-live.
///
/// Backed by `moka::future::Cache`, so expired entries are invisible to reads
/// without any cleanup task. Clones share the same cache.
#[derive(Clone)]
pub struct MokaKeyValueStore {
    cache: Cache<String, Entry>,
}

impl MokaKeyValueStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }
}

impl Default for MokaKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MokaKeyValueStore {
    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        self.cache.insert(key.to_string(), Entry { value, ttl }).await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.cache.remove(key).await.map(|entry| entry.value))
    }
}
