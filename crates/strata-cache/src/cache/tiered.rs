//! Bounded local value tier in front of the remote engine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future;
use moka::future::Cache as LocalCache;

use crate::cache::Cache;
use crate::cache::direct::DirectCache;
use crate::error::{BoxError, CacheResult};

/// In-process tier (positive results only) over a [`DirectCache`].
///
/// The remote tier stays authoritative: peers' local tiers are not updated
/// on writes or invalidations, and the resulting staleness is bounded by
/// the local TTL. Negative results are never held locally, so their
/// staleness is bounded by the remote negative TTL alone.
///
/// The tier is keyed by the serialized key string and bounded by a maximum
/// entry count with LRU-class eviction plus a fixed time-to-live.
pub struct TieredCache<K, V> {
    local: LocalCache<String, Arc<V>>,
    direct: DirectCache<K, V>,
}

impl<K, V> TieredCache<K, V>
where
    K: Send + Sync,
    V: Send + Sync + 'static,
{
    pub fn new(max_entries: u64, local_ttl: Duration, direct: DirectCache<K, V>) -> Self {
        let local = LocalCache::builder()
            .max_capacity(max_entries)
            .time_to_live(local_ttl)
            .build();
        Self { local, direct }
    }

    /// Read-through load; a local hit short-circuits, and only a present
    /// result is written back to the local tier.
    pub async fn get_or_load<F, Fut>(&self, key: &K, load: F) -> CacheResult<Option<Arc<V>>>
    where
        F: FnOnce(&K) -> Fut,
        Fut: Future<Output = Result<Option<V>, BoxError>>,
    {
        let serialized = self.direct.serialize_key(key)?;
        if let Some(value) = self.local.get(&serialized).await {
            return Ok(Some(value));
        }
        let value = self.direct.get_or_load(key, load).await?;
        if let Some(value) = &value {
            self.local.insert(serialized, Arc::clone(value)).await;
        }
        Ok(value)
    }

    /// Number of entries currently held by the local tier.
    pub fn local_entries(&self) -> u64 {
        self.local.entry_count()
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for TieredCache<K, V>
where
    K: Send + Sync,
    V: Send + Sync + 'static,
{
    async fn get_if_present(&self, key: &K) -> CacheResult<Option<Arc<V>>> {
        let serialized = self.direct.serialize_key(key)?;
        if let Some(value) = self.local.get(&serialized).await {
            return Ok(Some(value));
        }
        let value = self.direct.get_if_present(key).await?;
        if let Some(value) = &value {
            self.local.insert(serialized, Arc::clone(value)).await;
        }
        Ok(value)
    }

    async fn put(&self, key: &K, value: V) -> CacheResult<()> {
        let serialized = self.direct.serialize_key(key)?;
        let value = Arc::new(value);
        self.local.insert(serialized, Arc::clone(&value)).await;
        self.direct.put_ref(key, &value).await
    }

    async fn put_all(&self, entries: Vec<(K, V)>) -> CacheResult<()> {
        let mut remote = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let serialized = self.direct.serialize_key(&key)?;
            let value = Arc::new(value);
            self.local.insert(serialized, Arc::clone(&value)).await;
            remote.push((key, value));
        }
        let results = future::join_all(
            remote
                .iter()
                .map(|(key, value)| self.direct.put_ref(key, value)),
        )
        .await;
        results.into_iter().collect()
    }

    async fn invalidate(&self, key: &K) -> CacheResult<()> {
        let serialized = self.direct.serialize_key(key)?;
        self.local.invalidate(&serialized).await;
        self.direct.invalidate(key).await
    }

    async fn invalidate_all(&self, keys: Vec<K>) -> CacheResult<()> {
        for key in &keys {
            let serialized = self.direct.serialize_key(key)?;
            self.local.invalidate(&serialized).await;
        }
        let results = future::join_all(keys.iter().map(|key| self.direct.invalidate(key))).await;
        results.into_iter().collect()
    }
}
