//! Remote-only cache engine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future;
use rand::Rng;
use uuid::Uuid;

use strata_core::{KeySerializer, ValueSerializer};

use crate::cache::Cache;
use crate::error::{BoxError, CacheError, CacheResult};
use crate::store::RemoteStore;

/// Reserved byte sequence standing for a confirmed-absent value.
///
/// Value codecs must never produce these bytes for a real value. An empty
/// payload is treated the same way.
pub(crate) const NEGATIVE_MARKER: &[u8] = b"::$$::_null_::$$::";

pub(crate) fn is_negative(bytes: &[u8]) -> bool {
    bytes.is_empty() || bytes == NEGATIVE_MARKER
}

/// Normalize a key prefix segment: blank contributes nothing, anything else
/// ends in exactly one `:`.
pub(crate) fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim();
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.ends_with(':') {
        trimmed.to_string()
    } else {
        format!("{trimmed}:")
    }
}

/// Policy knobs shared between the builder and the engine.
#[derive(Debug, Clone)]
pub(crate) struct CachePolicy {
    pub lock_ttl: Option<Duration>,
    pub negative_ttl: Option<Duration>,
    pub ttl_seconds: u64,
    pub max_ttl_seconds: Option<u64>,
}

/// Outcome of a raw remote lookup.
enum RemoteHit<V> {
    Value(Arc<V>),
    Negative,
}

/// Remote-only cache: read-through load with distributed single-flight
/// protection, negative caching, jittered TTL, write-through put.
///
/// The effective remote key is `<prefix><namespace>:<serialized key>`; the
/// load lock for it lives under `lock_key:<effective key>`. The lock owner
/// token is unique per cache instance and lives for the process lifetime,
/// so an instance can never release a lock that expired and was reacquired
/// by another process.
pub struct DirectCache<K, V> {
    prefix: String,
    store: Arc<dyn RemoteStore>,
    key_serializer: Arc<dyn KeySerializer<K>>,
    value_serializer: Arc<dyn ValueSerializer<V>>,
    lock_ttl: Option<Duration>,
    negative_ttl: Option<Duration>,
    ttl_seconds: u64,
    max_ttl_seconds: Option<u64>,
    owner_token: Arc<str>,
}

impl<K, V> Clone for DirectCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            prefix: self.prefix.clone(),
            store: Arc::clone(&self.store),
            key_serializer: Arc::clone(&self.key_serializer),
            value_serializer: Arc::clone(&self.value_serializer),
            lock_ttl: self.lock_ttl,
            negative_ttl: self.negative_ttl,
            ttl_seconds: self.ttl_seconds,
            max_ttl_seconds: self.max_ttl_seconds,
            owner_token: Arc::clone(&self.owner_token),
        }
    }
}

impl<K, V> DirectCache<K, V>
where
    K: Send + Sync,
    V: Send + Sync + 'static,
{
    pub(crate) fn new(
        prefix: &str,
        policy: CachePolicy,
        key_serializer: Arc<dyn KeySerializer<K>>,
        value_serializer: Arc<dyn ValueSerializer<V>>,
        store: Arc<dyn RemoteStore>,
    ) -> Self {
        Self {
            prefix: normalize_prefix(prefix),
            store,
            key_serializer,
            value_serializer,
            lock_ttl: policy.lock_ttl,
            negative_ttl: policy.negative_ttl,
            ttl_seconds: policy.ttl_seconds.max(1),
            max_ttl_seconds: policy.max_ttl_seconds.map(|secs| secs.max(1)),
            owner_token: Uuid::new_v4().simple().to_string().into(),
        }
    }

    pub(crate) fn serialize_key(&self, key: &K) -> CacheResult<String> {
        Ok(self.key_serializer.serialize(key)?)
    }

    fn remote_key(&self, serialized: &str) -> String {
        format!("{}{}", self.prefix, serialized)
    }

    fn lock_key(remote_key: &str) -> String {
        format!("lock_key:{remote_key}")
    }

    /// Read-through load.
    ///
    /// On a miss the caller first competes for the distributed load lock
    /// (when enabled). Losing the race reports `Ok(None)` — a transient
    /// miss — instead of waiting on the winner. That trades consistency for
    /// latency: a loader that outlives the lock TTL can run more than once
    /// per expiry.
    pub async fn get_or_load<F, Fut>(&self, key: &K, load: F) -> CacheResult<Option<Arc<V>>>
    where
        F: FnOnce(&K) -> Fut,
        Fut: Future<Output = Result<Option<V>, BoxError>>,
    {
        let serialized = self.serialize_key(key)?;
        let remote_key = self.remote_key(&serialized);
        match self.remote_lookup(&remote_key).await? {
            Some(RemoteHit::Value(value)) => return Ok(Some(value)),
            Some(RemoteHit::Negative) => return Ok(None),
            None => {}
        }

        let lock_key = match self.lock_ttl {
            Some(lock_ttl) => {
                let lock_key = Self::lock_key(&remote_key);
                let acquired = self
                    .store
                    .set_if_absent(&lock_key, self.owner_token.as_bytes(), lock_ttl)
                    .await?;
                if !acquired {
                    tracing::debug!(key = %remote_key, "load lock held elsewhere, reporting miss");
                    return Ok(None);
                }
                Some(lock_key)
            }
            None => None,
        };

        let outcome = self.load_and_store(key, &remote_key, load).await;

        // Released on every exit path, load success or not. A failed
        // release is logged; the lock TTL reclaims it.
        if let Some(lock_key) = lock_key {
            match self
                .store
                .compare_and_delete(&lock_key, self.owner_token.as_bytes())
                .await
            {
                Ok(released) => {
                    tracing::debug!(key = %lock_key, released, "load lock released");
                }
                Err(e) => {
                    tracing::warn!(key = %lock_key, error = %e, "failed to release load lock");
                }
            }
        }

        outcome
    }

    async fn remote_lookup(&self, remote_key: &str) -> CacheResult<Option<RemoteHit<V>>> {
        let Some(bytes) = self.store.get(remote_key).await? else {
            tracing::debug!(key = %remote_key, "cache miss");
            return Ok(None);
        };
        if is_negative(&bytes) {
            tracing::debug!(key = %remote_key, "negative cache hit");
            return Ok(Some(RemoteHit::Negative));
        }
        let value = self.value_serializer.deserialize(&bytes)?;
        Ok(Some(RemoteHit::Value(Arc::new(value))))
    }

    async fn load_and_store<F, Fut>(
        &self,
        key: &K,
        remote_key: &str,
        load: F,
    ) -> CacheResult<Option<Arc<V>>>
    where
        F: FnOnce(&K) -> Fut,
        Fut: Future<Output = Result<Option<V>, BoxError>>,
    {
        match load(key).await.map_err(CacheError::loader)? {
            Some(value) => {
                let bytes = self.value_serializer.serialize(&value)?;
                let ttl = self.jittered_ttl();
                self.store.set(remote_key, &bytes, ttl).await?;
                tracing::debug!(key = %remote_key, ttl_secs = ttl.as_secs(), "loaded value stored");
                Ok(Some(Arc::new(value)))
            }
            None => {
                if let Some(negative_ttl) = self.negative_ttl {
                    self.store
                        .set(remote_key, NEGATIVE_MARKER, negative_ttl)
                        .await?;
                    tracing::debug!(key = %remote_key, "absent result cached");
                }
                Ok(None)
            }
        }
    }

    /// TTL for a stored value. With a configured range, each write gets a
    /// uniformly random expiry in `[min, max)` so a burst of writes does
    /// not expire in the same instant.
    fn jittered_ttl(&self) -> Duration {
        let seconds = match self.max_ttl_seconds {
            Some(max) if max > self.ttl_seconds => {
                rand::thread_rng().gen_range(self.ttl_seconds..max)
            }
            _ => self.ttl_seconds,
        };
        Duration::from_secs(seconds)
    }

    pub(crate) async fn put_ref(&self, key: &K, value: &V) -> CacheResult<()> {
        let serialized = self.serialize_key(key)?;
        let remote_key = self.remote_key(&serialized);
        let bytes = self.value_serializer.serialize(value)?;
        let ttl = self.jittered_ttl();
        self.store.set(&remote_key, &bytes, ttl).await
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for DirectCache<K, V>
where
    K: Send + Sync,
    V: Send + Sync + 'static,
{
    async fn get_if_present(&self, key: &K) -> CacheResult<Option<Arc<V>>> {
        let serialized = self.serialize_key(key)?;
        let remote_key = self.remote_key(&serialized);
        match self.remote_lookup(&remote_key).await? {
            Some(RemoteHit::Value(value)) => Ok(Some(value)),
            Some(RemoteHit::Negative) | None => Ok(None),
        }
    }

    async fn put(&self, key: &K, value: V) -> CacheResult<()> {
        self.put_ref(key, &value).await
    }

    async fn put_all(&self, entries: Vec<(K, V)>) -> CacheResult<()> {
        let results = future::join_all(
            entries
                .iter()
                .map(|(key, value)| self.put_ref(key, value)),
        )
        .await;
        results.into_iter().collect()
    }

    async fn invalidate(&self, key: &K) -> CacheResult<()> {
        let serialized = self.serialize_key(key)?;
        self.store.delete(&self.remote_key(&serialized)).await
    }

    async fn invalidate_all(&self, keys: Vec<K>) -> CacheResult<()> {
        let results = future::join_all(keys.iter().map(|key| self.invalidate(key))).await;
        results.into_iter().collect()
    }
}
