//! Loader-bound remote cache.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::direct::DirectCache;
use crate::cache::{Cache, Loader, LoadingCache};
use crate::error::CacheResult;

/// A [`DirectCache`] bound to a fixed loader.
///
/// `get` is `DirectCache::get_or_load` with the bound loader; everything
/// else delegates unchanged.
pub struct DirectLoadingCache<K, V> {
    direct: DirectCache<K, V>,
    loader: Loader<K, V>,
}

impl<K, V> DirectLoadingCache<K, V>
where
    K: Clone + Send + Sync,
    V: Send + Sync + 'static,
{
    pub fn new(direct: DirectCache<K, V>, loader: Loader<K, V>) -> Self {
        Self { direct, loader }
    }
}

#[async_trait]
impl<K, V> LoadingCache<K, V> for DirectLoadingCache<K, V>
where
    K: Clone + Send + Sync,
    V: Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> CacheResult<Option<Arc<V>>> {
        self.direct
            .get_or_load(key, |k| (*self.loader)(k.clone()))
            .await
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for DirectLoadingCache<K, V>
where
    K: Clone + Send + Sync,
    V: Send + Sync + 'static,
{
    async fn get_if_present(&self, key: &K) -> CacheResult<Option<Arc<V>>> {
        self.direct.get_if_present(key).await
    }

    async fn put(&self, key: &K, value: V) -> CacheResult<()> {
        self.direct.put(key, value).await
    }

    async fn put_all(&self, entries: Vec<(K, V)>) -> CacheResult<()> {
        self.direct.put_all(entries).await
    }

    async fn invalidate(&self, key: &K) -> CacheResult<()> {
        self.direct.invalidate(key).await
    }

    async fn invalidate_all(&self, keys: Vec<K>) -> CacheResult<()> {
        self.direct.invalidate_all(keys).await
    }
}
