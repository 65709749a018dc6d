//! Shared test doubles for the cache engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CacheError, CacheResult};
use crate::store::{MemoryStore, RemoteStore};

/// [`MemoryStore`] wrapper that counts remote round trips per primitive.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    gets: AtomicUsize,
    sets: AtomicUsize,
    conditional_sets: AtomicUsize,
    deletes: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn conditional_sets(&self) -> usize {
        self.conditional_sets.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for CountingStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl).await
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<bool> {
        self.conditional_sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> CacheResult<bool> {
        self.inner.compare_and_delete(key, expected).await
    }
}

/// [`MemoryStore`] wrapper whose `set` fails for keys containing a given
/// fragment; everything else passes through.
pub struct FlakyStore {
    inner: MemoryStore,
    fail_fragment: String,
}

impl FlakyStore {
    pub fn failing_set_for(fragment: impl Into<String>) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_fragment: fragment.into(),
        }
    }
}

#[async_trait]
impl RemoteStore for FlakyStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        if key.contains(&self.fail_fragment) {
            return Err(CacheError::Store(format!("injected failure for {key}")));
        }
        self.inner.set(key, value, ttl).await
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<bool> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.inner.delete(key).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> CacheResult<bool> {
        self.inner.compare_and_delete(key, expected).await
    }
}
