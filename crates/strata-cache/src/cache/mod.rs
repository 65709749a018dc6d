//! The cache abstraction family.
//!
//! [`direct::DirectCache`] is the terminal authority over the remote store;
//! the other variants compose it. Every variant hands values out as
//! `Arc<V>` so a hit never clones the cached payload.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::{BoxError, CacheResult};

pub mod direct;
pub mod loading;
pub mod tiered;
pub mod tiered_loading;

/// Loader bound to a loading cache: maps a key to its value, `None` for
/// confirmed-absent. Loader failures surface to the caller, never swallowed.
pub type Loader<K, V> =
    Arc<dyn Fn(K) -> BoxFuture<'static, Result<Option<V>, BoxError>> + Send + Sync>;

/// Wrap an async function as a [`Loader`].
pub fn loader<K, V, F, Fut>(load: F) -> Loader<K, V>
where
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<V>, BoxError>> + Send + 'static,
{
    Arc::new(move |key| load(key).boxed())
}

/// Operations shared by every cache variant.
#[async_trait]
pub trait Cache<K: Send + Sync, V: Send + Sync>: Send + Sync {
    /// Look the key up without ever invoking a loader.
    async fn get_if_present(&self, key: &K) -> CacheResult<Option<Arc<V>>>;

    /// Write-through put.
    async fn put(&self, key: &K, value: V) -> CacheResult<()>;

    /// Concurrent per-entry puts. Every entry is dispatched; the first
    /// failure is surfaced after all siblings have settled.
    async fn put_all(&self, entries: Vec<(K, V)>) -> CacheResult<()>;

    /// Drop the key. Missing keys are a no-op.
    async fn invalidate(&self, key: &K) -> CacheResult<()>;

    /// Concurrent per-key invalidation.
    async fn invalidate_all(&self, keys: Vec<K>) -> CacheResult<()>;
}

/// A cache bound to a fixed loader at construction.
#[async_trait]
pub trait LoadingCache<K: Send + Sync, V: Send + Sync>: Cache<K, V> {
    /// Read-through get with the bound loader.
    async fn get(&self, key: &K) -> CacheResult<Option<Arc<V>>>;
}
