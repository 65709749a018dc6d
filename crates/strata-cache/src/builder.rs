//! Fluent assembly of cache instances.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use strata_core::{DisplayKeySerializer, KeySerializer, ValueSerializer};

use crate::cache::direct::{CachePolicy, DirectCache, normalize_prefix};
use crate::cache::loading::DirectLoadingCache;
use crate::cache::tiered::TieredCache;
use crate::cache::tiered_loading::TieredLoadingCache;
use crate::cache::{Cache, Loader, LoadingCache};
use crate::config::CacheProfile;
use crate::store::RemoteStore;

/// Default value expiry: 30 days.
const DEFAULT_TTL_SECS: u64 = 2_592_000;

/// Default TTL for negative entries, load locks and the local tier.
const DEFAULT_SHORT_TTL: Duration = Duration::from_secs(30);

/// Default bound of the local tier.
const DEFAULT_LOCAL_MAX_ENTRIES: u64 = 1000;

/// Policy carrier for one cache namespace.
///
/// Collects TTL range, negative caching, stampede locking and local-tier
/// settings, then builds the variant the caller asks for.
pub struct CacheBuilder<K, V> {
    prefix: Option<String>,
    store: Arc<dyn RemoteStore>,
    key_serializer: Arc<dyn KeySerializer<K>>,
    value_serializer: Arc<dyn ValueSerializer<V>>,
    negative_ttl: Option<Duration>,
    lock_ttl: Option<Duration>,
    ttl_seconds: u64,
    max_ttl_seconds: Option<u64>,
    local_max_entries: u64,
    local_ttl: Duration,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Builder with the key's `Display` form as its serialized shape.
    pub fn new(
        store: Arc<dyn RemoteStore>,
        value_serializer: Arc<dyn ValueSerializer<V>>,
    ) -> Self
    where
        K: Display,
    {
        Self::with_key_serializer(store, value_serializer, Arc::new(DisplayKeySerializer))
    }

    /// Builder with an explicit key codec, for keys without a usable
    /// `Display` form.
    pub fn with_key_serializer(
        store: Arc<dyn RemoteStore>,
        value_serializer: Arc<dyn ValueSerializer<V>>,
        key_serializer: Arc<dyn KeySerializer<K>>,
    ) -> Self {
        Self {
            prefix: None,
            store,
            key_serializer,
            value_serializer,
            negative_ttl: None,
            lock_ttl: None,
            ttl_seconds: DEFAULT_TTL_SECS,
            max_ttl_seconds: None,
            local_max_entries: DEFAULT_LOCAL_MAX_ENTRIES,
            local_ttl: DEFAULT_SHORT_TTL,
        }
    }

    /// Key prefix shared by every namespace built from this builder.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Replace the key codec.
    pub fn key_serializer(mut self, key_serializer: Arc<dyn KeySerializer<K>>) -> Self {
        self.key_serializer = key_serializer;
        self
    }

    /// Cache confirmed-absent results for `ttl`, shielding the loader from
    /// repeated lookups of keys that do not exist.
    pub fn cache_negative(mut self, ttl: Duration) -> Self {
        self.negative_ttl = Some(ttl);
        self
    }

    /// Protect misses with a distributed load lock.
    ///
    /// Acquisition is non-blocking: callers that lose the race observe a
    /// transient miss instead of waiting. This is a latency-over-consistency
    /// policy; pick `ttl` longer than the slowest expected loader run.
    pub fn enable_lock(mut self, ttl: Duration) -> Self {
        self.lock_ttl = Some(ttl);
        self
    }

    /// Fixed value expiry.
    pub fn expire_after_write(mut self, ttl: Duration) -> Self {
        self.ttl_seconds = ttl.as_secs().max(1);
        self.max_ttl_seconds = None;
        self
    }

    /// Jittered value expiry: each write expires at a uniformly random
    /// point in `[min, max)`.
    pub fn expire_after_write_range(mut self, min: Duration, max: Duration) -> Self {
        self.ttl_seconds = min.as_secs().max(1);
        self.max_ttl_seconds = Some(max.as_secs().max(1));
        self
    }

    /// Size and TTL of the in-process tier used by the tiered variants.
    pub fn local_tier(mut self, max_entries: u64, ttl: Duration) -> Self {
        self.local_max_entries = max_entries;
        self.local_ttl = ttl;
        self
    }

    /// Overwrite the policy knobs from a declarative profile.
    pub fn apply_profile(mut self, profile: &CacheProfile) -> Self {
        self.ttl_seconds = profile.ttl_secs.max(1);
        self.max_ttl_seconds = profile.max_ttl_secs.map(|secs| secs.max(1));
        self.negative_ttl = profile.negative_ttl_secs.map(Duration::from_secs);
        self.lock_ttl = profile.lock_ttl_secs.map(Duration::from_secs);
        self.local_max_entries = profile.local_max_entries;
        self.local_ttl = Duration::from_secs(profile.local_ttl_secs);
        self
    }

    /// Remote-only cache under the given namespace.
    pub fn build_direct(self, namespace: &str) -> DirectCache<K, V> {
        let prefix = format!(
            "{}{}",
            normalize_prefix(self.prefix.as_deref().unwrap_or("")),
            namespace
        );
        DirectCache::new(
            &prefix,
            CachePolicy {
                lock_ttl: self.lock_ttl,
                negative_ttl: self.negative_ttl,
                ttl_seconds: self.ttl_seconds,
                max_ttl_seconds: self.max_ttl_seconds,
            },
            self.key_serializer,
            self.value_serializer,
            self.store,
        )
    }

    /// Loader-bound remote-only cache.
    pub fn build_loading(self, namespace: &str, loader: Loader<K, V>) -> DirectLoadingCache<K, V>
    where
        K: Clone,
    {
        DirectLoadingCache::new(self.build_direct(namespace), loader)
    }

    /// Local value tier in front of the remote cache.
    pub fn build_tiered(self, namespace: &str) -> TieredCache<K, V> {
        let max_entries = self.local_max_entries;
        let local_ttl = self.local_ttl;
        TieredCache::new(max_entries, local_ttl, self.build_direct(namespace))
    }

    /// Local single-flight tier in front of the loader-bound remote cache.
    pub fn build_tiered_loading(
        self,
        namespace: &str,
        loader: Loader<K, V>,
    ) -> TieredLoadingCache<K, V>
    where
        K: Clone,
    {
        let local_ttl = self.local_ttl;
        TieredLoadingCache::new(local_ttl, self.build_direct(namespace), loader)
    }
}

/// Vends builders that share one store handle and key prefix.
pub struct CacheFactory {
    prefix: String,
    store: Arc<dyn RemoteStore>,
}

impl CacheFactory {
    /// `prefix` may be empty; it is prepended to every namespace.
    pub fn new(prefix: impl Into<String>, store: Arc<dyn RemoteStore>) -> Self {
        Self {
            prefix: prefix.into(),
            store,
        }
    }

    /// Fresh builder for one namespace's policy.
    pub fn builder<K, V>(&self, value_serializer: Arc<dyn ValueSerializer<V>>) -> CacheBuilder<K, V>
    where
        K: Display + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        CacheBuilder::new(Arc::clone(&self.store), value_serializer).prefix(self.prefix.clone())
    }

    /// Assemble the variant a profile calls for: tiered when the local
    /// tier is enabled, remote-only otherwise.
    pub fn assemble<K, V>(
        &self,
        namespace: &str,
        profile: &CacheProfile,
        value_serializer: Arc<dyn ValueSerializer<V>>,
    ) -> Arc<dyn Cache<K, V>>
    where
        K: Display + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let builder = self.builder::<K, V>(value_serializer).apply_profile(profile);
        if profile.local_tier {
            Arc::new(builder.build_tiered(namespace))
        } else {
            Arc::new(builder.build_direct(namespace))
        }
    }

    /// Loader-bound counterpart of [`CacheFactory::assemble`].
    pub fn assemble_loading<K, V>(
        &self,
        namespace: &str,
        profile: &CacheProfile,
        value_serializer: Arc<dyn ValueSerializer<V>>,
        loader: Loader<K, V>,
    ) -> Arc<dyn LoadingCache<K, V>>
    where
        K: Display + Clone + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let builder = self.builder::<K, V>(value_serializer).apply_profile(profile);
        if profile.local_tier {
            Arc::new(builder.build_tiered_loading(namespace, loader))
        } else {
            Arc::new(builder.build_loading(namespace, loader))
        }
    }
}
