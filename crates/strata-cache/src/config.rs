//! Declarative configuration consumed by the cache factory.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CacheResult;
use crate::store::RedisStore;

/// Redis connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

impl RedisSettings {
    /// Open a pooled store with these settings.
    pub fn connect(&self) -> CacheResult<RedisStore> {
        RedisStore::from_url(
            &self.url,
            self.pool_size,
            Duration::from_millis(self.timeout_ms),
        )
    }
}

/// Policy profile for one cache namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheProfile {
    /// Minimum value TTL in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Exclusive upper bound for jittered TTLs; unset disables jitter.
    #[serde(default)]
    pub max_ttl_secs: Option<u64>,

    /// Cache confirmed-absent results for this many seconds.
    #[serde(default)]
    pub negative_ttl_secs: Option<u64>,

    /// Protect misses with a distributed load lock of this many seconds.
    #[serde(default)]
    pub lock_ttl_secs: Option<u64>,

    /// Put an in-process tier in front of the remote one.
    #[serde(default)]
    pub local_tier: bool,

    /// Entry bound of the in-process tier.
    #[serde(default = "default_local_max_entries")]
    pub local_max_entries: u64,

    /// TTL of the in-process tier in seconds.
    #[serde(default = "default_local_ttl_secs")]
    pub local_ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    2_592_000 // 30 days
}

fn default_local_max_entries() -> u64 {
    1000
}

fn default_local_ttl_secs() -> u64 {
    30
}

impl Default for CacheProfile {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_ttl_secs: None,
            negative_ttl_secs: None,
            lock_ttl_secs: None,
            local_tier: false,
            local_max_entries: default_local_max_entries(),
            local_ttl_secs: default_local_ttl_secs(),
        }
    }
}
