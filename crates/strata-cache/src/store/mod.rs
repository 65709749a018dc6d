//! Remote store abstraction.
//!
//! The cache engine talks to its authoritative tier through [`RemoteStore`]:
//! five primitives, nothing more. Distributed locking is built strictly on
//! `set_if_absent` plus `compare_and_delete`; the store is never assumed to
//! provide native lock semantics.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheResult;

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Asynchronous key-value store with per-entry expiry and two conditional
/// primitives.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the raw bytes stored under `key`.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Unconditional overwrite with expiry.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Atomic conditional insert. Returns `true` when the key was absent
    /// and now holds `value`.
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<bool>;

    /// Remove `key` if present. Idempotent.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Atomic conditional delete: removes `key` only while it still holds
    /// `expected`. Returns `true` when a deletion happened.
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> CacheResult<bool>;
}
