//! Tiered read-through caching over a remote key-value store.
//!
//! ## Architecture
//!
//! ```text
//! caller → local tier (in-process) → remote tier (Redis) → loader (DB/API)
//!              <1µs latency            ~ms latency          source of truth
//! ```
//!
//! Four variants share one engine:
//!
//! - [`DirectCache`] — remote tier only. Read-through loads are protected by
//!   a distributed, non-blocking load lock (stampede protection), absent
//!   results can be cached negatively, and stored TTLs are jittered inside a
//!   configured range so bursts of writes do not expire together.
//! - [`DirectLoadingCache`] — a [`DirectCache`] bound to a fixed loader.
//! - [`TieredCache`] — a bounded in-process tier (positive results only) in
//!   front of a [`DirectCache`].
//! - [`TieredLoadingCache`] — the in-process tier holds shared handles to
//!   in-flight loads, coalescing concurrent callers of one key inside the
//!   process on top of the distributed protection.
//!
//! The remote store is reached through the [`RemoteStore`] trait:
//! [`RedisStore`] in production, [`MemoryStore`] for tests and
//! single-instance deployments.

pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod store;

#[cfg(test)]
pub(crate) mod test_util;

pub use builder::{CacheBuilder, CacheFactory};
pub use cache::direct::DirectCache;
pub use cache::loading::DirectLoadingCache;
pub use cache::tiered::TieredCache;
pub use cache::tiered_loading::TieredLoadingCache;
pub use cache::{Cache, Loader, LoadingCache, loader};
pub use config::{CacheProfile, RedisSettings};
pub use error::{BoxError, CacheError, CacheResult};
pub use store::memory::MemoryStore;
pub use store::redis::RedisStore;
pub use store::RemoteStore;

pub use strata_core::{
    CodecError, DisplayKeySerializer, JsonSerializer, KeySerializer, MessagePackSerializer,
    StringSerializer, ValueSerializer,
};
