//! In-process remote-store stand-in.
//!
//! Backs tests and single-instance deployments where Redis is not
//! available. Honors the same contract as the Redis store, including the
//! atomicity of the conditional primitives (per-entry, via the map's shard
//! locks).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::CacheResult;
use crate::store::RemoteStore;

#[derive(Debug, Clone)]
struct StoredEntry {
    bytes: Vec<u8>,
    expires_at: Instant,
}

impl StoredEntry {
    fn new(bytes: &[u8], ttl: Duration) -> Self {
        Self {
            bytes: bytes.to_vec(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// [`RemoteStore`] backed by a concurrent in-process map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining TTL of a live entry. `None` for missing or expired keys.
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.expires_at.saturating_duration_since(Instant::now()))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !entry.is_expired())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.bytes.clone()));
            }
            drop(entry);
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.entries
            .insert(key.to_string(), StoredEntry::new(value, ttl));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<bool> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().is_expired() => {
                occupied.insert(StoredEntry::new(value, ttl));
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> CacheResult<bool> {
        let removed = self
            .entries
            .remove_if(key, |_, entry| !entry.is_expired() && entry.bytes == expected);
        Ok(removed.is_some())
    }
}
