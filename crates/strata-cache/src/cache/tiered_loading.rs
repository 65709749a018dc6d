//! In-process single-flight tier over the remote engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{self, BoxFuture, Shared};

use crate::cache::direct::DirectCache;
use crate::cache::{Cache, Loader, LoadingCache};
use crate::error::{CacheError, CacheResult};

type SharedLoad<V> = Shared<BoxFuture<'static, Result<Option<Arc<V>>, Arc<CacheError>>>>;

/// A shared, awaitable reference to one in-progress or completed load.
///
/// Created atomically on the first local miss and handed to every
/// concurrent local caller of the same key. The underlying work runs in a
/// spawned task, so a waiter that goes away detaches from the handle
/// without stopping the load for the others.
struct InFlight<V> {
    load: SharedLoad<V>,
    inserted_at: Instant,
}

impl<V> Clone for InFlight<V> {
    fn clone(&self) -> Self {
        Self {
            load: self.load.clone(),
            inserted_at: self.inserted_at,
        }
    }
}

impl<V: Send + Sync + 'static> InFlight<V> {
    fn completed(value: Arc<V>) -> Self {
        Self {
            load: future::ready(Ok(Some(value))).boxed().shared(),
            inserted_at: Instant::now(),
        }
    }

    /// Completed and past the local TTL.
    fn is_stale(&self, local_ttl: Duration) -> bool {
        self.load.peek().is_some() && self.inserted_at.elapsed() >= local_ttl
    }
}

/// In-process single-flight coalescing in front of a [`DirectCache`] bound
/// to a fixed loader.
///
/// Where [`super::tiered::TieredCache`] keeps values, this variant keeps
/// handles to load computations: all concurrent local callers of one key
/// share a single remote read-through, on top of the distributed
/// single-flight the remote engine already provides. A completed handle
/// serves hits until the local TTL retires it.
///
/// `invalidate`/`invalidate_all` are rejected: a handle may be shared by
/// waiters that have not yet observed its result, and evicting it
/// mid-flight has no defined meaning for them.
pub struct TieredLoadingCache<K, V> {
    flights: DashMap<String, InFlight<V>>,
    local_ttl: Duration,
    direct: DirectCache<K, V>,
    loader: Loader<K, V>,
}

impl<K, V> TieredLoadingCache<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(local_ttl: Duration, direct: DirectCache<K, V>, loader: Loader<K, V>) -> Self {
        Self {
            flights: DashMap::new(),
            local_ttl,
            direct,
            loader,
        }
    }

    /// The current handle for the key: reused while pending or fresh,
    /// replaced once completed and past the local TTL. Insertion is atomic,
    /// so one process starts at most one concurrent load per key.
    fn flight_for(&self, serialized: &str, key: &K) -> InFlight<V> {
        match self.flights.entry(serialized.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_stale(self.local_ttl) {
                    let fresh = self.spawn_load(key.clone());
                    occupied.insert(fresh.clone());
                    fresh
                } else {
                    occupied.get().clone()
                }
            }
            Entry::Vacant(vacant) => {
                let fresh = self.spawn_load(key.clone());
                vacant.insert(fresh.clone());
                fresh
            }
        }
    }

    /// Start the remote read-through in its own task and wrap it in a
    /// shareable handle. The task owns everything it needs, so it keeps
    /// running when an individual waiter is cancelled.
    fn spawn_load(&self, key: K) -> InFlight<V> {
        let direct = self.direct.clone();
        let loader = Arc::clone(&self.loader);
        let task = tokio::spawn(async move {
            direct
                .get_or_load(&key, |k| (*loader)(k.clone()))
                .await
                .map_err(Arc::new)
        });
        let load = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(Arc::new(CacheError::loader(Box::new(e)))),
            }
        }
        .boxed()
        .shared();
        InFlight {
            load,
            inserted_at: Instant::now(),
        }
    }

    fn seed(&self, serialized: String, value: Arc<V>) {
        self.flights.insert(serialized, InFlight::completed(value));
    }
}

#[async_trait]
impl<K, V> LoadingCache<K, V> for TieredLoadingCache<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Await the current load for the key, starting one when none exists.
    async fn get(&self, key: &K) -> CacheResult<Option<Arc<V>>> {
        let serialized = self.direct.serialize_key(key)?;
        let flight = self.flight_for(&serialized, key);
        let outcome = flight.load.clone().await;
        match &outcome {
            Ok(Some(_)) => {}
            // An absent or failed load is not kept: the next caller goes
            // back through the remote tier instead of replaying this
            // handle until the local TTL runs out.
            _ => {
                self.flights
                    .remove_if(&serialized, |_, current| current.load.ptr_eq(&flight.load));
            }
        }
        outcome.map_err(|e| (*e).clone())
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for TieredLoadingCache<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Consults only already-completed local handles, then the remote
    /// tier. Never triggers a load.
    async fn get_if_present(&self, key: &K) -> CacheResult<Option<Arc<V>>> {
        let serialized = self.direct.serialize_key(key)?;
        if let Some(flight) = self.flights.get(&serialized) {
            if !flight.is_stale(self.local_ttl) {
                if let Some(Ok(Some(value))) = flight.load.peek() {
                    return Ok(Some(Arc::clone(value)));
                }
            }
        }
        let value = self.direct.get_if_present(key).await?;
        if let Some(value) = &value {
            self.seed(serialized, Arc::clone(value));
        }
        Ok(value)
    }

    async fn put(&self, key: &K, value: V) -> CacheResult<()> {
        let serialized = self.direct.serialize_key(key)?;
        let value = Arc::new(value);
        self.seed(serialized, Arc::clone(&value));
        self.direct.put_ref(key, &value).await
    }

    async fn put_all(&self, entries: Vec<(K, V)>) -> CacheResult<()> {
        let mut written = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let serialized = self.direct.serialize_key(&key)?;
            let value = Arc::new(value);
            self.seed(serialized, Arc::clone(&value));
            self.direct.put_ref(&key, &value).await?;
            written.push((key, value));
        }
        let results = future::join_all(
            written
                .iter()
                .map(|(key, value)| self.direct.put_ref(key, value)),
        )
        .await;
        results.into_iter().collect()
    }

    async fn invalidate(&self, _key: &K) -> CacheResult<()> {
        Err(CacheError::Unsupported {
            cache: "TieredLoadingCache",
            operation: "invalidate",
        })
    }

    async fn invalidate_all(&self, _keys: Vec<K>) -> CacheResult<()> {
        Err(CacheError::Unsupported {
            cache: "TieredLoadingCache",
            operation: "invalidate_all",
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::{Deserialize, Serialize};

    use strata_core::JsonSerializer;

    use super::*;
    use crate::builder::CacheBuilder;
    use crate::cache::loader;
    use crate::test_util::CountingStore;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: u64,
    }

    struct Fixture {
        cache: Arc<TieredLoadingCache<u64, Profile>>,
        store: Arc<CountingStore>,
        calls: Arc<AtomicUsize>,
    }

    fn fixture(local_ttl: Duration, loader_delay: Duration) -> Fixture {
        let store = Arc::new(CountingStore::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CacheBuilder::<u64, Profile>::new(store.clone(), Arc::new(JsonSerializer))
            .local_tier(100, local_ttl)
            .build_tiered_loading("profile", {
                let calls = Arc::clone(&calls);
                loader(move |id: u64| {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(loader_delay).await;
                        Ok(Some(Profile { id }))
                    }
                })
            });
        Fixture {
            cache: Arc::new(cache),
            store,
            calls,
        }
    }

    #[tokio::test]
    async fn concurrent_gets_share_one_load() {
        let Fixture { cache, calls, .. } =
            fixture(Duration::from_secs(30), Duration::from_millis(50));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get(&1).await })
            })
            .collect();

        let mut values = Vec::new();
        for task in tasks {
            values.push(task.await.unwrap().unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for value in &values {
            assert_eq!(**value, Profile { id: 1 });
            assert!(Arc::ptr_eq(value, &values[0]));
        }
    }

    #[tokio::test]
    async fn completed_handle_serves_hits_without_remote_trips() {
        let Fixture { cache, store, calls } =
            fixture(Duration::from_secs(30), Duration::from_millis(1));

        cache.get(&1).await.unwrap();
        let gets_after_first = store.gets();

        cache.get(&1).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.gets(), gets_after_first);
    }

    #[tokio::test]
    async fn stale_handle_refetches_through_the_remote_tier() {
        let Fixture { cache, store, calls } =
            fixture(Duration::from_millis(40), Duration::from_millis(1));

        cache.get(&1).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let gets_after_first = store.gets();

        tokio::time::sleep(Duration::from_millis(60)).await;

        // The reload finds the value still live remotely: one more remote
        // round trip, no loader call.
        let hit = cache.get(&1).await.unwrap().unwrap();
        assert_eq!(*hit, Profile { id: 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.gets(), gets_after_first + 1);
    }

    #[tokio::test]
    async fn absent_loads_are_not_pinned_locally() {
        let store = Arc::new(CountingStore::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CacheBuilder::<u64, Profile>::new(store.clone(), Arc::new(JsonSerializer))
            .build_tiered_loading("profile", {
                let calls = Arc::clone(&calls);
                loader(move |_id: u64| {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(None)
                    }
                })
            });

        assert_eq!(cache.get(&1).await.unwrap(), None);
        assert_eq!(cache.get(&1).await.unwrap(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_load_retires_the_handle() {
        let store = Arc::new(CountingStore::new());
        let attempts = Arc::new(AtomicUsize::new(0));
        let cache = CacheBuilder::<u64, Profile>::new(store.clone(), Arc::new(JsonSerializer))
            .build_tiered_loading("profile", {
                let attempts = Arc::clone(&attempts);
                loader(move |id: u64| {
                    let attempts = Arc::clone(&attempts);
                    async move {
                        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err("backend down".into())
                        } else {
                            Ok(Some(Profile { id }))
                        }
                    }
                })
            });

        assert!(matches!(cache.get(&1).await, Err(CacheError::Loader(_))));
        let hit = cache.get(&1).await.unwrap().unwrap();
        assert_eq!(*hit, Profile { id: 1 });
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn get_if_present_never_triggers_a_load() {
        let Fixture { cache, store, calls } =
            fixture(Duration::from_secs(30), Duration::from_millis(1));

        assert_eq!(cache.get_if_present(&1).await.unwrap(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.gets(), 1);
    }

    #[tokio::test]
    async fn get_if_present_seeds_the_local_tier_from_a_remote_hit() {
        let Fixture { cache, store, calls } =
            fixture(Duration::from_secs(30), Duration::from_millis(1));

        // Populate the remote tier through a sibling instance.
        let writer = CacheBuilder::<u64, Profile>::new(store.clone(), Arc::new(JsonSerializer))
            .build_direct("profile");
        writer.put(&1, Profile { id: 1 }).await.unwrap();

        let first = cache.get_if_present(&1).await.unwrap().unwrap();
        assert_eq!(*first, Profile { id: 1 });
        let gets_after_first = store.gets();

        let second = cache.get_if_present(&1).await.unwrap().unwrap();
        assert_eq!(*second, Profile { id: 1 });
        assert_eq!(store.gets(), gets_after_first);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn put_installs_a_completed_handle() {
        let Fixture { cache, store, calls } =
            fixture(Duration::from_secs(30), Duration::from_millis(1));

        cache.put(&1, Profile { id: 1 }).await.unwrap();
        let hit = cache.get(&1).await.unwrap().unwrap();
        assert_eq!(*hit, Profile { id: 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.gets(), 0);
        assert_eq!(store.sets(), 1);
    }

    #[tokio::test]
    async fn invalidation_is_unsupported() {
        let Fixture { cache, .. } = fixture(Duration::from_secs(30), Duration::from_millis(1));

        assert!(matches!(
            cache.invalidate(&1).await,
            Err(CacheError::Unsupported {
                operation: "invalidate",
                ..
            })
        ));
        assert!(matches!(
            cache.invalidate_all(vec![1, 2]).await,
            Err(CacheError::Unsupported {
                operation: "invalidate_all",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_stop_the_shared_load() {
        let Fixture { cache, calls, .. } =
            fixture(Duration::from_secs(30), Duration::from_millis(50));

        let waiter = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.get(&1).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        waiter.abort();

        // The spawned load keeps running; this call attaches to it.
        let hit = cache.get(&1).await.unwrap().unwrap();
        assert_eq!(*hit, Profile { id: 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
