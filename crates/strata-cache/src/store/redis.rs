//! Redis-backed remote store on a deadpool connection pool.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use redis::{AsyncCommands, Script};

use crate::error::{CacheError, CacheResult};
use crate::store::RemoteStore;

/// Compare-and-delete, atomic on the server side: the key is removed only
/// while it still holds the expected value. Lock release goes through this
/// so a lock that expired and was reacquired elsewhere is never deleted by
/// the previous holder.
static RELEASE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        "if redis.call('get', KEYS[1]) == ARGV[1] then return redis.call('del', KEYS[1]) else return 0 end",
    )
});

/// [`RemoteStore`] implementation over a Redis connection pool.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Wrap an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Connect to `url` with a bounded pool and per-connection timeouts.
    pub fn from_url(url: &str, pool_size: usize, timeout: Duration) -> CacheResult<Self> {
        tracing::info!(url = %url, pool_size, "connecting to Redis");

        let mut config = Config::from_url(url);
        let pool_config = config.pool.get_or_insert_with(PoolConfig::default);
        pool_config.max_size = pool_size;
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);

        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(CacheError::store)?;
        Ok(Self { pool })
    }

    async fn connection(&self) -> CacheResult<Connection> {
        self.pool.get().await.map_err(CacheError::store)
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(CacheError::store)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs(ttl))
            .await
            .map_err(CacheError::store)
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(CacheError::store)?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await.map_err(CacheError::store)
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> CacheResult<bool> {
        let mut conn = self.connection().await?;
        let deleted: i64 = RELEASE_SCRIPT
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(CacheError::store)?;
        Ok(deleted > 0)
    }
}

/// Redis expiries are whole seconds; anything shorter is clamped up to 1s.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
