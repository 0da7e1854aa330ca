//! Redis-backed cache invalidation (optional `redis` feature).

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use super::{CacheError, CacheInvalidator};

/// Flushes the configured Redis database on every invalidation.
///
/// The database selected by the URL must be dedicated to the read cache.
#[derive(Clone)]
pub struct RedisCacheInvalidator {
    conn: MultiplexedConnection,
}

impl RedisCacheInvalidator {
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url).map_err(|e| CacheError::Backend(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(Self { conn })
    }
}

impl core::fmt::Debug for RedisCacheInvalidator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisCacheInvalidator").finish_non_exhaustive()
    }
}

#[async_trait]
impl CacheInvalidator for RedisCacheInvalidator {
    async fn invalidate(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("FLUSHDB")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }
}
