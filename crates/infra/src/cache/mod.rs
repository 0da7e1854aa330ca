//! Cache Invalidation Port.
//!
//! The Order Service calls [`CacheInvalidator::invalidate`] after every
//! committed mutation. Invalidation is whole-cache: any cached read may be
//! stale after a write, so all of it is dropped.

#[cfg(feature = "redis")]
pub mod redis;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(feature = "redis")]
pub use self::redis::RedisCacheInvalidator;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self) -> Result<(), CacheError>;
}

/// Used when no external read cache is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCacheInvalidator;

#[async_trait]
impl CacheInvalidator for NoopCacheInvalidator {
    async fn invalidate(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
