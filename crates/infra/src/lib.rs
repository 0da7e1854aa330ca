//! Infrastructure layer: storage backends, cache port, config, and the Order
//! Service that orchestrates them.

pub mod cache;
pub mod config;
pub mod order_service;
pub mod store;

pub use cache::{CacheError, CacheInvalidator, NoopCacheInvalidator};
pub use config::{AppConfig, ConfigError};
pub use order_service::{OrderService, OrderServiceError, RetryPolicy};
pub use store::{InMemoryOrderStore, OrderStore, OrderTransaction, PostgresOrderStore, StoreError};
