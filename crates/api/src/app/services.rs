use std::sync::Arc;

use anyhow::Context;

use orderflow_auth::{Hs256JwtValidator, JwtValidator};
use orderflow_events::NotificationHub;
use orderflow_infra::{
    AppConfig, CacheInvalidator, InMemoryOrderStore, NoopCacheInvalidator, OrderService, OrderStore,
    PostgresOrderStore,
};

/// Shared per-process services handed to every handler.
#[derive(Clone)]
pub struct AppServices {
    pub orders: OrderService,
    pub jwt: Arc<dyn JwtValidator>,
}

/// Select backends from configuration and wire the Order Service.
///
/// Postgres is used when `DATABASE_URL` is set (schema ensured on startup),
/// otherwise an in-memory store.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store: Arc<dyn OrderStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresOrderStore::connect(url, config.lock_timeout)
                .await
                .context("failed to connect to Postgres")?;
            store.ensure_schema().await.context("failed to ensure schema")?;
            tracing::info!("using postgres order store");
            Arc::new(store)
        }
        None => {
            tracing::info!("DATABASE_URL not set; using in-memory order store");
            Arc::new(InMemoryOrderStore::new(config.lock_timeout))
        }
    };

    let cache = build_cache(config).await?;
    let hub = NotificationHub::with_buffer(config.connection_buffer);

    Ok(AppServices {
        orders: OrderService::new(store, cache, hub)
            .with_retry(config.retry)
            .with_cache_timeout(config.cache_timeout),
        jwt: Arc::new(Hs256JwtValidator::new(config.jwt_secret.as_bytes())),
    })
}

#[cfg(feature = "redis")]
async fn build_cache(config: &AppConfig) -> anyhow::Result<Arc<dyn CacheInvalidator>> {
    match &config.redis_url {
        Some(url) => {
            let cache = orderflow_infra::cache::RedisCacheInvalidator::connect(url)
                .await
                .context("failed to connect to Redis")?;
            tracing::info!("using redis cache invalidation");
            Ok(Arc::new(cache))
        }
        None => Ok(Arc::new(NoopCacheInvalidator)),
    }
}

#[cfg(not(feature = "redis"))]
async fn build_cache(config: &AppConfig) -> anyhow::Result<Arc<dyn CacheInvalidator>> {
    if config.redis_url.is_some() {
        tracing::warn!("REDIS_URL set but redis feature not enabled; cache invalidation disabled");
    }
    Ok(Arc::new(NoopCacheInvalidator))
}
