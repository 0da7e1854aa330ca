//! Process configuration loaded from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::order_service::RetryPolicy;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Postgres URL. The in-memory store is used when absent.
    pub database_url: Option<String>,
    /// Redis URL of the read cache. Invalidation is a no-op when absent.
    pub redis_url: Option<String>,
    /// Bounded wait for one row lock.
    pub lock_timeout: Duration,
    pub retry: RetryPolicy,
    /// Bounded wait for one post-commit cache invalidation.
    pub cache_timeout: Duration,
    /// Outbound notification buffer per live connection.
    pub connection_buffer: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map here).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = match get("BIND_ADDR") {
            Some(raw) => parse("BIND_ADDR", raw)?,
            None => parse("BIND_ADDR", DEFAULT_BIND_ADDR.to_string())?,
        };

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using the insecure development secret");
            DEV_JWT_SECRET.to_string()
        });

        let lock_timeout_ms: u64 = parse_or("LOCK_TIMEOUT_MS", get("LOCK_TIMEOUT_MS"), 2_000)?;
        let max_retries: u32 = parse_or("MAX_RETRIES", get("MAX_RETRIES"), 3)?;
        let backoff_ms: u64 = parse_or("RETRY_BACKOFF_MS", get("RETRY_BACKOFF_MS"), 25)?;
        let cache_timeout_ms: u64 = parse_or("CACHE_TIMEOUT_MS", get("CACHE_TIMEOUT_MS"), 1_000)?;
        let connection_buffer: usize = parse_or("CONNECTION_BUFFER", get("CONNECTION_BUFFER"), 32)?;

        if lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "LOCK_TIMEOUT_MS",
                value: lock_timeout_ms.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if cache_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "CACHE_TIMEOUT_MS",
                value: cache_timeout_ms.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if connection_buffer == 0 {
            return Err(ConfigError::Invalid {
                key: "CONNECTION_BUFFER",
                value: connection_buffer.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self {
            bind_addr,
            jwt_secret,
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            retry: RetryPolicy {
                max_retries,
                base_backoff: Duration::from_millis(backoff_ms),
            },
            cache_timeout: Duration::from_millis(cache_timeout_ms),
            connection_buffer,
        })
    }
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("jwt_secret", &"<redacted>")
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("redis_url", &self.redis_url.as_ref().map(|_| "<set>"))
            .field("lock_timeout", &self.lock_timeout)
            .field("retry", &self.retry)
            .field("cache_timeout", &self.cache_timeout)
            .field("connection_buffer", &self.connection_buffer)
            .finish()
    }
}

fn parse<T>(key: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value: raw,
    })
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.map_or(Ok(default), |raw| parse(key, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.redis_url, None);
        assert_eq!(cfg.lock_timeout, Duration::from_millis(2_000));
        assert_eq!(cfg.retry, RetryPolicy::default());
        assert_eq!(cfg.cache_timeout, Duration::from_millis(1_000));
        assert_eq!(cfg.connection_buffer, 32);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("JWT_SECRET", "s3cret"),
            ("DATABASE_URL", "postgres://localhost/orders"),
            ("LOCK_TIMEOUT_MS", "500"),
            ("MAX_RETRIES", "0"),
            ("CONNECTION_BUFFER", "4"),
            ("CACHE_TIMEOUT_MS", "250"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.jwt_secret, "s3cret");
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/orders"));
        assert_eq!(cfg.lock_timeout, Duration::from_millis(500));
        assert_eq!(cfg.retry.max_retries, 0);
        assert_eq!(cfg.connection_buffer, 4);
        assert_eq!(cfg.cache_timeout, Duration::from_millis(250));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = config(&[("DATABASE_URL", "  "), ("MAX_RETRIES", "")]).unwrap();
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.retry.max_retries, 3);
    }

    #[test]
    fn invalid_numbers_are_rejected_with_key() {
        let err = config(&[("MAX_RETRIES", "many")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MAX_RETRIES", .. }));

        let err = config(&[("CONNECTION_BUFFER", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CONNECTION_BUFFER", .. }));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let cfg = config(&[("JWT_SECRET", "s3cret"), ("DATABASE_URL", "postgres://u:pw@db/x")]).unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("pw@db"));
    }
}
