//! Runtime selection of the configured providers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use seatgate_core::config::{CacheConfig, CoordinationConfig};
use seatgate_core::error::AppError;
use seatgate_core::result::AppResult;
use seatgate_core::traits::{CacheProvider, CoordinationStore};

#[cfg(feature = "redis-backend")]
use crate::redis::RedisClient;

/// Build the coordination store named by `config.provider`.
///
/// Returns the Redis client alongside when Redis is selected so other
/// Redis-backed components can share the connection.
#[cfg(feature = "redis-backend")]
pub async fn coordination_store(
    config: &CoordinationConfig,
) -> AppResult<(Arc<dyn CoordinationStore>, Option<RedisClient>)> {
    match config.provider.as_str() {
        "redis" => {
            info!("Initializing Redis coordination store");
            let client = RedisClient::connect(&config.redis).await?;
            let store = crate::redis::RedisCoordinationStore::new(client.clone());
            Ok((Arc::new(store), Some(client)))
        }
        #[cfg(feature = "memory")]
        "memory" => {
            info!("Initializing in-memory coordination store");
            Ok((Arc::new(crate::memory::MemoryCoordinationStore::new()), None))
        }
        other => Err(AppError::configuration(format!(
            "Unknown coordination provider: '{other}'. Supported: memory, redis"
        ))),
    }
}

/// Read-through cache wrapping the configured provider.
#[derive(Debug, Clone)]
pub struct CacheManager {
    inner: Arc<dyn CacheProvider>,
}

impl CacheManager {
    /// Create the cache named by `config.provider`.
    ///
    /// The Redis provider needs a connected client; pass the coordination
    /// client when there is one.
    #[cfg(feature = "redis-backend")]
    pub fn new(config: &CacheConfig, redis: Option<&RedisClient>) -> AppResult<Self> {
        let inner: Arc<dyn CacheProvider> = match (config.provider.as_str(), redis) {
            ("redis", Some(client)) => {
                info!("Initializing Redis cache provider");
                Arc::new(crate::redis::RedisCacheProvider::new(client))
            }
            ("redis", None) => {
                return Err(AppError::configuration(
                    "Redis cache provider requires the redis coordination provider",
                ));
            }
            #[cfg(feature = "memory")]
            ("memory", _) => {
                info!(max_capacity = config.max_capacity, "Initializing in-memory cache provider");
                Arc::new(crate::memory::MemoryCacheProvider::new(config.max_capacity))
            }
            (other, _) => {
                return Err(AppError::configuration(format!(
                    "Unknown cache provider: '{other}'. Supported: memory, redis"
                )));
            }
        };
        Ok(Self { inner })
    }

    /// Wrap an existing provider.
    pub fn from_provider(provider: Arc<dyn CacheProvider>) -> Self {
        Self { inner: provider }
    }

    /// An in-memory cache with the default bound.
    #[cfg(feature = "memory")]
    pub fn in_memory() -> Self {
        Self::from_provider(Arc::new(crate::memory::MemoryCacheProvider::new(10_000)))
    }
}

#[async_trait]
impl CacheProvider for CacheManager {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.inner.delete(key).await
    }

    async fn delete_pattern(&self, pattern: &str) -> AppResult<u64> {
        self.inner.delete_pattern(pattern).await
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }
}
