//! Redis read-through cache provider.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use seatgate_core::error::ErrorKind;
use seatgate_core::result::AppResult;
use seatgate_core::traits::CacheProvider;

use super::client::{RedisClient, redis_err};

/// Cache entries live under `<prefix>cache:` so they never collide with coordination keys.
#[derive(Debug, Clone)]
pub struct RedisCacheProvider {
    client: RedisClient,
}

impl RedisCacheProvider {
    /// Create a provider on a shared client.
    pub fn new(client: &RedisClient) -> Self {
        Self {
            client: client.scoped("cache:"),
        }
    }
}

#[async_trait]
impl CacheProvider for RedisCacheProvider {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.client.conn();
        conn.get(self.client.key(key))
            .await
            .map_err(redis_err(ErrorKind::Cache, "Redis GET failed"))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.client.conn();
        let _: () = conn
            .set_ex(self.client.key(key), value, ttl.as_secs().max(1))
            .await
            .map_err(redis_err(ErrorKind::Cache, "Redis SETEX failed"))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.client.conn();
        let _: () = conn
            .del(self.client.key(key))
            .await
            .map_err(redis_err(ErrorKind::Cache, "Redis DEL failed"))?;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> AppResult<u64> {
        let mut conn = self.client.conn();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(self.client.key(pattern))
            .query_async(&mut conn)
            .await
            .map_err(redis_err(ErrorKind::Cache, "Redis KEYS failed"))?;
        if keys.is_empty() {
            return Ok(0);
        }

        let count: u64 = conn
            .del(&keys)
            .await
            .map_err(redis_err(ErrorKind::Cache, "Redis DEL failed"))?;
        debug!(pattern, count, "Deleted cache entries matching pattern");
        Ok(count)
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.client.conn();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(redis_err(ErrorKind::Cache, "Redis PING failed"))?;
        Ok(pong == "PONG")
    }
}
