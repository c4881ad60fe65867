//! Redis coordination store.
//!
//! Compare-and-* primitives run as Lua scripts so the check and the
//! mutation happen in one server-side step.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use seatgate_core::error::{AppError, ErrorKind};
use seatgate_core::result::AppResult;
use seatgate_core::traits::{CompareAndSubtract, CoordinationStore};

use super::client::{RedisClient, redis_err};

/// KEYS[1] = key, ARGV[1] = expected value
const DELETE_IF_EQUALS: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
"#;

/// KEYS[1] = key, ARGV[1] = expected value, ARGV[2] = ttl in ms
const EXPIRE_IF_EQUALS: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('PEXPIRE', KEYS[1], ARGV[2])
    end
    return 0
"#;

/// KEYS[1] = counter, ARGV[1] = amount
///
/// Returns {1, remaining} when applied, {0, current} when insufficient,
/// {-1, 0} when the counter does not exist.
const COMPARE_AND_SUBTRACT: &str = r#"
    local current = redis.call('GET', KEYS[1])
    if not current then
        return {-1, 0}
    end
    current = tonumber(current)
    local amount = tonumber(ARGV[1])
    if current < amount then
        return {0, current}
    end
    return {1, redis.call('DECRBY', KEYS[1], amount)}
"#;

/// Coordination store on a shared Redis connection.
#[derive(Debug, Clone)]
pub struct RedisCoordinationStore {
    client: RedisClient,
}

impl RedisCoordinationStore {
    /// Create a store on a shared client.
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        let mut conn = self.client.conn();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.client.key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(redis_err(ErrorKind::Coordination, "Redis SET NX failed"))?;
        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> AppResult<bool> {
        let mut conn = self.client.conn();
        let removed: i64 = redis::Script::new(DELETE_IF_EQUALS)
            .key(self.client.key(key))
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err(ErrorKind::Coordination, "Redis compare-and-delete failed"))?;
        Ok(removed == 1)
    }

    async fn expire_if_equals(&self, key: &str, expected: &str, ttl: Duration) -> AppResult<bool> {
        let mut conn = self.client.conn();
        let extended: i64 = redis::Script::new(EXPIRE_IF_EQUALS)
            .key(self.client.key(key))
            .arg(expected)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err(ErrorKind::Coordination, "Redis compare-and-expire failed"))?;
        Ok(extended == 1)
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.client.conn();
        conn.exists(self.client.key(key))
            .await
            .map_err(redis_err(ErrorKind::Coordination, "Redis EXISTS failed"))
    }

    async fn get_integer(&self, key: &str) -> AppResult<Option<i64>> {
        let mut conn = self.client.conn();
        conn.get(self.client.key(key))
            .await
            .map_err(redis_err(ErrorKind::Coordination, "Redis GET failed"))
    }

    async fn get_integers(&self, keys: &[String]) -> AppResult<Vec<Option<i64>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let full: Vec<String> = keys.iter().map(|k| self.client.key(k)).collect();
        let mut conn = self.client.conn();
        redis::cmd("MGET")
            .arg(&full)
            .query_async(&mut conn)
            .await
            .map_err(redis_err(ErrorKind::Coordination, "Redis MGET failed"))
    }

    async fn set_integer(&self, key: &str, value: i64) -> AppResult<()> {
        let mut conn = self.client.conn();
        let _: () = conn
            .set(self.client.key(key), value)
            .await
            .map_err(redis_err(ErrorKind::Coordination, "Redis SET failed"))?;
        Ok(())
    }

    async fn compare_and_subtract(&self, key: &str, amount: i64) -> AppResult<CompareAndSubtract> {
        let mut conn = self.client.conn();
        let reply: Vec<i64> = redis::Script::new(COMPARE_AND_SUBTRACT)
            .key(self.client.key(key))
            .arg(amount)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err(ErrorKind::Coordination, "Redis compare-and-subtract failed"))?;

        match reply.as_slice() {
            [1, remaining] => Ok(CompareAndSubtract::Applied {
                remaining: *remaining,
            }),
            [0, current] => Ok(CompareAndSubtract::Insufficient { current: *current }),
            [-1, _] => Ok(CompareAndSubtract::Missing),
            other => Err(AppError::coordination(format!(
                "Unexpected compare-and-subtract reply: {other:?}"
            ))),
        }
    }

    async fn increment_by(&self, key: &str, amount: i64) -> AppResult<i64> {
        let mut conn = self.client.conn();
        conn.incr(self.client.key(key), amount)
            .await
            .map_err(redis_err(ErrorKind::Coordination, "Redis INCRBY failed"))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.client.conn();
        let _: () = conn
            .del(self.client.key(key))
            .await
            .map_err(redis_err(ErrorKind::Coordination, "Redis DEL failed"))?;
        Ok(())
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.client.conn();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(redis_err(ErrorKind::Coordination, "Redis PING failed"))?;
        Ok(pong == "PONG")
    }
}
