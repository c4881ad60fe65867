//! Coordination store trait: the atomic primitives admission control is built on.

use std::time::Duration;

use async_trait::async_trait;

use crate::result::AppResult;

/// Outcome of [`CoordinationStore::compare_and_subtract`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareAndSubtract {
    /// The value was at least `amount` and has been decremented.
    Applied {
        /// Value after the subtraction.
        remaining: i64,
    },
    /// The value was smaller than `amount`; nothing changed.
    Insufficient {
        /// Value observed at the time of the check.
        current: i64,
    },
    /// The key does not exist.
    Missing,
}

/// Fast key-value store used for locks and counters.
///
/// Every method is a single indivisible operation against the backend.
/// Implementations must never split a check and its dependent mutation
/// across two round trips.
#[async_trait]
pub trait CoordinationStore: Send + Sync + std::fmt::Debug + 'static {
    /// Set `key` to `value` with expiry `ttl` only if the key is absent.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool>;

    /// Delete `key` only if it currently holds `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> AppResult<bool>;

    /// Reset the expiry of `key` to `ttl` only if it currently holds `expected`.
    async fn expire_if_equals(&self, key: &str, expected: &str, ttl: Duration) -> AppResult<bool>;

    /// Whether `key` exists and has not expired.
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// Read an integer value.
    async fn get_integer(&self, key: &str) -> AppResult<Option<i64>>;

    /// Read many integer values in one round trip, in key order.
    async fn get_integers(&self, keys: &[String]) -> AppResult<Vec<Option<i64>>>;

    /// Overwrite an integer value (no expiry).
    async fn set_integer(&self, key: &str, value: i64) -> AppResult<()>;

    /// Subtract `amount` only if the current value is at least `amount`.
    async fn compare_and_subtract(&self, key: &str, amount: i64) -> AppResult<CompareAndSubtract>;

    /// Add `amount` unconditionally. Returns the new value.
    async fn increment_by(&self, key: &str, amount: i64) -> AppResult<i64>;

    /// Delete a key.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Check that the store is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}
