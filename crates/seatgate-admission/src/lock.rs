//! Distributed mutual exclusion with ownership tokens.
//!
//! A lock is a coordination key holding a random token with a TTL. Only
//! the party presenting the token can release or extend it, so a holder
//! whose lock expired and was taken over cannot disturb the new holder.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use seatgate_cache::keys;
use seatgate_core::error::AppError;
use seatgate_core::result::AppResult;
use seatgate_core::traits::CoordinationStore;

/// Default lock lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);
/// Default wait between acquisition attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(50);
/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 100;

/// Lock service over a coordination store.
#[derive(Debug, Clone)]
pub struct LockService {
    store: Arc<dyn CoordinationStore>,
    retry_delay: Duration,
}

impl LockService {
    /// Create a lock service that waits `retry_delay` between attempts.
    pub fn new(store: Arc<dyn CoordinationStore>, retry_delay: Duration) -> Self {
        Self { store, retry_delay }
    }

    /// Acquire `resource`, retrying up to `max_retries` times.
    ///
    /// Returns the ownership token, or a `Contention` error once the
    /// retry budget is spent.
    pub async fn acquire(&self, resource: &str, ttl: Duration, max_retries: u32) -> AppResult<String> {
        let key = keys::lock(resource);
        let token = Uuid::new_v4().to_string();

        for attempt in 0..=max_retries {
            if self.store.set_if_absent(&key, &token, ttl).await? {
                debug!(resource, attempt, "Lock acquired");
                return Ok(token);
            }
            if attempt < max_retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        warn!(resource, attempts = max_retries + 1, "Lock acquisition gave up");
        Err(AppError::contention(format!(
            "Could not acquire lock on '{resource}' after {} attempts",
            max_retries + 1
        )))
    }

    /// Release `resource` if `token` still owns it.
    pub async fn release(&self, resource: &str, token: &str) -> AppResult<bool> {
        let released = self.store.delete_if_equals(&keys::lock(resource), token).await?;
        if !released {
            warn!(resource, "Lock release skipped: token no longer owns the lock");
        }
        Ok(released)
    }

    /// Reset the TTL of `resource` if `token` still owns it.
    pub async fn extend(&self, resource: &str, token: &str, ttl: Duration) -> AppResult<bool> {
        self.store
            .expire_if_equals(&keys::lock(resource), token, ttl)
            .await
    }

    /// Whether anyone currently holds `resource`.
    pub async fn is_locked(&self, resource: &str) -> AppResult<bool> {
        self.store.exists(&keys::lock(resource)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatgate_cache::memory::MemoryCoordinationStore;
    use seatgate_core::error::ErrorKind;

    fn service() -> LockService {
        LockService::new(Arc::new(MemoryCoordinationStore::new()), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_second_acquire_is_contention() {
        let locks = service();
        let token = locks.acquire("section:a", DEFAULT_TTL, 0).await.unwrap();

        let err = locks.acquire("section:a", DEFAULT_TTL, 2).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Contention);
        assert!(err.kind.is_retryable());

        assert!(locks.release("section:a", &token).await.unwrap());
        assert!(locks.acquire("section:a", DEFAULT_TTL, 0).await.is_ok());
    }

    #[tokio::test]
    async fn test_release_requires_matching_token() {
        let locks = service();
        let token = locks.acquire("section:b", DEFAULT_TTL, 0).await.unwrap();

        assert!(!locks.release("section:b", "not-the-token").await.unwrap());
        assert!(locks.is_locked("section:b").await.unwrap());
        assert!(locks.release("section:b", &token).await.unwrap());
        assert!(!locks.is_locked("section:b").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_holder_cannot_touch_new_lock() {
        let locks = service();
        let stale = locks
            .acquire("section:c", Duration::from_millis(100), 0)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(200)).await;
        let fresh = locks.acquire("section:c", DEFAULT_TTL, 0).await.unwrap();

        assert!(!locks.extend("section:c", &stale, DEFAULT_TTL).await.unwrap());
        assert!(!locks.release("section:c", &stale).await.unwrap());
        assert!(locks.extend("section:c", &fresh, DEFAULT_TTL).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_release() {
        let locks = service();
        let token = locks.acquire("section:d", DEFAULT_TTL, 0).await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire("section:d", DEFAULT_TTL, 50).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        locks.release("section:d", &token).await.unwrap();

        assert!(waiter.await.unwrap().is_ok());
    }
}
