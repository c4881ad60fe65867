//! In-process coordination store.
//!
//! Each primitive runs while holding the dashmap shard lock for its key,
//! which makes it atomic with respect to every other primitive on that key.
//! Deadlines use tokio's clock so paused-time tests can advance past a TTL.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use tokio::time::Instant;

use seatgate_core::error::AppError;
use seatgate_core::result::AppResult;
use seatgate_core::traits::{CompareAndSubtract, CoordinationStore};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Text(String),
    Integer(i64),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    deadline: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.deadline.is_none_or(|d| d > now)
    }

    fn holds_text(&self, expected: &str) -> bool {
        matches!(&self.value, Value::Text(v) if v == expected)
    }

    fn integer(&self, key: &str) -> AppResult<i64> {
        match &self.value {
            Value::Integer(v) => Ok(*v),
            Value::Text(v) => v
                .parse()
                .map_err(|_| AppError::coordination(format!("Key '{key}' does not hold an integer"))),
        }
    }
}

/// Coordination store backed by a sharded concurrent map.
#[derive(Debug, Default)]
pub struct MemoryCoordinationStore {
    entries: DashMap<String, Entry>,
}

impl MemoryCoordinationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        let now = Instant::now();
        let fresh = Entry {
            value: Value::Text(value.to_string()),
            deadline: Some(now + ttl),
        };
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut slot) => {
                if slot.get().is_live(now) {
                    return Ok(false);
                }
                slot.insert(fresh);
                Ok(true)
            }
            MapEntry::Vacant(slot) => {
                slot.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> AppResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove_if(key, |_, e| e.is_live(now) && e.holds_text(expected))
            .is_some())
    }

    async fn expire_if_equals(&self, key: &str, expected: &str, ttl: Duration) -> AppResult<bool> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) && entry.holds_text(expected) => {
                entry.deadline = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let now = Instant::now();
        Ok(self.entries.get(key).is_some_and(|e| e.is_live(now)))
    }

    async fn get_integer(&self, key: &str) -> AppResult<Option<i64>> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => entry.integer(key).map(Some),
            _ => Ok(None),
        }
    }

    async fn get_integers(&self, keys: &[String]) -> AppResult<Vec<Option<i64>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get_integer(key).await?);
        }
        Ok(values)
    }

    async fn set_integer(&self, key: &str, value: i64) -> AppResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Integer(value),
                deadline: None,
            },
        );
        Ok(())
    }

    async fn compare_and_subtract(&self, key: &str, amount: i64) -> AppResult<CompareAndSubtract> {
        let now = Instant::now();
        let Some(mut entry) = self.entries.get_mut(key) else {
            return Ok(CompareAndSubtract::Missing);
        };
        if !entry.is_live(now) {
            return Ok(CompareAndSubtract::Missing);
        }
        let current = entry.integer(key)?;
        if current < amount {
            return Ok(CompareAndSubtract::Insufficient { current });
        }
        let remaining = current - amount;
        entry.value = Value::Integer(remaining);
        Ok(CompareAndSubtract::Applied { remaining })
    }

    async fn increment_by(&self, key: &str, amount: i64) -> AppResult<i64> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: Value::Integer(0),
            deadline: None,
        });
        let current = if entry.is_live(now) {
            entry.integer(key)?
        } else {
            entry.deadline = None;
            0
        };
        let next = current + amount;
        entry.value = Value::Integer(next);
        Ok(next)
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent_respects_live_holder() {
        let store = MemoryCoordinationStore::new();
        let ttl = Duration::from_secs(10);
        assert!(store.set_if_absent("lock:a", "t1", ttl).await.unwrap());
        assert!(!store.set_if_absent("lock:a", "t2", ttl).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_can_be_taken_over() {
        let store = MemoryCoordinationStore::new();
        assert!(store.set_if_absent("lock:a", "t1", Duration::from_millis(100)).await.unwrap());

        tokio::time::advance(Duration::from_millis(150)).await;

        assert!(!store.exists("lock:a").await.unwrap());
        assert!(store.set_if_absent("lock:a", "t2", Duration::from_secs(1)).await.unwrap());
        assert!(!store.delete_if_equals("lock:a", "t1").await.unwrap());
        assert!(store.delete_if_equals("lock:a", "t2").await.unwrap());
    }

    #[tokio::test]
    async fn test_expire_if_equals_checks_token() {
        let store = MemoryCoordinationStore::new();
        let ttl = Duration::from_secs(5);
        store.set_if_absent("lock:b", "mine", ttl).await.unwrap();
        assert!(!store.expire_if_equals("lock:b", "theirs", ttl).await.unwrap());
        assert!(store.expire_if_equals("lock:b", "mine", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_subtract_outcomes() {
        let store = MemoryCoordinationStore::new();
        assert_eq!(
            store.compare_and_subtract("c", 1).await.unwrap(),
            CompareAndSubtract::Missing
        );

        store.set_integer("c", 5).await.unwrap();
        assert_eq!(
            store.compare_and_subtract("c", 3).await.unwrap(),
            CompareAndSubtract::Applied { remaining: 2 }
        );
        assert_eq!(
            store.compare_and_subtract("c", 3).await.unwrap(),
            CompareAndSubtract::Insufficient { current: 2 }
        );
        assert_eq!(store.increment_by("c", 3).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_get_integers_preserves_order() {
        let store = MemoryCoordinationStore::new();
        store.set_integer("a", 1).await.unwrap();
        store.set_integer("c", 3).await.unwrap();
        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(
            store.get_integers(&keys).await.unwrap(),
            vec![Some(1), None, Some(3)]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_subtract_never_goes_negative() {
        let store = std::sync::Arc::new(MemoryCoordinationStore::new());
        store.set_integer("seats", 100).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.compare_and_subtract("seats", 3).await.unwrap()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), CompareAndSubtract::Applied { .. }) {
                granted += 1;
            }
        }
        assert_eq!(granted, 33);
        assert_eq!(store.get_integer("seats").await.unwrap(), Some(1));
    }
}
