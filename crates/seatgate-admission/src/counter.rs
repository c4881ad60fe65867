//! Atomic available-units counter per section.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use seatgate_cache::keys;
use seatgate_core::error::AppError;
use seatgate_core::result::AppResult;
use seatgate_core::traits::{CompareAndSubtract, CoordinationStore};

/// Available-units counters over a coordination store.
#[derive(Debug, Clone)]
pub struct SeatCounter {
    store: Arc<dyn CoordinationStore>,
}

impl SeatCounter {
    /// Create a counter over `store`.
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// Set the counter to `available`. Safe to repeat.
    pub async fn initialize(&self, section_id: Uuid, available: i64) -> AppResult<()> {
        self.store
            .set_integer(&keys::section_available(section_id), available)
            .await?;
        info!(section_id = %section_id, available, "Section counter initialized");
        Ok(())
    }

    /// Take `quantity` units if at least that many remain.
    ///
    /// Returns `false` without changing anything when fewer remain. A
    /// counter that was never initialized is an error.
    pub async fn try_claim(&self, section_id: Uuid, quantity: i64) -> AppResult<bool> {
        match self
            .store
            .compare_and_subtract(&keys::section_available(section_id), quantity)
            .await?
        {
            CompareAndSubtract::Applied { remaining } => {
                debug!(section_id = %section_id, quantity, remaining, "Counter claim applied");
                Ok(true)
            }
            CompareAndSubtract::Insufficient { current } => {
                debug!(section_id = %section_id, quantity, current, "Counter claim refused");
                Ok(false)
            }
            CompareAndSubtract::Missing => Err(AppError::coordination(format!(
                "Section {section_id} is not initialized in the coordination store"
            ))),
        }
    }

    /// Give `quantity` units back. Returns the new value.
    pub async fn release(&self, section_id: Uuid, quantity: i64) -> AppResult<i64> {
        self.store
            .increment_by(&keys::section_available(section_id), quantity)
            .await
    }

    /// Current value, if initialized.
    pub async fn available(&self, section_id: Uuid) -> AppResult<Option<i64>> {
        self.store
            .get_integer(&keys::section_available(section_id))
            .await
    }

    /// Values for many sections in one round trip. Uninitialized sections
    /// are left out. For display only.
    pub async fn batch_read(&self, section_ids: &[Uuid]) -> AppResult<HashMap<Uuid, i64>> {
        let keys: Vec<String> = section_ids
            .iter()
            .map(|id| keys::section_available(*id))
            .collect();
        let values = self.store.get_integers(&keys).await?;
        Ok(section_ids
            .iter()
            .zip(values)
            .filter_map(|(id, value)| value.map(|v| (*id, v)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatgate_cache::memory::MemoryCoordinationStore;
    use seatgate_core::error::ErrorKind;

    fn counter() -> SeatCounter {
        SeatCounter::new(Arc::new(MemoryCoordinationStore::new()))
    }

    #[tokio::test]
    async fn test_claim_and_release() {
        let counter = counter();
        let section = Uuid::new_v4();
        counter.initialize(section, 10).await.unwrap();

        assert!(counter.try_claim(section, 4).await.unwrap());
        assert!(!counter.try_claim(section, 7).await.unwrap());
        assert_eq!(counter.available(section).await.unwrap(), Some(6));
        assert_eq!(counter.release(section, 4).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_uninitialized_counter_is_an_error() {
        let err = counter().try_claim(Uuid::new_v4(), 1).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Coordination);
    }

    #[tokio::test]
    async fn test_batch_read_skips_missing() {
        let counter = counter();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        counter.initialize(a, 3).await.unwrap();

        let values = counter.batch_read(&[a, b]).await.unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values.get(&a), Some(&3));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_never_oversell() {
        let counter = counter();
        let section = Uuid::new_v4();
        counter.initialize(section, 100).await.unwrap();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let counter = counter.clone();
                tokio::spawn(async move { counter.try_claim(section, 30).await.unwrap() })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 30;
            }
        }
        assert_eq!(granted, 90);
        assert_eq!(counter.available(section).await.unwrap(), Some(10));
    }
}
