//! Runtime selection between the counter and slot backends.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use seatgate_core::config::BackendKind;
use seatgate_core::result::AppResult;
use seatgate_core::traits::CoordinationStore;
use seatgate_entity::reservation::Reservation;

#[cfg(feature = "redis-slots")]
use seatgate_cache::redis::RedisClient;

use super::{
    AdmissionBackend, CapacitySnapshot, ClaimOutcome, CounterAdmission, RecoveryReport,
    SlotAdmission,
};
use crate::counter::SeatCounter;
use crate::slot::{BitmapSlotAllocator, SlotAllocator};

/// The configured admission backend.
#[derive(Debug, Clone)]
pub enum AdmissionDispatch {
    /// Single counter per section.
    Counter(CounterAdmission),
    /// One slot per unit.
    Slots(SlotAdmission),
}

impl AdmissionDispatch {
    /// Build the backend named by `kind`.
    ///
    /// The slot backend lives in Redis when a Redis client is given and in
    /// process memory otherwise.
    #[cfg(feature = "redis-slots")]
    pub fn new(
        kind: BackendKind,
        store: Arc<dyn CoordinationStore>,
        redis: Option<RedisClient>,
    ) -> Self {
        match (kind, redis) {
            (BackendKind::Slots, Some(client)) => {
                info!("Using Redis slot admission backend");
                Self::slots(Arc::new(crate::slot::RedisSlotAllocator::new(client)))
            }
            (kind, _) => Self::local(kind, store),
        }
    }

    /// Build the backend named by `kind` without Redis slots.
    ///
    /// The counter lives in `store`; slots live in process memory.
    pub fn local(kind: BackendKind, store: Arc<dyn CoordinationStore>) -> Self {
        match kind {
            BackendKind::Counter => Self::counter(store),
            BackendKind::Slots => Self::bitmap_slots(),
        }
    }

    /// Counter backend over `store`.
    pub fn counter(store: Arc<dyn CoordinationStore>) -> Self {
        info!("Using counter admission backend");
        Self::Counter(CounterAdmission::new(SeatCounter::new(store)))
    }

    /// Slot backend over any allocator.
    pub fn slots(allocator: Arc<dyn SlotAllocator>) -> Self {
        Self::Slots(SlotAdmission::new(allocator))
    }

    /// Slot backend on the in-process bitmap allocator.
    pub fn bitmap_slots() -> Self {
        info!("Using in-process slot admission backend");
        Self::slots(Arc::new(BitmapSlotAllocator::new()))
    }

    fn inner(&self) -> &dyn AdmissionBackend {
        match self {
            Self::Counter(inner) => inner,
            Self::Slots(inner) => inner,
        }
    }
}

#[async_trait]
impl AdmissionBackend for AdmissionDispatch {
    fn kind(&self) -> BackendKind {
        self.inner().kind()
    }

    fn claim_lock_key(&self, section_id: Uuid) -> Option<String> {
        self.inner().claim_lock_key(section_id)
    }

    async fn provision(&self, section_id: Uuid, capacity: u32) -> AppResult<()> {
        self.inner().provision(section_id, capacity).await
    }

    async fn claim(
        &self,
        section_id: Uuid,
        quantity: u32,
        owner: Uuid,
        expires_at: DateTime<Utc>,
    ) -> AppResult<ClaimOutcome> {
        self.inner().claim(section_id, quantity, owner, expires_at).await
    }

    async fn finalize(&self, section_id: Uuid, owner: Uuid, quantity: u32) -> AppResult<u32> {
        self.inner().finalize(section_id, owner, quantity).await
    }

    async fn release(&self, section_id: Uuid, owner: Uuid, quantity: u32) -> AppResult<u32> {
        self.inner().release(section_id, owner, quantity).await
    }

    async fn available(&self, section_id: Uuid) -> AppResult<Option<i64>> {
        self.inner().available(section_id).await
    }

    async fn available_many(&self, section_ids: &[Uuid]) -> AppResult<HashMap<Uuid, i64>> {
        self.inner().available_many(section_ids).await
    }

    async fn sweep_orphans(&self, section_id: Uuid, now: DateTime<Utc>) -> AppResult<u32> {
        self.inner().sweep_orphans(section_id, now).await
    }

    async fn inspect(&self, section_id: Uuid, capacity: u32) -> AppResult<CapacitySnapshot> {
        self.inner().inspect(section_id, capacity).await
    }

    async fn recover(
        &self,
        section_id: Uuid,
        capacity: u32,
        live: &[Reservation],
    ) -> AppResult<RecoveryReport> {
        self.inner().recover(section_id, capacity, live).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatgate_cache::memory::MemoryCoordinationStore;

    #[tokio::test]
    async fn test_local_builds_the_named_backend() {
        let store: Arc<dyn CoordinationStore> = Arc::new(MemoryCoordinationStore::new());

        let counter = AdmissionDispatch::local(BackendKind::Counter, store.clone());
        assert_eq!(counter.kind(), BackendKind::Counter);
        assert!(counter.claim_lock_key(Uuid::new_v4()).is_some());

        let slots = AdmissionDispatch::local(BackendKind::Slots, store);
        assert_eq!(slots.kind(), BackendKind::Slots);
        assert!(slots.claim_lock_key(Uuid::new_v4()).is_none());
    }
}
