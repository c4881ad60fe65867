//! Shared fixtures for service integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use seatgate_admission::{AdmissionBackend, AdmissionDispatch, LockService};
use seatgate_cache::CacheManager;
use seatgate_cache::memory::MemoryCoordinationStore;
use seatgate_core::config::{CacheConfig, ReservationConfig};
use seatgate_core::error::AppError;
use seatgate_core::result::AppResult;
use seatgate_core::traits::CoordinationStore;
use seatgate_database::store::{MemoryReservationStore, ReservationStore, Transition};
use seatgate_entity::audit::ReservationLog;
use seatgate_entity::reservation::{
    NewReservation, Reservation, ReservationStatus, ReservationTally,
};
use seatgate_entity::section::{CreateSection, Section, SectionStatus};
use seatgate_service::{ReadCache, ReservationService, SectionService};

/// Services wired over in-memory stores.
pub struct TestApp {
    pub store: Arc<FailingStore>,
    pub backend: Arc<AdmissionDispatch>,
    pub reservations: ReservationService,
    pub sections: SectionService,
}

impl TestApp {
    /// Counter backend behind an in-memory coordination store.
    pub fn counter() -> Self {
        let coordination: Arc<dyn CoordinationStore> = Arc::new(MemoryCoordinationStore::new());
        Self::build(AdmissionDispatch::counter(coordination.clone()), coordination)
    }

    /// Slot backend on the in-process bitmap allocator.
    pub fn slots() -> Self {
        Self::build(
            AdmissionDispatch::bitmap_slots(),
            Arc::new(MemoryCoordinationStore::new()),
        )
    }

    /// One app per backend.
    pub fn each_backend() -> Vec<(&'static str, Self)> {
        vec![("counter", Self::counter()), ("slots", Self::slots())]
    }

    fn build(backend: AdmissionDispatch, coordination: Arc<dyn CoordinationStore>) -> Self {
        let store = Arc::new(FailingStore::default());
        let backend = Arc::new(backend);
        let config = ReservationConfig::default();
        let cache = ReadCache::new(CacheManager::in_memory(), &CacheConfig::default());
        let locks = LockService::new(coordination, config.lock_retry_delay());

        let reservations = ReservationService::new(
            store.clone(),
            backend.clone(),
            locks,
            cache.clone(),
            config,
        );
        let sections = SectionService::new(store.clone(), backend.clone(), cache);

        Self {
            store,
            backend,
            reservations,
            sections,
        }
    }

    /// Create and provision an open section.
    pub async fn section(&self, capacity: i32) -> Section {
        self.sections
            .create_section(CreateSection {
                name: format!("Section {}", Uuid::new_v4()),
                description: None,
                total_capacity: capacity,
                price_cents: Some(1500),
            })
            .await
            .expect("section should be created")
    }

    /// Free units according to the backend.
    pub async fn available(&self, section_id: Uuid) -> i64 {
        self.backend
            .available(section_id)
            .await
            .expect("backend read")
            .expect("section provisioned")
    }

    /// Units held by pending and confirmed reservations in the durable store.
    pub async fn durably_held(&self, section_id: Uuid) -> i64 {
        self.store
            .live_holds(section_id)
            .await
            .expect("live holds")
            .iter()
            .map(|r| i64::from(r.quantity))
            .sum()
    }

    /// Move a reservation's deadline into the past.
    pub async fn force_deadline_passed(&self, reservation_id: Uuid) {
        self.store
            .inner
            .set_deadline(reservation_id, Utc::now() - chrono::Duration::seconds(1))
            .await
            .expect("deadline update");
    }
}

/// In-memory store whose pending writes can be made to fail.
#[derive(Debug, Default)]
pub struct FailingStore {
    pub inner: MemoryReservationStore,
    fail_inserts: AtomicBool,
}

impl FailingStore {
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReservationStore for FailingStore {
    async fn create_section(&self, data: &CreateSection) -> AppResult<Section> {
        self.inner.create_section(data).await
    }

    async fn find_section(&self, id: Uuid) -> AppResult<Option<Section>> {
        self.inner.find_section(id).await
    }

    async fn list_sections(&self) -> AppResult<Vec<Section>> {
        self.inner.list_sections().await
    }

    async fn set_section_status(
        &self,
        id: Uuid,
        status: SectionStatus,
    ) -> AppResult<Option<Section>> {
        self.inner.set_section_status(id, status).await
    }

    async fn insert_pending(
        &self,
        data: &NewReservation,
        metadata: Option<serde_json::Value>,
    ) -> AppResult<Reservation> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(AppError::database("injected write failure"));
        }
        self.inner.insert_pending(data, metadata).await
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Reservation>> {
        self.inner.find_by_id(id).await
    }

    async fn find_for_user(&self, id: Uuid, user_id: Uuid) -> AppResult<Option<Reservation>> {
        self.inner.find_for_user(id, user_id).await
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<ReservationStatus>,
    ) -> AppResult<Vec<Reservation>> {
        self.inner.list_for_user(user_id, status).await
    }

    async fn transition(&self, transition: &Transition) -> AppResult<Option<Reservation>> {
        self.inner.transition(transition).await
    }

    async fn find_expired_pending(&self, now: DateTime<Utc>) -> AppResult<Vec<Reservation>> {
        self.inner.find_expired_pending(now).await
    }

    async fn live_holds(&self, section_id: Uuid) -> AppResult<Vec<Reservation>> {
        self.inner.live_holds(section_id).await
    }

    async fn status_tallies(&self, section_id: Option<Uuid>) -> AppResult<Vec<ReservationTally>> {
        self.inner.status_tallies(section_id).await
    }

    async fn logs_for(&self, reservation_id: Uuid) -> AppResult<Vec<ReservationLog>> {
        self.inner.logs_for(reservation_id).await
    }
}
