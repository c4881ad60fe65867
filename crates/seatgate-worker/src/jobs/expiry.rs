//! Expiry sweep.
//!
//! One pass finds pending reservations past their deadline, expires each
//! one through the lifecycle service, then asks the backend to free any
//! claim whose own deadline passed without a durable record catching it.
//! A failure on one reservation or section is logged and the pass goes on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use seatgate_admission::AdmissionBackend;
use seatgate_core::result::AppResult;
use seatgate_database::store::ReservationStore;
use seatgate_service::ReservationService;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Overdue pending reservations found.
    pub due: usize,
    /// Reservations this pass moved to `expired`.
    pub expired: usize,
    /// Reservations confirmed, cancelled or expired by someone else first.
    pub settled_elsewhere: usize,
    /// Reservations that failed and are left for the next pass.
    pub failed: usize,
    /// Units freed by the backend orphan sweep.
    pub orphans_released: u32,
    /// Sections whose orphan sweep failed.
    pub sections_failed: usize,
}

/// Runs expiry sweeps.
#[derive(Debug, Clone)]
pub struct ExpiryReconciler {
    /// Lifecycle service performing each expiry.
    reservations: ReservationService,
    /// System of record.
    store: Arc<dyn ReservationStore>,
    /// Capacity admission, for the orphan sweep.
    backend: Arc<dyn AdmissionBackend>,
}

impl ExpiryReconciler {
    /// Create an expiry reconciler.
    pub fn new(
        reservations: ReservationService,
        store: Arc<dyn ReservationStore>,
        backend: Arc<dyn AdmissionBackend>,
    ) -> Self {
        Self {
            reservations,
            store,
            backend,
        }
    }

    /// Run one sweep at `now`.
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let due = self.store.find_expired_pending(now).await?;
        let mut report = SweepReport {
            due: due.len(),
            ..SweepReport::default()
        };

        for reservation in &due {
            match self.reservations.expire(reservation, now).await {
                Ok(true) => report.expired += 1,
                Ok(false) => report.settled_elsewhere += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(
                        reservation_id = %reservation.id,
                        section_id = %reservation.section_id,
                        error = %e,
                        "Failed to expire reservation"
                    );
                }
            }
        }

        for section in self.store.list_sections().await? {
            match self.backend.sweep_orphans(section.id, now).await {
                Ok(0) => {}
                Ok(freed) => {
                    report.orphans_released += freed;
                    warn!(section_id = %section.id, freed, "Released orphaned claims");
                }
                Err(e) => {
                    report.sections_failed += 1;
                    error!(section_id = %section.id, error = %e, "Orphan sweep failed");
                }
            }
        }

        if report.due > 0 || report.orphans_released > 0 {
            info!(
                due = report.due,
                expired = report.expired,
                settled_elsewhere = report.settled_elsewhere,
                failed = report.failed,
                orphans_released = report.orphans_released,
                "Expiry sweep finished"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use uuid::Uuid;

    use seatgate_admission::{AdmissionDispatch, LockService};
    use seatgate_cache::CacheManager;
    use seatgate_cache::memory::MemoryCoordinationStore;
    use seatgate_core::config::{CacheConfig, ReservationConfig};
    use seatgate_core::error::AppError;
    use seatgate_database::store::{MemoryReservationStore, Transition};
    use seatgate_entity::audit::ReservationLog;
    use seatgate_entity::reservation::{
        NewReservation, Reservation, ReservationStatus, ReservationTally,
    };
    use seatgate_entity::section::{CreateSection, Section, SectionStatus};
    use seatgate_service::{ReadCache, SectionService};

    /// Memory store that refuses to transition one chosen reservation.
    #[derive(Debug, Default)]
    struct StubbornStore {
        inner: MemoryReservationStore,
        refuse: std::sync::Mutex<Option<Uuid>>,
    }

    #[async_trait]
    impl ReservationStore for StubbornStore {
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
            let refused = *self.refuse.lock().unwrap();
            if refused == Some(transition.reservation_id) {
                return Err(AppError::database("injected transition failure"));
            }
            self.inner.transition(transition).await
        }
        async fn find_expired_pending(&self, now: DateTime<Utc>) -> AppResult<Vec<Reservation>> {
            self.inner.find_expired_pending(now).await
        }
        async fn live_holds(&self, section_id: Uuid) -> AppResult<Vec<Reservation>> {
            self.inner.live_holds(section_id).await
        }
        async fn status_tallies(
            &self,
            section_id: Option<Uuid>,
        ) -> AppResult<Vec<ReservationTally>> {
            self.inner.status_tallies(section_id).await
        }
        async fn logs_for(&self, reservation_id: Uuid) -> AppResult<Vec<ReservationLog>> {
            self.inner.logs_for(reservation_id).await
        }
    }

    struct Fixture {
        store: Arc<StubbornStore>,
        backend: Arc<AdmissionDispatch>,
        reservations: ReservationService,
        sweeper: ExpiryReconciler,
        section: Section,
    }

    async fn fixture(backend: AdmissionDispatch) -> Fixture {
        let store = Arc::new(StubbornStore::default());
        let backend = Arc::new(backend);
        let cache = ReadCache::new(CacheManager::in_memory(), &CacheConfig::default());
        let config = ReservationConfig::default();
        let locks = LockService::new(
            Arc::new(MemoryCoordinationStore::new()),
            config.lock_retry_delay(),
        );
        let reservations =
            ReservationService::new(store.clone(), backend.clone(), locks, cache.clone(), config);
        let section = SectionService::new(store.clone(), backend.clone(), cache)
            .create_section(CreateSection {
                name: "Main floor".to_string(),
                description: None,
                total_capacity: 100,
                price_cents: None,
            })
            .await
            .unwrap();
        let sweeper = ExpiryReconciler::new(reservations.clone(), store.clone(), backend.clone());

        Fixture {
            store,
            backend,
            reservations,
            sweeper,
            section,
        }
    }

    fn backends() -> Vec<AdmissionDispatch> {
        vec![
            AdmissionDispatch::counter(Arc::new(MemoryCoordinationStore::new())),
            AdmissionDispatch::bitmap_slots(),
        ]
    }

    async fn overdue(f: &Fixture, quantity: i32) -> Reservation {
        let r = f
            .reservations
            .create(Uuid::new_v4(), f.section.id, quantity)
            .await
            .unwrap();
        f.store
            .inner
            .set_deadline(r.id, Utc::now() - Duration::seconds(5))
            .await
            .unwrap();
        r
    }

    async fn available(f: &Fixture) -> i64 {
        f.backend.available(f.section.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_sweep_expires_overdue_hold() {
        for backend in backends() {
            let f = fixture(backend).await;
            let r = overdue(&f, 10).await;
            let before = available(&f).await;

            let report = f.sweeper.run_sweep(Utc::now()).await.unwrap();
            assert_eq!(report.due, 1);
            assert_eq!(report.expired, 1);
            assert_eq!(available(&f).await, before + 10);

            let current = f.store.find_by_id(r.id).await.unwrap().unwrap();
            assert_eq!(current.status, ReservationStatus::Expired);
        }
    }

    #[tokio::test]
    async fn test_second_sweep_is_a_no_op() {
        for backend in backends() {
            let f = fixture(backend).await;
            overdue(&f, 4).await;
            f.reservations
                .create(Uuid::new_v4(), f.section.id, 6)
                .await
                .unwrap();

            let first = f.sweeper.run_sweep(Utc::now()).await.unwrap();
            let after_first = available(&f).await;
            let second = f.sweeper.run_sweep(Utc::now()).await.unwrap();

            assert_eq!(first.expired, 1);
            assert_eq!(second, SweepReport::default());
            assert_eq!(available(&f).await, after_first);
            assert_eq!(after_first, 94);
        }
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_sweep() {
        for backend in backends() {
            let f = fixture(backend).await;
            let stuck = overdue(&f, 2).await;
            overdue(&f, 3).await;
            *f.store.refuse.lock().unwrap() = Some(stuck.id);

            let report = f.sweeper.run_sweep(Utc::now()).await.unwrap();
            assert_eq!(report.due, 2);
            assert_eq!(report.expired, 1);
            assert_eq!(report.failed, 1);

            *f.store.refuse.lock().unwrap() = None;
            let retry = f.sweeper.run_sweep(Utc::now()).await.unwrap();
            assert_eq!(retry.expired, 1);
            assert_eq!(available(&f).await, 100);
        }
    }

    #[tokio::test]
    async fn test_orphaned_slot_claims_are_released() {
        let f = fixture(AdmissionDispatch::bitmap_slots()).await;
        f.backend
            .claim(f.section.id, 7, Uuid::new_v4(), Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(available(&f).await, 93);

        let report = f.sweeper.run_sweep(Utc::now()).await.unwrap();
        assert_eq!(report.due, 0);
        assert_eq!(report.orphans_released, 7);
        assert_eq!(available(&f).await, 100);
    }
}
