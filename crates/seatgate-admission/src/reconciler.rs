//! Capacity drift detection and startup repair.
//!
//! The durable store is the system of record for who holds capacity. The
//! admission backend is a fast copy of that fact. The periodic check only
//! reports disagreement. A claim made just before its pending row commits
//! makes the two differ for a moment, so a section is reported as an
//! invariant violation only when two consecutive checks disagree. Repair
//! runs at startup, before any request is served.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use seatgate_core::error::AppError;
use seatgate_core::result::AppResult;
use seatgate_database::store::ReservationStore;
use seatgate_entity::section::Section;

use crate::backend::{AdmissionBackend, CapacitySnapshot, RecoveryReport, live_quantity};

/// Result of comparing one section's backend accounting with durable holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    /// Section checked.
    pub section_id: Uuid,
    /// Section name.
    pub section_name: String,
    /// Section capacity.
    pub capacity: i64,
    /// Units held by pending and confirmed reservations.
    pub durable_held: i64,
    /// Backend accounting, absent when it could not be read.
    pub snapshot: Option<CapacitySnapshot>,
    /// The previous check of this section disagreed too.
    #[serde(default)]
    pub recurring: bool,
}

impl DriftReport {
    /// Whether the backend conserves capacity and agrees with the durable store.
    pub fn is_consistent(&self) -> bool {
        self.snapshot
            .is_some_and(|s| s.is_conserved() && s.held == self.durable_held)
    }

    /// Backend-held minus durably held units.
    pub fn drift(&self) -> Option<i64> {
        self.snapshot.map(|s| s.held - self.durable_held)
    }
}

/// Compares and repairs admission state against the durable store.
#[derive(Debug, Clone)]
pub struct CapacityReconciler {
    backend: Arc<dyn AdmissionBackend>,
    store: Arc<dyn ReservationStore>,
    /// Sections that disagreed on their last check, with the drift seen.
    suspects: Arc<DashMap<Uuid, Option<i64>>>,
}

impl CapacityReconciler {
    /// Create a reconciler.
    pub fn new(backend: Arc<dyn AdmissionBackend>, store: Arc<dyn ReservationStore>) -> Self {
        Self {
            backend,
            store,
            suspects: Arc::new(DashMap::new()),
        }
    }

    /// Compare one section.
    pub async fn check_section(&self, section: &Section) -> AppResult<DriftReport> {
        let live = self.store.live_holds(section.id).await?;
        let snapshot = match self
            .backend
            .inspect(section.id, section.total_capacity.max(0) as u32)
            .await
        {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                error!(section_id = %section.id, error = %e, "Could not read section accounting");
                None
            }
        };

        let mut report = DriftReport {
            section_id: section.id,
            section_name: section.name.clone(),
            capacity: i64::from(section.total_capacity),
            durable_held: live_quantity(&live),
            snapshot,
            recurring: false,
        };

        if report.is_consistent() {
            self.suspects.remove(&section.id);
        } else if let Some(previous) = self.suspects.insert(section.id, report.drift()) {
            report.recurring = true;
            let violation = AppError::invariant(format!(
                "Section {} accounting disagrees with durable holds (drift {:?}, previously {:?})",
                section.id,
                report.drift(),
                previous
            ));
            error!(
                section_id = %section.id,
                durable_held = report.durable_held,
                snapshot = ?report.snapshot,
                error = %violation,
                "Capacity invariant violated"
            );
        } else {
            warn!(
                section_id = %section.id,
                drift = ?report.drift(),
                "Section accounting disagrees with durable holds; rechecking next run"
            );
        }
        Ok(report)
    }

    /// Compare every section. A failure on one section does not stop the rest.
    pub async fn check_all(&self) -> AppResult<Vec<DriftReport>> {
        let sections = self.store.list_sections().await?;
        let mut reports = Vec::with_capacity(sections.len());
        for section in &sections {
            match self.check_section(section).await {
                Ok(report) => reports.push(report),
                Err(e) => error!(section_id = %section.id, error = %e, "Drift check failed"),
            }
        }

        let inconsistent = reports.iter().filter(|r| !r.is_consistent()).count();
        let violations = reports.iter().filter(|r| r.recurring).count();
        info!(
            sections = reports.len(),
            inconsistent,
            violations,
            "Capacity drift check finished"
        );
        Ok(reports)
    }

    /// Rebuild one section's accounting from its durable live holds.
    pub async fn recover_section(&self, section: &Section) -> AppResult<RecoveryReport> {
        let live = self.store.live_holds(section.id).await?;
        self.backend
            .recover(section.id, section.total_capacity.max(0) as u32, &live)
            .await
    }

    /// Repair every section. Run once before serving requests.
    pub async fn startup_recovery(&self) -> AppResult<Vec<RecoveryReport>> {
        info!(backend = %self.backend.kind(), "Running startup capacity recovery");

        let sections = self.store.list_sections().await?;
        let mut reports = Vec::with_capacity(sections.len());
        for section in &sections {
            match self.recover_section(section).await {
                Ok(report) => reports.push(report),
                Err(e) => error!(section_id = %section.id, error = %e, "Section recovery failed"),
            }
        }

        let repaired = reports.iter().filter(|r| r.repaired()).count();
        info!(sections = reports.len(), repaired, "Startup capacity recovery finished");
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use seatgate_cache::memory::MemoryCoordinationStore;
    use seatgate_database::store::MemoryReservationStore;
    use seatgate_entity::reservation::NewReservation;
    use seatgate_entity::section::CreateSection;

    use crate::backend::{AdmissionDispatch, ClaimOutcome};

    async fn fixture(
        backend: AdmissionDispatch,
    ) -> (CapacityReconciler, Arc<AdmissionDispatch>, Arc<MemoryReservationStore>, Section) {
        let store = Arc::new(MemoryReservationStore::new());
        let section = store
            .create_section(&CreateSection {
                name: "Stalls".to_string(),
                description: None,
                total_capacity: 20,
                price_cents: None,
            })
            .await
            .unwrap();
        let backend = Arc::new(backend);
        backend.provision(section.id, 20).await.unwrap();
        let reconciler = CapacityReconciler::new(backend.clone(), store.clone());
        (reconciler, backend, store, section)
    }

    async fn hold(
        store: &MemoryReservationStore,
        backend: &AdmissionDispatch,
        section: &Section,
        quantity: i32,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let expires_at = Utc::now() + Duration::minutes(15);
        let outcome = backend
            .claim(section.id, quantity as u32, id, expires_at)
            .await
            .unwrap();
        assert!(matches!(outcome, ClaimOutcome::Granted { .. }));
        store
            .insert_pending(
                &NewReservation {
                    id,
                    user_id: Uuid::new_v4(),
                    section_id: section.id,
                    quantity,
                    confirmation_code: "00C0FFEE".to_string(),
                    expires_at,
                    total_price_cents: None,
                },
                None,
            )
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_consistent_section_reports_no_drift() {
        let counter = AdmissionDispatch::counter(Arc::new(MemoryCoordinationStore::new()));
        let (reconciler, backend, store, section) = fixture(counter).await;
        hold(&store, &backend, &section, 5).await;

        let report = reconciler.check_section(&section).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.drift(), Some(0));
    }

    #[tokio::test]
    async fn test_drift_escalates_only_when_it_persists() {
        let counter = AdmissionDispatch::counter(Arc::new(MemoryCoordinationStore::new()));
        let (reconciler, backend, store, section) = fixture(counter).await;

        // A claim whose pending row has not been written yet.
        let in_flight = Uuid::new_v4();
        let expires_at = Utc::now() + Duration::minutes(15);
        backend.claim(section.id, 2, in_flight, expires_at).await.unwrap();
        let first = reconciler.check_section(&section).await.unwrap();
        assert!(!first.is_consistent());
        assert!(!first.recurring);

        store
            .insert_pending(
                &NewReservation {
                    id: in_flight,
                    user_id: Uuid::new_v4(),
                    section_id: section.id,
                    quantity: 2,
                    confirmation_code: "0BADF00D".to_string(),
                    expires_at,
                    total_price_cents: None,
                },
                None,
            )
            .await
            .unwrap();
        assert!(reconciler.check_section(&section).await.unwrap().is_consistent());

        // A lost release stays wrong on every check.
        backend.claim(section.id, 3, Uuid::new_v4(), Utc::now()).await.unwrap();
        assert!(!reconciler.check_section(&section).await.unwrap().recurring);
        let second = reconciler.check_section(&section).await.unwrap();
        assert!(second.recurring);
        assert_eq!(second.drift(), Some(3));

        reconciler.startup_recovery().await.unwrap();
        let repaired = reconciler.check_section(&section).await.unwrap();
        assert!(repaired.is_consistent());
        assert!(!repaired.recurring);
    }

    #[tokio::test]
    async fn test_counter_recovery_restores_capacity_minus_live() {
        let counter = AdmissionDispatch::counter(Arc::new(MemoryCoordinationStore::new()));
        let (reconciler, backend, store, section) = fixture(counter).await;
        hold(&store, &backend, &section, 6).await;

        // Simulate a lost release: a claim with no durable record.
        backend
            .claim(section.id, 4, Uuid::new_v4(), Utc::now())
            .await
            .unwrap();
        assert_eq!(reconciler.check_section(&section).await.unwrap().drift(), Some(4));

        let reports = reconciler.startup_recovery().await.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].repaired());
        assert_eq!(backend.available(section.id).await.unwrap(), Some(14));
        assert!(reconciler.check_section(&section).await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_slot_recovery_frees_orphans_and_restores_missing_holds() {
        let (reconciler, backend, store, section) = fixture(AdmissionDispatch::bitmap_slots()).await;
        let live = hold(&store, &backend, &section, 3).await;

        let orphan = Uuid::new_v4();
        backend
            .claim(section.id, 2, orphan, Utc::now() + Duration::minutes(5))
            .await
            .unwrap();
        backend.release(section.id, live, 3).await.unwrap();

        let report = reconciler.recover_section(&section).await.unwrap();
        assert_eq!(report.slots_freed, 2);
        assert_eq!(report.slots_restored, 3);
        assert_eq!(report.available_after, 17);
        assert!(reconciler.check_section(&section).await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_slot_recovery_reinitializes_missing_section() {
        let store = Arc::new(MemoryReservationStore::new());
        let section = store
            .create_section(&CreateSection {
                name: "Gallery".to_string(),
                description: None,
                total_capacity: 8,
                price_cents: None,
            })
            .await
            .unwrap();
        let backend: Arc<AdmissionDispatch> = Arc::new(AdmissionDispatch::bitmap_slots());
        let reconciler = CapacityReconciler::new(backend.clone(), store);

        let report = reconciler.recover_section(&section).await.unwrap();
        assert_eq!(report.available_before, None);
        assert_eq!(report.available_after, 8);
        assert_eq!(backend.available(section.id).await.unwrap(), Some(8));
    }
}
