//! Counter admission backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use seatgate_cache::keys;
use seatgate_core::config::BackendKind;
use seatgate_core::error::AppError;
use seatgate_core::result::AppResult;
use seatgate_entity::reservation::Reservation;

use super::{AdmissionBackend, CapacitySnapshot, ClaimOutcome, RecoveryReport, live_quantity};
use crate::counter::SeatCounter;

/// One available-units counter per section.
///
/// The counter step itself is atomic, but claim-and-persist must run
/// under the section lock named by [`AdmissionBackend::claim_lock_key`].
#[derive(Debug, Clone)]
pub struct CounterAdmission {
    counter: SeatCounter,
}

impl CounterAdmission {
    /// Wrap a counter.
    pub fn new(counter: SeatCounter) -> Self {
        Self { counter }
    }
}

#[async_trait]
impl AdmissionBackend for CounterAdmission {
    fn kind(&self) -> BackendKind {
        BackendKind::Counter
    }

    fn claim_lock_key(&self, section_id: Uuid) -> Option<String> {
        Some(keys::section_claim_resource(section_id))
    }

    async fn provision(&self, section_id: Uuid, capacity: u32) -> AppResult<()> {
        self.counter.initialize(section_id, i64::from(capacity)).await
    }

    async fn claim(
        &self,
        section_id: Uuid,
        quantity: u32,
        _owner: Uuid,
        _expires_at: DateTime<Utc>,
    ) -> AppResult<ClaimOutcome> {
        if self.counter.try_claim(section_id, i64::from(quantity)).await? {
            return Ok(ClaimOutcome::Granted { slots: Vec::new() });
        }
        let available = self.counter.available(section_id).await?.unwrap_or(0);
        Ok(ClaimOutcome::Exhausted { available })
    }

    async fn finalize(&self, _section_id: Uuid, _owner: Uuid, quantity: u32) -> AppResult<u32> {
        Ok(quantity)
    }

    async fn release(&self, section_id: Uuid, _owner: Uuid, quantity: u32) -> AppResult<u32> {
        let available = self.counter.release(section_id, i64::from(quantity)).await?;
        info!(section_id = %section_id, quantity, available, "Counter units released");
        Ok(quantity)
    }

    async fn available(&self, section_id: Uuid) -> AppResult<Option<i64>> {
        self.counter.available(section_id).await
    }

    async fn available_many(&self, section_ids: &[Uuid]) -> AppResult<HashMap<Uuid, i64>> {
        self.counter.batch_read(section_ids).await
    }

    async fn sweep_orphans(&self, _section_id: Uuid, _now: DateTime<Utc>) -> AppResult<u32> {
        Ok(0)
    }

    async fn inspect(&self, section_id: Uuid, capacity: u32) -> AppResult<CapacitySnapshot> {
        let available = self.counter.available(section_id).await?.ok_or_else(|| {
            AppError::coordination(format!("Section {section_id} counter is not initialized"))
        })?;
        let total = i64::from(capacity);
        Ok(CapacitySnapshot {
            total,
            available,
            held: total - available,
            slots: None,
        })
    }

    async fn recover(
        &self,
        section_id: Uuid,
        capacity: u32,
        live: &[Reservation],
    ) -> AppResult<RecoveryReport> {
        let before = self.counter.available(section_id).await?;
        let held = live_quantity(live);
        let mut expected = i64::from(capacity) - held;
        if expected < 0 {
            let violation = AppError::invariant(format!(
                "Section {section_id} has {held} live units against capacity {capacity}"
            ));
            error!(section_id = %section_id, error = %violation, "Capacity invariant violated");
            expected = 0;
        }

        if before != Some(expected) {
            warn!(
                section_id = %section_id,
                before = ?before,
                after = expected,
                "Counter drift repaired"
            );
            self.counter.initialize(section_id, expected).await?;
        }

        Ok(RecoveryReport {
            section_id,
            available_before: before,
            available_after: expected,
            slots_freed: 0,
            slots_restored: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use seatgate_cache::memory::MemoryCoordinationStore;

    fn backend() -> CounterAdmission {
        CounterAdmission::new(SeatCounter::new(Arc::new(MemoryCoordinationStore::new())))
    }

    #[tokio::test]
    async fn test_claim_reports_remaining_when_exhausted() {
        let backend = backend();
        let section = Uuid::new_v4();
        backend.provision(section, 10).await.unwrap();

        let granted = backend.claim(section, 7, Uuid::new_v4(), Utc::now()).await.unwrap();
        assert_eq!(granted, ClaimOutcome::Granted { slots: Vec::new() });

        let refused = backend.claim(section, 4, Uuid::new_v4(), Utc::now()).await.unwrap();
        assert_eq!(refused, ClaimOutcome::Exhausted { available: 3 });
        assert_eq!(backend.available(section).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_inspect_requires_provisioning() {
        let backend = backend();
        let section = Uuid::new_v4();
        assert!(backend.inspect(section, 5).await.is_err());

        backend.provision(section, 5).await.unwrap();
        backend.claim(section, 2, Uuid::new_v4(), Utc::now()).await.unwrap();
        let snapshot = backend.inspect(section, 5).await.unwrap();
        assert_eq!(snapshot.held, 2);
        assert!(snapshot.is_conserved());
    }

    #[tokio::test]
    async fn test_recover_without_drift_changes_nothing() {
        let backend = backend();
        let section = Uuid::new_v4();
        backend.provision(section, 5).await.unwrap();

        let report = backend.recover(section, 5, &[]).await.unwrap();
        assert!(!report.repaired());
        assert_eq!(report.available_after, 5);
    }

    #[test]
    fn test_counter_needs_section_lock() {
        let section = Uuid::new_v4();
        assert_eq!(
            backend().claim_lock_key(section),
            Some(keys::section_claim_resource(section))
        );
    }
}
