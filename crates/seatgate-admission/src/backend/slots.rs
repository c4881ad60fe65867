//! Slot admission backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use seatgate_core::config::BackendKind;
use seatgate_core::error::AppError;
use seatgate_core::result::AppResult;
use seatgate_entity::reservation::{Reservation, ReservationStatus};

use super::{AdmissionBackend, CapacitySnapshot, ClaimOutcome, RecoveryReport};
use crate::slot::SlotAllocator;

/// Admission through individually claimed slots. Needs no section lock.
#[derive(Debug, Clone)]
pub struct SlotAdmission {
    slots: Arc<dyn SlotAllocator>,
}

impl SlotAdmission {
    /// Wrap a slot allocator.
    pub fn new(slots: Arc<dyn SlotAllocator>) -> Self {
        Self { slots }
    }

    /// The underlying allocator.
    pub fn allocator(&self) -> &Arc<dyn SlotAllocator> {
        &self.slots
    }
}

#[async_trait]
impl AdmissionBackend for SlotAdmission {
    fn kind(&self) -> BackendKind {
        BackendKind::Slots
    }

    fn claim_lock_key(&self, _section_id: Uuid) -> Option<String> {
        None
    }

    async fn provision(&self, section_id: Uuid, capacity: u32) -> AppResult<()> {
        self.slots.initialize(section_id, capacity).await?;
        Ok(())
    }

    async fn claim(
        &self,
        section_id: Uuid,
        quantity: u32,
        owner: Uuid,
        expires_at: DateTime<Utc>,
    ) -> AppResult<ClaimOutcome> {
        match self.slots.reserve(section_id, quantity, owner, expires_at).await? {
            Some(slots) => Ok(ClaimOutcome::Granted { slots }),
            None => {
                let available = i64::from(self.slots.available_count(section_id).await?);
                Ok(ClaimOutcome::Exhausted { available })
            }
        }
    }

    async fn finalize(&self, section_id: Uuid, owner: Uuid, quantity: u32) -> AppResult<u32> {
        let held = self.slots.find_by_owner(section_id, owner).await?;
        let finalized = self.slots.finalize(section_id, &held, owner).await?;
        if finalized != quantity {
            warn!(
                section_id = %section_id,
                owner = %owner,
                quantity,
                finalized,
                "Finalized fewer slots than the reservation holds"
            );
        }
        Ok(finalized)
    }

    async fn release(&self, section_id: Uuid, owner: Uuid, quantity: u32) -> AppResult<u32> {
        let held = self.slots.find_by_owner(section_id, owner).await?;
        let freed = self.slots.free(section_id, &held, owner).await?;
        if freed == quantity {
            info!(section_id = %section_id, owner = %owner, freed, "Slots released");
        } else {
            warn!(
                section_id = %section_id,
                owner = %owner,
                quantity,
                freed,
                "Released fewer slots than the reservation held"
            );
        }
        Ok(freed)
    }

    async fn available(&self, section_id: Uuid) -> AppResult<Option<i64>> {
        if self.slots.metadata(section_id).await?.is_none() {
            return Ok(None);
        }
        Ok(Some(i64::from(self.slots.available_count(section_id).await?)))
    }

    async fn available_many(&self, section_ids: &[Uuid]) -> AppResult<HashMap<Uuid, i64>> {
        let mut available = HashMap::with_capacity(section_ids.len());
        for id in section_ids {
            if let Some(count) = self.available(*id).await? {
                available.insert(*id, count);
            }
        }
        Ok(available)
    }

    async fn sweep_orphans(&self, section_id: Uuid, now: DateTime<Utc>) -> AppResult<u32> {
        if self.slots.metadata(section_id).await?.is_none() {
            return Ok(0);
        }
        self.slots.sweep_expired(section_id, now).await
    }

    async fn inspect(&self, section_id: Uuid, capacity: u32) -> AppResult<CapacitySnapshot> {
        if self.slots.metadata(section_id).await?.is_none() {
            return Err(AppError::coordination(format!(
                "Slots for section {section_id} are not initialized"
            )));
        }
        let stats = self.slots.stats(section_id).await?;
        if stats.total != capacity {
            warn!(
                section_id = %section_id,
                slots = stats.total,
                capacity,
                "Slot count differs from section capacity"
            );
        }
        Ok(CapacitySnapshot {
            total: i64::from(capacity),
            available: i64::from(stats.available),
            held: i64::from(stats.claimed) + i64::from(stats.finalized),
            slots: Some(stats),
        })
    }

    async fn recover(
        &self,
        section_id: Uuid,
        capacity: u32,
        live: &[Reservation],
    ) -> AppResult<RecoveryReport> {
        let available_before = match self.slots.metadata(section_id).await? {
            Some(meta) if meta.total_slots == capacity => {
                Some(i64::from(self.slots.available_count(section_id).await?))
            }
            _ => {
                self.slots.initialize(section_id, capacity).await?;
                None
            }
        };

        let by_id: HashMap<Uuid, &Reservation> = live.iter().map(|r| (r.id, r)).collect();
        let mut slots_freed = 0;
        for (owner, held) in self.slots.owners(section_id).await? {
            let excess = match by_id.get(&owner) {
                None => held.as_slice(),
                Some(r) => held.get(r.quantity.max(0) as usize..).unwrap_or_default(),
            };
            if !excess.is_empty() {
                slots_freed += self.slots.free(section_id, excess, owner).await?;
            }
        }

        let mut slots_restored = 0;
        for reservation in live {
            let mut owned = self.slots.find_by_owner(section_id, reservation.id).await?;
            let missing = (reservation.quantity.max(0) as usize).saturating_sub(owned.len()) as u32;
            if missing > 0 {
                match self
                    .slots
                    .reserve(section_id, missing, reservation.id, reservation.expires_at)
                    .await?
                {
                    Some(claimed) => {
                        slots_restored += claimed.len() as u32;
                        owned.extend(claimed);
                    }
                    None => {
                        let violation = AppError::invariant(format!(
                            "Section {section_id} has no free slots left for live reservation {}",
                            reservation.id
                        ));
                        error!(section_id = %section_id, error = %violation, "Capacity invariant violated");
                    }
                }
            }
            if reservation.status == ReservationStatus::Confirmed {
                slots_restored += self.slots.finalize(section_id, &owned, reservation.id).await?;
            }
        }

        let available_after = i64::from(self.slots.available_count(section_id).await?);
        if slots_freed > 0 || slots_restored > 0 {
            warn!(
                section_id = %section_id,
                slots_freed,
                slots_restored,
                available_after,
                "Slot drift repaired"
            );
        }

        Ok(RecoveryReport {
            section_id,
            available_before,
            available_after,
            slots_freed,
            slots_restored,
        })
    }
}
