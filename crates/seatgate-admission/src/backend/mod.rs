//! The admission backend contract.
//!
//! The lifecycle manager only ever talks to [`AdmissionBackend`]. Whether
//! capacity is a single counter or a set of slots is a deployment choice
//! made once, through [`AdmissionDispatch`].

pub mod counter;
pub mod dispatch;
pub mod slots;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use seatgate_core::config::BackendKind;
use seatgate_core::result::AppResult;
use seatgate_entity::reservation::Reservation;
use seatgate_entity::slot::SlotStats;

pub use counter::CounterAdmission;
pub use dispatch::AdmissionDispatch;
pub use slots::SlotAdmission;

/// Result of a capacity claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimOutcome {
    /// Capacity is held for the owner. `slots` is empty for the counter backend.
    Granted {
        /// Slot ids claimed, ascending.
        slots: Vec<u32>,
    },
    /// Not enough free units; nothing is held.
    Exhausted {
        /// Units free when the claim was refused.
        available: i64,
    },
}

/// Point-in-time view of a section's capacity accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    /// Section capacity.
    pub total: i64,
    /// Units free to claim.
    pub available: i64,
    /// Units held by claims, finalized or not.
    pub held: i64,
    /// Per-status slot counts, slot backend only.
    pub slots: Option<SlotStats>,
}

impl CapacitySnapshot {
    /// Whether free plus held units account for the whole section.
    pub fn is_conserved(&self) -> bool {
        self.available >= 0
            && self.available + self.held == self.total
            && self.slots.is_none_or(|s| s.is_conserved())
    }
}

/// What startup recovery changed for one section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Section repaired.
    pub section_id: Uuid,
    /// Available units before repair, if the section was provisioned.
    pub available_before: Option<i64>,
    /// Available units after repair.
    pub available_after: i64,
    /// Slots freed because no live reservation owned them.
    pub slots_freed: u32,
    /// Slots claimed or finalized again for live reservations that lacked them.
    pub slots_restored: u32,
}

impl RecoveryReport {
    /// Whether recovery had anything to fix.
    pub fn repaired(&self) -> bool {
        self.available_before != Some(self.available_after)
            || self.slots_freed > 0
            || self.slots_restored > 0
    }
}

/// Capacity admission for sections.
#[async_trait]
pub trait AdmissionBackend: Send + Sync + std::fmt::Debug + 'static {
    /// Which variant this is.
    fn kind(&self) -> BackendKind;

    /// Lock resource that must be held around claim-and-persist, if any.
    fn claim_lock_key(&self, section_id: Uuid) -> Option<String>;

    /// Set up a section with all `capacity` units free.
    async fn provision(&self, section_id: Uuid, capacity: u32) -> AppResult<()>;

    /// Claim `quantity` units for `owner`, all or nothing.
    async fn claim(
        &self,
        section_id: Uuid,
        quantity: u32,
        owner: Uuid,
        expires_at: DateTime<Utc>,
    ) -> AppResult<ClaimOutcome>;

    /// Make `owner`'s claim permanent. Returns the number of units finalized.
    async fn finalize(&self, section_id: Uuid, owner: Uuid, quantity: u32) -> AppResult<u32>;

    /// Give `owner`'s units back. Returns the number of units released.
    async fn release(&self, section_id: Uuid, owner: Uuid, quantity: u32) -> AppResult<u32>;

    /// Units free to claim, `None` if the section is not provisioned.
    async fn available(&self, section_id: Uuid) -> AppResult<Option<i64>>;

    /// Free units for many sections; unprovisioned sections are left out.
    async fn available_many(&self, section_ids: &[Uuid]) -> AppResult<HashMap<Uuid, i64>>;

    /// Release claims whose own deadline passed without a durable
    /// transition. Returns the number of units freed.
    async fn sweep_orphans(&self, section_id: Uuid, now: DateTime<Utc>) -> AppResult<u32>;

    /// Current accounting for a section of `capacity` units.
    async fn inspect(&self, section_id: Uuid, capacity: u32) -> AppResult<CapacitySnapshot>;

    /// Rebuild a section's accounting from its durable live reservations.
    async fn recover(
        &self,
        section_id: Uuid,
        capacity: u32,
        live: &[Reservation],
    ) -> AppResult<RecoveryReport>;
}

/// Total quantity held by `live` reservations.
pub fn live_quantity(live: &[Reservation]) -> i64 {
    live.iter().map(|r| i64::from(r.quantity)).sum()
}
