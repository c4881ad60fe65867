//! Per-unit slot allocation.
//!
//! Every unit of a section's capacity is a slot that cycles between
//! available, claimed and finalized. Claims take one slot at a time, so
//! concurrent claimants race for different slots instead of queueing on
//! a section lock.

pub mod bitmap;
#[cfg(feature = "redis-slots")]
pub mod redis;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use seatgate_core::result::AppResult;
use seatgate_entity::slot::{SlotMetadata, SlotRecord, SlotStats};

pub use bitmap::BitmapSlotAllocator;
#[cfg(feature = "redis-slots")]
pub use self::redis::RedisSlotAllocator;

/// Slot storage for every section.
///
/// `finalize` and `free` only touch slots owned by the given reservation;
/// the ownership check is part of the same atomic step as the mutation.
#[async_trait]
pub trait SlotAllocator: Send + Sync + std::fmt::Debug + 'static {
    /// Create `capacity` available slots, discarding any previous state.
    async fn initialize(&self, section_id: Uuid, capacity: u32) -> AppResult<SlotMetadata>;

    /// Move one available slot to claimed for `owner`. `None` when no slot is free.
    async fn claim_one(
        &self,
        section_id: Uuid,
        owner: Uuid,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Option<u32>>;

    /// Move the listed slots owned by `owner` from claimed to finalized.
    async fn finalize(&self, section_id: Uuid, slots: &[u32], owner: Uuid) -> AppResult<u32>;

    /// Return the listed slots owned by `owner` to available.
    async fn free(&self, section_id: Uuid, slots: &[u32], owner: Uuid) -> AppResult<u32>;

    /// Number of available slots.
    async fn available_count(&self, section_id: Uuid) -> AppResult<u32>;

    /// Slots held by `owner`, ascending.
    async fn find_by_owner(&self, section_id: Uuid, owner: Uuid) -> AppResult<Vec<u32>>;

    /// Free claimed slots whose deadline is at or before `now`.
    async fn sweep_expired(&self, section_id: Uuid, now: DateTime<Utc>) -> AppResult<u32>;

    /// Slot counts per status.
    async fn stats(&self, section_id: Uuid) -> AppResult<SlotStats>;

    /// Metadata written by `initialize`, if any.
    async fn metadata(&self, section_id: Uuid) -> AppResult<Option<SlotMetadata>>;

    /// Every owner in the section with its slots.
    async fn owners(&self, section_id: Uuid) -> AppResult<HashMap<Uuid, Vec<u32>>>;

    /// One slot's record.
    async fn record(&self, section_id: Uuid, slot_id: u32) -> AppResult<Option<SlotRecord>>;

    /// Claim `quantity` slots for `owner`, all or nothing.
    ///
    /// Returns `None` after rolling back any partial claim when the
    /// section runs out of slots.
    async fn reserve(
        &self,
        section_id: Uuid,
        quantity: u32,
        owner: Uuid,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Option<Vec<u32>>> {
        let mut claimed = Vec::with_capacity(quantity as usize);
        while claimed.len() < quantity as usize {
            match self.claim_one(section_id, owner, expires_at).await {
                Ok(Some(slot)) => claimed.push(slot),
                Ok(None) => {
                    self.roll_back(section_id, &claimed, owner).await?;
                    return Ok(None);
                }
                Err(e) => {
                    self.roll_back(section_id, &claimed, owner).await?;
                    return Err(e);
                }
            }
        }
        Ok(Some(claimed))
    }

    /// Free a partial claim made by [`SlotAllocator::reserve`].
    async fn roll_back(&self, section_id: Uuid, claimed: &[u32], owner: Uuid) -> AppResult<()> {
        if claimed.is_empty() {
            return Ok(());
        }
        let freed = self.free(section_id, claimed, owner).await?;
        if freed as usize != claimed.len() {
            warn!(
                section_id = %section_id,
                owner = %owner,
                claimed = claimed.len(),
                freed,
                "Partial slot claim rollback freed fewer slots than claimed"
            );
        }
        Ok(())
    }
}
