//! In-process slot allocator on two-level bitmaps.
//!
//! Each status keeps one bit per slot packed into 64-bit words, plus a
//! summary word per 64 words flagging which words are non-empty. Finding
//! a free slot is two `trailing_zeros` calls after skipping empty summary
//! words, so full regions of a large section cost nothing to pass over.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use seatgate_core::error::AppError;
use seatgate_core::result::AppResult;
use seatgate_entity::slot::{SlotMetadata, SlotRecord, SlotStats, SlotStatus};

use super::SlotAllocator;

/// Set bits of a word, lowest first.
struct Bits(u64);

impl Iterator for Bits {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.0 == 0 {
            return None;
        }
        let bit = self.0.trailing_zeros();
        self.0 &= self.0 - 1;
        Some(bit)
    }
}

/// Membership of one status, one bit per slot.
#[derive(Debug, Clone)]
struct StatusBitmap {
    words: Vec<u64>,
    summary: Vec<u64>,
    count: u32,
}

impl StatusBitmap {
    fn empty(len: u32) -> Self {
        let words = (len as usize).div_ceil(64);
        Self {
            words: vec![0; words],
            summary: vec![0; words.div_ceil(64)],
            count: 0,
        }
    }

    fn full(len: u32) -> Self {
        let mut map = Self::empty(len);
        let whole_words = (len / 64) as usize;
        for word in &mut map.words[..whole_words] {
            *word = u64::MAX;
        }
        if len % 64 != 0 {
            map.words[whole_words] = (1u64 << (len % 64)) - 1;
        }
        for (w, word) in map.words.iter().enumerate() {
            if *word != 0 {
                map.summary[w / 64] |= 1u64 << (w % 64);
            }
        }
        map.count = len;
        map
    }

    #[cfg(test)]
    fn contains(&self, slot: u32) -> bool {
        let (w, bit) = (slot as usize / 64, slot % 64);
        self.words.get(w).is_some_and(|word| word & (1u64 << bit) != 0)
    }

    fn insert(&mut self, slot: u32) -> bool {
        let (w, bit) = (slot as usize / 64, slot % 64);
        let mask = 1u64 << bit;
        if self.words[w] & mask != 0 {
            return false;
        }
        self.words[w] |= mask;
        self.summary[w / 64] |= 1u64 << (w % 64);
        self.count += 1;
        true
    }

    fn remove(&mut self, slot: u32) -> bool {
        let (w, bit) = (slot as usize / 64, slot % 64);
        let mask = 1u64 << bit;
        if self.words[w] & mask == 0 {
            return false;
        }
        self.words[w] &= !mask;
        if self.words[w] == 0 {
            self.summary[w / 64] &= !(1u64 << (w % 64));
        }
        self.count -= 1;
        true
    }

    fn first(&self) -> Option<u32> {
        let (s, summary) = self
            .summary
            .iter()
            .enumerate()
            .find(|(_, summary)| **summary != 0)?;
        let w = s * 64 + summary.trailing_zeros() as usize;
        Some((w * 64) as u32 + self.words[w].trailing_zeros())
    }

    fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(w, word)| Bits(*word).map(move |bit| (w * 64) as u32 + bit))
    }
}

/// All slot state of one section.
#[derive(Debug)]
struct SectionSlots {
    records: Vec<SlotRecord>,
    available: StatusBitmap,
    claimed: StatusBitmap,
    finalized: StatusBitmap,
    owners: HashMap<Uuid, BTreeSet<u32>>,
    meta: SlotMetadata,
}

impl SectionSlots {
    fn new(capacity: u32) -> Self {
        Self {
            records: (0..capacity).map(SlotRecord::available).collect(),
            available: StatusBitmap::full(capacity),
            claimed: StatusBitmap::empty(capacity),
            finalized: StatusBitmap::empty(capacity),
            owners: HashMap::new(),
            meta: SlotMetadata {
                total_slots: capacity,
                total_capacity: capacity,
                initialized_at: Utc::now(),
            },
        }
    }

    fn index(&mut self, status: SlotStatus) -> &mut StatusBitmap {
        match status {
            SlotStatus::Available => &mut self.available,
            SlotStatus::Claimed => &mut self.claimed,
            SlotStatus::Finalized => &mut self.finalized,
        }
    }

    fn move_slot(&mut self, slot: u32, from: SlotStatus, to: SlotStatus) {
        self.index(from).remove(slot);
        self.index(to).insert(slot);
        self.records[slot as usize].status = to;
    }

    fn owned_by(&self, slot: u32, owner: Uuid) -> Option<SlotStatus> {
        self.records
            .get(slot as usize)
            .filter(|r| r.owner == Some(owner))
            .map(|r| r.status)
    }

    fn claim(&mut self, owner: Uuid, expires_at: DateTime<Utc>) -> Option<u32> {
        let slot = self.available.first()?;
        self.move_slot(slot, SlotStatus::Available, SlotStatus::Claimed);
        let record = &mut self.records[slot as usize];
        record.owner = Some(owner);
        record.claimed_at = Some(Utc::now());
        record.expires_at = Some(expires_at);
        self.owners.entry(owner).or_default().insert(slot);
        Some(slot)
    }

    fn finalize(&mut self, slot: u32, owner: Uuid) -> bool {
        if self.owned_by(slot, owner) != Some(SlotStatus::Claimed) {
            return false;
        }
        self.move_slot(slot, SlotStatus::Claimed, SlotStatus::Finalized);
        self.records[slot as usize].expires_at = None;
        true
    }

    fn free(&mut self, slot: u32, owner: Uuid) -> bool {
        match self.owned_by(slot, owner) {
            Some(status @ (SlotStatus::Claimed | SlotStatus::Finalized)) => {
                self.reset(slot, status, owner);
                true
            }
            _ => false,
        }
    }

    fn reset(&mut self, slot: u32, from: SlotStatus, owner: Uuid) {
        self.move_slot(slot, from, SlotStatus::Available);
        self.records[slot as usize] = SlotRecord::available(slot);
        if let Some(held) = self.owners.get_mut(&owner) {
            held.remove(&slot);
            if held.is_empty() {
                self.owners.remove(&owner);
            }
        }
    }

    fn sweep(&mut self, now: DateTime<Utc>) -> u32 {
        let expired: Vec<(u32, Uuid)> = self
            .claimed
            .iter()
            .filter_map(|slot| {
                let record = &self.records[slot as usize];
                record
                    .is_expired(now)
                    .then_some(record.owner)
                    .flatten()
                    .map(|owner| (slot, owner))
            })
            .collect();
        for (slot, owner) in &expired {
            self.reset(*slot, SlotStatus::Claimed, *owner);
        }
        expired.len() as u32
    }

    fn stats(&self) -> SlotStats {
        SlotStats {
            available: self.available.count,
            claimed: self.claimed.count,
            finalized: self.finalized.count,
            total: self.meta.total_slots,
        }
    }
}

/// Slot allocator held in process memory.
///
/// Each section's state sits behind its own mutex; the critical sections
/// are constant-time bit operations, never I/O.
#[derive(Debug, Clone, Default)]
pub struct BitmapSlotAllocator {
    sections: Arc<DashMap<Uuid, Arc<Mutex<SectionSlots>>>>,
}

impl BitmapSlotAllocator {
    /// Create an allocator with no sections.
    pub fn new() -> Self {
        Self::default()
    }

    fn section(&self, section_id: Uuid) -> AppResult<Arc<Mutex<SectionSlots>>> {
        self.sections
            .get(&section_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                AppError::coordination(format!("Slots for section {section_id} are not initialized"))
            })
    }

    fn existing(&self, section_id: Uuid) -> Option<Arc<Mutex<SectionSlots>>> {
        self.sections.get(&section_id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl SlotAllocator for BitmapSlotAllocator {
    async fn initialize(&self, section_id: Uuid, capacity: u32) -> AppResult<SlotMetadata> {
        let slots = SectionSlots::new(capacity);
        let meta = slots.meta.clone();
        self.sections.insert(section_id, Arc::new(Mutex::new(slots)));
        info!(section_id = %section_id, capacity, "Slots initialized");
        Ok(meta)
    }

    async fn claim_one(
        &self,
        section_id: Uuid,
        owner: Uuid,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Option<u32>> {
        let section = self.section(section_id)?;
        let claimed = section.lock().await.claim(owner, expires_at);
        if let Some(slot) = claimed {
            debug!(section_id = %section_id, owner = %owner, slot, "Slot claimed");
        }
        Ok(claimed)
    }

    async fn finalize(&self, section_id: Uuid, slots: &[u32], owner: Uuid) -> AppResult<u32> {
        let section = self.section(section_id)?;
        let mut state = section.lock().await;
        Ok(slots.iter().filter(|slot| state.finalize(**slot, owner)).count() as u32)
    }

    async fn free(&self, section_id: Uuid, slots: &[u32], owner: Uuid) -> AppResult<u32> {
        let section = self.section(section_id)?;
        let mut state = section.lock().await;
        Ok(slots.iter().filter(|slot| state.free(**slot, owner)).count() as u32)
    }

    async fn available_count(&self, section_id: Uuid) -> AppResult<u32> {
        let section = self.section(section_id)?;
        let count = section.lock().await.available.count;
        Ok(count)
    }

    async fn find_by_owner(&self, section_id: Uuid, owner: Uuid) -> AppResult<Vec<u32>> {
        let Some(section) = self.existing(section_id) else {
            return Ok(Vec::new());
        };
        let state = section.lock().await;
        Ok(state
            .owners
            .get(&owner)
            .map(|held| held.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn sweep_expired(&self, section_id: Uuid, now: DateTime<Utc>) -> AppResult<u32> {
        let section = self.section(section_id)?;
        let freed = section.lock().await.sweep(now);
        if freed > 0 {
            info!(section_id = %section_id, freed, "Expired slot claims freed");
        }
        Ok(freed)
    }

    async fn stats(&self, section_id: Uuid) -> AppResult<SlotStats> {
        let section = self.section(section_id)?;
        let stats = section.lock().await.stats();
        Ok(stats)
    }

    async fn metadata(&self, section_id: Uuid) -> AppResult<Option<SlotMetadata>> {
        match self.existing(section_id) {
            Some(section) => Ok(Some(section.lock().await.meta.clone())),
            None => Ok(None),
        }
    }

    async fn owners(&self, section_id: Uuid) -> AppResult<HashMap<Uuid, Vec<u32>>> {
        let Some(section) = self.existing(section_id) else {
            return Ok(HashMap::new());
        };
        let state = section.lock().await;
        Ok(state
            .owners
            .iter()
            .map(|(owner, held)| (*owner, held.iter().copied().collect()))
            .collect())
    }

    async fn record(&self, section_id: Uuid, slot_id: u32) -> AppResult<Option<SlotRecord>> {
        let Some(section) = self.existing(section_id) else {
            return Ok(None);
        };
        let state = section.lock().await;
        Ok(state.records.get(slot_id as usize).cloned())
    }
}
