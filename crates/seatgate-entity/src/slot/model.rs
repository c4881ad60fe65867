//! Slot value objects.
//!
//! Slots live in the coordination store, not the database. These types
//! are what the allocators hand back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// State of a single unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    /// Free to claim.
    Available,
    /// Held by a pending reservation, with a deadline.
    Claimed,
    /// Held by a confirmed reservation, no deadline.
    Finalized,
}

impl SlotStatus {
    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Claimed => "claimed",
            Self::Finalized => "finalized",
        }
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SlotStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "claimed" => Ok(Self::Claimed),
            "finalized" => Ok(Self::Finalized),
            other => Err(format!("unknown slot status '{other}'")),
        }
    }
}

/// A single unit and its current holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    /// Unit index within the section, `0..total_slots`.
    pub slot_id: u32,
    /// Current state.
    pub status: SlotStatus,
    /// Owning reservation, absent when available.
    pub owner: Option<Uuid>,
    /// When the current holder claimed it.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Claim deadline, absent unless claimed.
    pub expires_at: Option<DateTime<Utc>>,
}

impl SlotRecord {
    /// A fresh, unowned slot.
    pub fn available(slot_id: u32) -> Self {
        Self {
            slot_id,
            status: SlotStatus::Available,
            owner: None,
            claimed_at: None,
            expires_at: None,
        }
    }

    /// Whether a claimed slot's deadline has passed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SlotStatus::Claimed && self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Per-status slot counts for one section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStats {
    /// Slots free to claim.
    pub available: u32,
    /// Slots held by pending reservations.
    pub claimed: u32,
    /// Slots held by confirmed reservations.
    pub finalized: u32,
    /// Total slots in the section.
    pub total: u32,
}

impl SlotStats {
    /// Whether every slot is in exactly one state.
    pub fn is_conserved(&self) -> bool {
        self.available + self.claimed + self.finalized == self.total
    }
}

/// Section-level slot bookkeeping written at initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMetadata {
    /// Number of slots created.
    pub total_slots: u32,
    /// Section capacity at initialization time.
    pub total_capacity: u32,
    /// When the section's slots were last initialized.
    pub initialized_at: DateTime<Utc>,
}
