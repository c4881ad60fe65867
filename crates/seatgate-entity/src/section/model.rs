//! Section entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::status::SectionStatus;

/// A pool of finite capacity units (seats) in a venue.
///
/// `current_occupancy` is a display-side mirror of the admission backend;
/// the backend, not this column, decides admission.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Section {
    /// Unique section identifier.
    pub id: Uuid,
    /// Unique display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Total number of units (≥ 1).
    pub total_capacity: i32,
    /// Units held by pending or confirmed reservations.
    pub current_occupancy: i32,
    /// Whether the section accepts reservations.
    pub status: SectionStatus,
    /// Unit price in cents, if priced.
    pub price_cents: Option<i64>,
    /// When the section was created.
    pub created_at: DateTime<Utc>,
    /// When the section was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Section {
    /// Units not held by any live reservation, according to the durable store.
    pub fn available_units(&self) -> i32 {
        (self.total_capacity - self.current_occupancy).max(0)
    }

    /// Whether new reservations may be created.
    pub fn is_open(&self) -> bool {
        self.status == SectionStatus::Open
    }

    /// Price for `quantity` units, if the section is priced.
    pub fn price_for(&self, quantity: i32) -> Option<i64> {
        self.price_cents.map(|p| p * i64::from(quantity))
    }
}

/// Data required to create a new section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSection {
    /// Unique display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Total number of units.
    pub total_capacity: i32,
    /// Unit price in cents.
    pub price_cents: Option<i64>,
}
