//! Reservation entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::status::ReservationStatus;

/// A user's claim on a quantity of units in one section.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    /// Unique reservation identifier. Also the slot owner id.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Section the units come from.
    pub section_id: Uuid,
    /// Number of units held.
    pub quantity: i32,
    /// Lifecycle state.
    pub status: ReservationStatus,
    /// Short code shown to the user.
    pub confirmation_code: String,
    /// Hold deadline.
    pub expires_at: DateTime<Utc>,
    /// When confirmed.
    pub confirmed_at: Option<DateTime<Utc>>,
    /// When cancelled.
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Quantity times unit price, in cents.
    pub total_price_cents: Option<i64>,
    /// When the reservation was created.
    pub created_at: DateTime<Utc>,
    /// When the reservation was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Whether the hold deadline has passed at `now`.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Whether this reservation belongs to `user_id`.
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }
}

/// Data required to insert a pending reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReservation {
    /// Pre-generated identifier, already used as the capacity claim owner.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Section the units come from.
    pub section_id: Uuid,
    /// Number of units.
    pub quantity: i32,
    /// Short code shown to the user.
    pub confirmation_code: String,
    /// Hold deadline.
    pub expires_at: DateTime<Utc>,
    /// Quantity times unit price, in cents.
    pub total_price_cents: Option<i64>,
}

/// Reservation count and summed quantity for one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ReservationTally {
    /// Status being counted.
    pub status: ReservationStatus,
    /// Number of reservations in this status.
    pub reservations: i64,
    /// Sum of their quantities.
    pub quantity: i64,
}
