//! Reservation log entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

use crate::reservation::ReservationStatus;

/// Actor recorded for transitions the system performs on its own.
pub const SYSTEM_ACTOR: &str = "system";

/// Kind of lifecycle event recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reservation_action", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReservationAction {
    /// Reservation created in pending state.
    Created,
    /// Reservation confirmed by its owner.
    Confirmed,
    /// Reservation cancelled by its owner.
    Cancelled,
    /// Reservation expired by the reconciler.
    Expired,
}

impl ReservationAction {
    /// The action recorded when a reservation enters `status`.
    pub fn entering(status: ReservationStatus) -> Self {
        match status {
            ReservationStatus::Pending => Self::Created,
            ReservationStatus::Confirmed => Self::Confirmed,
            ReservationStatus::Cancelled => Self::Cancelled,
            ReservationStatus::Expired => Self::Expired,
        }
    }

    /// Return the action as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for ReservationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row in the reservation audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReservationLog {
    /// Unique log entry id.
    pub id: Uuid,
    /// Reservation the event belongs to.
    pub reservation_id: Uuid,
    /// What happened.
    pub action: ReservationAction,
    /// User id, or [`SYSTEM_ACTOR`].
    pub performed_by: String,
    /// Free-form event details.
    pub metadata: Option<serde_json::Value>,
    /// When the event was recorded.
    pub created_at: DateTime<Utc>,
}
