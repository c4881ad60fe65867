//! Reservation lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reservation lifecycle state.
///
/// `Pending` is the only non-terminal state. A pending or confirmed
/// reservation is "live" and holds capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reservation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Holding capacity until the deadline.
    Pending,
    /// Finalized by its owner.
    Confirmed,
    /// Released by its owner.
    Cancelled,
    /// Released by the reconciler after the deadline.
    Expired,
}

impl ReservationStatus {
    /// Every state, in lifecycle order.
    pub const ALL: [ReservationStatus; 4] = [
        Self::Pending,
        Self::Confirmed,
        Self::Cancelled,
        Self::Expired,
    ];

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    /// Whether the reservation still holds capacity.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown reservation status '{other}'")),
        }
    }
}
