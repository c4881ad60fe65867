//! Durable reservation store abstraction.
//!
//! The lifecycle manager and the reconciler only talk to the system of
//! record through [`ReservationStore`]. Every write that belongs together
//! (row change, occupancy mirror, audit entry) commits together.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use uuid::Uuid;

use seatgate_core::result::AppResult;
use seatgate_entity::audit::ReservationLog;
use seatgate_entity::reservation::{
    NewReservation, Reservation, ReservationStatus, ReservationTally,
};
use seatgate_entity::section::{CreateSection, Section, SectionStatus};

pub use memory::MemoryReservationStore;
pub use postgres::PgReservationStore;

/// Deadline condition checked atomically with a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineGuard {
    /// No deadline condition.
    Any,
    /// `expires_at >= at`; used by confirm.
    NotPassed(DateTime<Utc>),
    /// `expires_at < at`; used by expiry.
    Passed(DateTime<Utc>),
}

impl DeadlineGuard {
    /// Whether a reservation with deadline `expires_at` passes the guard.
    pub fn admits(&self, expires_at: DateTime<Utc>) -> bool {
        match self {
            Self::Any => true,
            Self::NotPassed(at) => expires_at >= *at,
            Self::Passed(at) => expires_at < *at,
        }
    }
}

/// A conditional status change plus the audit entry that records it.
#[derive(Debug, Clone)]
pub struct Transition {
    /// Reservation to change.
    pub reservation_id: Uuid,
    /// Statuses the reservation must currently be in.
    pub from: Vec<ReservationStatus>,
    /// Target status.
    pub to: ReservationStatus,
    /// Deadline condition.
    pub deadline: DeadlineGuard,
    /// User id or `system`.
    pub actor: String,
    /// Details written to the audit entry.
    pub metadata: Option<serde_json::Value>,
    /// Transition timestamp.
    pub at: DateTime<Utc>,
}

impl Transition {
    /// Whether entering `to` gives the reservation's units back.
    pub fn releases_capacity(&self) -> bool {
        !self.to.is_live() && self.from.iter().any(|s| s.is_live())
    }
}

/// The durable system of record for sections and reservations.
#[async_trait]
pub trait ReservationStore: Send + Sync + Debug + 'static {
    /// Insert a new open section.
    async fn create_section(&self, data: &CreateSection) -> AppResult<Section>;

    /// Find a section by id.
    async fn find_section(&self, id: Uuid) -> AppResult<Option<Section>>;

    /// List every section.
    async fn list_sections(&self) -> AppResult<Vec<Section>>;

    /// Change a section's status.
    async fn set_section_status(
        &self,
        id: Uuid,
        status: SectionStatus,
    ) -> AppResult<Option<Section>>;

    /// Insert a pending reservation with its `created` log entry, raising
    /// the section's occupancy mirror in the same unit.
    async fn insert_pending(
        &self,
        data: &NewReservation,
        metadata: Option<serde_json::Value>,
    ) -> AppResult<Reservation>;

    /// Find a reservation by id regardless of owner.
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Reservation>>;

    /// Find a reservation only if `user_id` owns it.
    async fn find_for_user(&self, id: Uuid, user_id: Uuid) -> AppResult<Option<Reservation>>;

    /// A user's reservations, newest first.
    async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<ReservationStatus>,
    ) -> AppResult<Vec<Reservation>>;

    /// Apply a conditional transition. Returns `None` if the reservation
    /// is missing or no longer satisfies the transition's preconditions.
    async fn transition(&self, transition: &Transition) -> AppResult<Option<Reservation>>;

    /// Pending reservations whose deadline is before `now`.
    async fn find_expired_pending(&self, now: DateTime<Utc>) -> AppResult<Vec<Reservation>>;

    /// Pending and confirmed reservations in a section.
    async fn live_holds(&self, section_id: Uuid) -> AppResult<Vec<Reservation>>;

    /// Count and quantity per status.
    async fn status_tallies(&self, section_id: Option<Uuid>) -> AppResult<Vec<ReservationTally>>;

    /// Audit trail for one reservation, oldest first.
    async fn logs_for(&self, reservation_id: Uuid) -> AppResult<Vec<ReservationLog>>;
}
