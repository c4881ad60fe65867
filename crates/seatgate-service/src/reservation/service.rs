//! Reservation state machine on top of the admission backend.
//!
//! Ordering rules:
//!
//! - **create** claims capacity first, then writes the pending record.
//!   A failed write releases the claim before the error is returned.
//! - **confirm** finalizes the claim, then moves the record out of
//!   `pending` under a deadline guard.
//! - **cancel** and **expire** move the record first and only the caller
//!   that won the transition releases capacity, so concurrent attempts
//!   release at most once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use seatgate_admission::{AdmissionBackend, ClaimOutcome, LockService};
use seatgate_core::config::ReservationConfig;
use seatgate_core::error::{AppError, TransitionRejection};
use seatgate_core::result::AppResult;
use seatgate_database::store::{DeadlineGuard, ReservationStore, Transition};
use seatgate_entity::audit::SYSTEM_ACTOR;
use seatgate_entity::reservation::{NewReservation, Reservation, ReservationStatus};
use seatgate_entity::section::Section;

use super::code::generate_confirmation_code;
use crate::cache::ReadCache;

/// Orchestrates reservation transitions.
#[derive(Debug, Clone)]
pub struct ReservationService {
    /// System of record.
    pub(super) store: Arc<dyn ReservationStore>,
    /// Capacity admission.
    backend: Arc<dyn AdmissionBackend>,
    /// Section locks for backends that need them.
    locks: LockService,
    /// Read-through cache.
    pub(super) cache: ReadCache,
    /// Hold and lock settings.
    config: ReservationConfig,
}

impl ReservationService {
    /// Creates a new reservation service.
    pub fn new(
        store: Arc<dyn ReservationStore>,
        backend: Arc<dyn AdmissionBackend>,
        locks: LockService,
        cache: ReadCache,
        config: ReservationConfig,
    ) -> Self {
        Self {
            store,
            backend,
            locks,
            cache,
            config,
        }
    }

    /// Hold `quantity` units of a section for `user_id`.
    pub async fn create(
        &self,
        user_id: Uuid,
        section_id: Uuid,
        quantity: i32,
    ) -> AppResult<Reservation> {
        if quantity < 1 {
            return Err(AppError::validation("Quantity must be at least 1"));
        }

        let section = self
            .store
            .find_section(section_id)
            .await?
            .ok_or_else(|| AppError::not_found("Section not found"))?;
        if !section.is_open() {
            return Err(AppError::validation(format!(
                "Section '{}' is {} and not taking reservations",
                section.name, section.status
            )));
        }
        if quantity > section.total_capacity {
            return Err(AppError::capacity_exhausted(format!(
                "Section '{}' holds only {} units",
                section.name, section.total_capacity
            )));
        }

        // Admission runs detached so a dropped caller cannot strand a claim.
        let this = self.clone();
        let reservation = tokio::spawn(async move { this.admit(user_id, section, quantity).await })
            .await
            .map_err(|e| AppError::internal(format!("Reservation task failed: {e}")))??;

        self.cache.invalidate_reservation(&reservation).await;
        info!(
            reservation_id = %reservation.id,
            user_id = %user_id,
            section_id = %section_id,
            quantity,
            expires_at = %reservation.expires_at,
            "Reservation created"
        );
        Ok(reservation)
    }

    /// Confirm a pending reservation before its deadline.
    pub async fn confirm(&self, reservation_id: Uuid, user_id: Uuid) -> AppResult<Reservation> {
        let reservation = self.owned(reservation_id, user_id).await?;
        if let Some(rejection) = rejection_for(reservation.status) {
            return Err(AppError::invalid_transition(rejection));
        }

        let now = Utc::now();
        if reservation.is_past_deadline(now) {
            return Err(AppError::invalid_transition(TransitionRejection::Expired));
        }

        let quantity = reservation.quantity as u32;
        let finalized = self
            .backend
            .finalize(reservation.section_id, reservation.id, quantity)
            .await?;
        if finalized < quantity {
            // A concurrent cancel or expiry already took the claim back.
            return Err(self.lost_race(reservation.id).await);
        }

        let transition = Transition {
            reservation_id: reservation.id,
            from: vec![ReservationStatus::Pending],
            to: ReservationStatus::Confirmed,
            deadline: DeadlineGuard::NotPassed(now),
            actor: user_id.to_string(),
            metadata: Some(json!({
                "section_id": reservation.section_id,
                "quantity": reservation.quantity,
                "confirmation_code": reservation.confirmation_code,
            })),
            at: now,
        };
        let Some(confirmed) = self.store.transition(&transition).await? else {
            return Err(self.lost_race(reservation.id).await);
        };

        self.cache.invalidate_reservation(&confirmed).await;
        info!(
            reservation_id = %confirmed.id,
            user_id = %user_id,
            section_id = %confirmed.section_id,
            quantity = confirmed.quantity,
            "Reservation confirmed"
        );
        Ok(confirmed)
    }

    /// Cancel a pending or confirmed reservation.
    pub async fn cancel(&self, reservation_id: Uuid, user_id: Uuid) -> AppResult<Reservation> {
        let reservation = self.owned(reservation_id, user_id).await?;
        match reservation.status {
            ReservationStatus::Cancelled => {
                return Err(AppError::invalid_transition(
                    TransitionRejection::AlreadyCancelled,
                ));
            }
            ReservationStatus::Expired => {
                return Err(AppError::invalid_transition(TransitionRejection::Expired));
            }
            ReservationStatus::Pending | ReservationStatus::Confirmed => {}
        }

        let now = Utc::now();
        let transition = Transition {
            reservation_id: reservation.id,
            from: vec![ReservationStatus::Pending, ReservationStatus::Confirmed],
            to: ReservationStatus::Cancelled,
            deadline: DeadlineGuard::Any,
            actor: user_id.to_string(),
            metadata: Some(json!({
                "section_id": reservation.section_id,
                "quantity": reservation.quantity,
                "previous_status": reservation.status,
            })),
            at: now,
        };
        let Some(cancelled) = self.store.transition(&transition).await? else {
            return Err(self.lost_race(reservation.id).await);
        };

        self.release(&cancelled).await;
        self.cache.invalidate_reservation(&cancelled).await;
        info!(
            reservation_id = %cancelled.id,
            user_id = %user_id,
            section_id = %cancelled.section_id,
            quantity = cancelled.quantity,
            "Reservation cancelled"
        );
        Ok(cancelled)
    }

    /// Expire a reservation still pending past its deadline at `now`.
    ///
    /// Returns `false` when the reservation was already moved on, which
    /// makes repeated sweeps over the same records harmless.
    pub async fn expire(&self, reservation: &Reservation, now: DateTime<Utc>) -> AppResult<bool> {
        let transition = Transition {
            reservation_id: reservation.id,
            from: vec![ReservationStatus::Pending],
            to: ReservationStatus::Expired,
            deadline: DeadlineGuard::Passed(now),
            actor: SYSTEM_ACTOR.to_string(),
            metadata: Some(json!({
                "section_id": reservation.section_id,
                "quantity": reservation.quantity,
                "expires_at": reservation.expires_at,
            })),
            at: now,
        };
        let Some(expired) = self.store.transition(&transition).await? else {
            return Ok(false);
        };

        self.release(&expired).await;
        self.cache.invalidate_reservation(&expired).await;
        info!(
            reservation_id = %expired.id,
            section_id = %expired.section_id,
            quantity = expired.quantity,
            "Reservation expired"
        );
        Ok(true)
    }

    /// Claim and persist, under the section lock when the backend needs one.
    async fn admit(&self, user_id: Uuid, section: Section, quantity: i32) -> AppResult<Reservation> {
        let Some(resource) = self.backend.claim_lock_key(section.id) else {
            return self.claim_and_persist(user_id, &section, quantity).await;
        };

        let token = self
            .locks
            .acquire(&resource, self.config.lock_ttl(), self.config.lock_max_retries)
            .await?;
        let result = self.claim_and_persist(user_id, &section, quantity).await;
        if let Err(e) = self.locks.release(&resource, &token).await {
            warn!(resource, error = %e, "Section lock release failed");
        }
        result
    }

    async fn claim_and_persist(
        &self,
        user_id: Uuid,
        section: &Section,
        quantity: i32,
    ) -> AppResult<Reservation> {
        let id = Uuid::new_v4();
        let expires_at = Utc::now() + self.config.hold_duration();

        let slots = match self
            .backend
            .claim(section.id, quantity as u32, id, expires_at)
            .await?
        {
            ClaimOutcome::Granted { slots } => slots,
            ClaimOutcome::Exhausted { available } => {
                warn!(section_id = %section.id, quantity, available, "Section sold out");
                return Err(AppError::capacity_exhausted(format!(
                    "Section '{}' has {available} units left, {quantity} requested",
                    section.name
                )));
            }
        };

        let confirmation_code = generate_confirmation_code();
        let data = NewReservation {
            id,
            user_id,
            section_id: section.id,
            quantity,
            confirmation_code: confirmation_code.clone(),
            expires_at,
            total_price_cents: section.price_for(quantity),
        };
        let metadata = json!({
            "section_id": section.id,
            "quantity": quantity,
            "slots": slots,
            "confirmation_code": confirmation_code,
        });

        match self.store.insert_pending(&data, Some(metadata)).await {
            Ok(reservation) => Ok(reservation),
            Err(e) => {
                error!(
                    reservation_id = %id,
                    section_id = %section.id,
                    quantity,
                    error = %e,
                    "Pending write failed, releasing claim"
                );
                self.compensate(section.id, id, quantity).await;
                Err(e)
            }
        }
    }

    async fn compensate(&self, section_id: Uuid, owner: Uuid, quantity: i32) {
        match self.backend.release(section_id, owner, quantity as u32).await {
            Ok(released) if released == quantity as u32 => {}
            Ok(released) => {
                let violation = AppError::invariant(format!(
                    "Rollback for {owner} released {released} of {quantity} units"
                ));
                error!(section_id = %section_id, error = %violation, "Capacity invariant violated");
            }
            Err(e) => {
                error!(section_id = %section_id, owner = %owner, error = %e, "Rollback release failed");
            }
        }
    }

    async fn release(&self, reservation: &Reservation) {
        let quantity = reservation.quantity as u32;
        match self
            .backend
            .release(reservation.section_id, reservation.id, quantity)
            .await
        {
            Ok(released) if released == quantity => {}
            Ok(released) => {
                let violation = AppError::invariant(format!(
                    "Reservation {} released {released} of {quantity} units",
                    reservation.id
                ));
                error!(section_id = %reservation.section_id, error = %violation, "Capacity invariant violated");
            }
            Err(e) => {
                error!(
                    reservation_id = %reservation.id,
                    section_id = %reservation.section_id,
                    error = %e,
                    "Capacity release failed"
                );
            }
        }
    }

    /// Reservation owned by `user_id`; anything else is not found.
    pub(super) async fn owned(&self, reservation_id: Uuid, user_id: Uuid) -> AppResult<Reservation> {
        self.store
            .find_for_user(reservation_id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Reservation not found"))
    }

    /// Error for a transition that lost to a concurrent one.
    async fn lost_race(&self, reservation_id: Uuid) -> AppError {
        match self.store.find_by_id(reservation_id).await {
            Ok(Some(current)) => AppError::invalid_transition(
                rejection_for(current.status).unwrap_or(TransitionRejection::Expired),
            ),
            Ok(None) => AppError::not_found("Reservation not found"),
            Err(e) => e,
        }
    }
}

fn rejection_for(status: ReservationStatus) -> Option<TransitionRejection> {
    match status {
        ReservationStatus::Pending => None,
        ReservationStatus::Confirmed => Some(TransitionRejection::AlreadyConfirmed),
        ReservationStatus::Cancelled => Some(TransitionRejection::AlreadyCancelled),
        ReservationStatus::Expired => Some(TransitionRejection::Expired),
    }
}
