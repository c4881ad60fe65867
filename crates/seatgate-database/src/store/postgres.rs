//! PostgreSQL-backed [`ReservationStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use seatgate_core::error::{AppError, ErrorKind};
use seatgate_core::result::AppResult;
use seatgate_entity::audit::{ReservationAction, ReservationLog};
use seatgate_entity::reservation::{
    NewReservation, Reservation, ReservationStatus, ReservationTally,
};
use seatgate_entity::section::{CreateSection, Section, SectionStatus};

use super::{ReservationStore, Transition};
use crate::repositories::{ReservationLogRepository, ReservationRepository, SectionRepository};

/// Durable store composed from the section, reservation and log repositories.
#[derive(Debug, Clone)]
pub struct PgReservationStore {
    pool: PgPool,
    sections: SectionRepository,
    reservations: ReservationRepository,
    logs: ReservationLogRepository,
}

impl PgReservationStore {
    /// Build the store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            sections: SectionRepository::new(pool.clone()),
            reservations: ReservationRepository::new(pool.clone()),
            logs: ReservationLogRepository::new(pool.clone()),
            pool,
        }
    }

    async fn begin(&self) -> AppResult<sqlx::Transaction<'static, sqlx::Postgres>> {
        self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to start transaction", e)
        })
    }
}

fn commit_err(e: sqlx::Error) -> AppError {
    AppError::with_source(ErrorKind::Database, "Failed to commit transaction", e)
}

#[async_trait]
impl ReservationStore for PgReservationStore {
    async fn create_section(&self, data: &CreateSection) -> AppResult<Section> {
        self.sections.create(data).await
    }

    async fn find_section(&self, id: Uuid) -> AppResult<Option<Section>> {
        self.sections.find_by_id(id).await
    }

    async fn list_sections(&self) -> AppResult<Vec<Section>> {
        self.sections.find_all().await
    }

    async fn set_section_status(
        &self,
        id: Uuid,
        status: SectionStatus,
    ) -> AppResult<Option<Section>> {
        self.sections.update_status(id, status).await
    }

    async fn insert_pending(
        &self,
        data: &NewReservation,
        metadata: Option<serde_json::Value>,
    ) -> AppResult<Reservation> {
        let mut tx = self.begin().await?;

        let reservation = ReservationRepository::insert(&mut tx, data).await?;
        SectionRepository::adjust_occupancy(&mut tx, data.section_id, data.quantity).await?;
        ReservationLogRepository::append(
            &mut tx,
            reservation.id,
            ReservationAction::Created,
            &data.user_id.to_string(),
            metadata.as_ref(),
        )
        .await?;

        tx.commit().await.map_err(commit_err)?;
        Ok(reservation)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Reservation>> {
        self.reservations.find_by_id(id).await
    }

    async fn find_for_user(&self, id: Uuid, user_id: Uuid) -> AppResult<Option<Reservation>> {
        self.reservations.find_for_user(id, user_id).await
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<ReservationStatus>,
    ) -> AppResult<Vec<Reservation>> {
        self.reservations.list_for_user(user_id, status).await
    }

    async fn transition(&self, transition: &Transition) -> AppResult<Option<Reservation>> {
        let mut tx = self.begin().await?;

        let Some(updated) = ReservationRepository::apply_transition(&mut tx, transition).await?
        else {
            tx.rollback().await.map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to roll back transaction", e)
            })?;
            return Ok(None);
        };

        if transition.releases_capacity() {
            SectionRepository::adjust_occupancy(&mut tx, updated.section_id, -updated.quantity)
                .await?;
        }
        ReservationLogRepository::append(
            &mut tx,
            updated.id,
            ReservationAction::entering(transition.to),
            &transition.actor,
            transition.metadata.as_ref(),
        )
        .await?;

        tx.commit().await.map_err(commit_err)?;
        Ok(Some(updated))
    }

    async fn find_expired_pending(&self, now: DateTime<Utc>) -> AppResult<Vec<Reservation>> {
        self.reservations.find_expired_pending(now).await
    }

    async fn live_holds(&self, section_id: Uuid) -> AppResult<Vec<Reservation>> {
        self.reservations.find_live_for_section(section_id).await
    }

    async fn status_tallies(&self, section_id: Option<Uuid>) -> AppResult<Vec<ReservationTally>> {
        self.reservations.tallies(section_id).await
    }

    async fn logs_for(&self, reservation_id: Uuid) -> AppResult<Vec<ReservationLog>> {
        self.logs.find_by_reservation(reservation_id).await
    }
}
