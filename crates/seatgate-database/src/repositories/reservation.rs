//! Reservation repository implementation.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use seatgate_core::result::AppResult;
use seatgate_entity::reservation::{
    NewReservation, Reservation, ReservationStatus, ReservationTally,
};

use super::db_err;
use crate::store::{DeadlineGuard, Transition};

/// Repository for reservation rows.
#[derive(Debug, Clone)]
pub struct ReservationRepository {
    pool: PgPool,
}

impl ReservationRepository {
    /// Create a new reservation repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a reservation by id regardless of owner.
    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Reservation>> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to find reservation"))
    }

    /// Find a reservation only if `user_id` owns it.
    pub async fn find_for_user(&self, id: Uuid, user_id: Uuid) -> AppResult<Option<Reservation>> {
        sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to find reservation"))
    }

    /// A user's reservations, newest first, optionally filtered by status.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<ReservationStatus>,
    ) -> AppResult<Vec<Reservation>> {
        let query = match status {
            Some(status) => sqlx::query_as::<_, Reservation>(
                "SELECT * FROM reservations WHERE user_id = $1 AND status = $2 \
                 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .bind(status),
            None => sqlx::query_as::<_, Reservation>(
                "SELECT * FROM reservations WHERE user_id = $1 ORDER BY created_at DESC",
            )
            .bind(user_id),
        };
        query
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("Failed to list reservations"))
    }

    /// Pending reservations whose deadline is before `now`, oldest deadline first.
    pub async fn find_expired_pending(&self, now: DateTime<Utc>) -> AppResult<Vec<Reservation>> {
        sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations WHERE status = 'pending' AND expires_at < $1 \
             ORDER BY expires_at",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to find expired reservations"))
    }

    /// Pending and confirmed reservations in a section.
    pub async fn find_live_for_section(&self, section_id: Uuid) -> AppResult<Vec<Reservation>> {
        sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations WHERE section_id = $1 \
             AND status IN ('pending', 'confirmed') ORDER BY created_at",
        )
        .bind(section_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to load live reservations"))
    }

    /// Count and quantity per status, for one section or all of them.
    pub async fn tallies(&self, section_id: Option<Uuid>) -> AppResult<Vec<ReservationTally>> {
        sqlx::query_as::<_, ReservationTally>(
            "SELECT status, COUNT(*) AS reservations, \
             COALESCE(SUM(quantity), 0)::BIGINT AS quantity \
             FROM reservations WHERE ($1::UUID IS NULL OR section_id = $1) \
             GROUP BY status ORDER BY status",
        )
        .bind(section_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to compute reservation stats"))
    }

    /// Insert a pending reservation.
    pub async fn insert(conn: &mut PgConnection, data: &NewReservation) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(
            "INSERT INTO reservations \
             (id, user_id, section_id, quantity, status, confirmation_code, expires_at, total_price_cents) \
             VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7) RETURNING *",
        )
        .bind(data.id)
        .bind(data.user_id)
        .bind(data.section_id)
        .bind(data.quantity)
        .bind(&data.confirmation_code)
        .bind(data.expires_at)
        .bind(data.total_price_cents)
        .fetch_one(conn)
        .await
        .map_err(db_err("Failed to insert reservation"))
    }

    /// Move a reservation to `transition.to` if its status is still one of
    /// `transition.from` and its deadline satisfies the guard.
    ///
    /// Returns `None` when the row no longer matches.
    pub async fn apply_transition(
        conn: &mut PgConnection,
        transition: &Transition,
    ) -> AppResult<Option<Reservation>> {
        let stamp = match transition.to {
            ReservationStatus::Confirmed => ", confirmed_at = $3",
            ReservationStatus::Cancelled => ", cancelled_at = $3",
            ReservationStatus::Pending | ReservationStatus::Expired => "",
        };
        let deadline = match transition.deadline {
            DeadlineGuard::Any => "",
            DeadlineGuard::NotPassed(_) => " AND expires_at >= $5",
            DeadlineGuard::Passed(_) => " AND expires_at < $5",
        };
        let sql = format!(
            "UPDATE reservations SET status = $2, updated_at = $3{stamp} \
             WHERE id = $1 AND status::TEXT = ANY($4){deadline} RETURNING *"
        );
        let from: Vec<String> = transition.from.iter().map(|s| s.as_str().to_string()).collect();

        let mut query = sqlx::query_as::<_, Reservation>(&sql)
            .bind(transition.reservation_id)
            .bind(transition.to)
            .bind(transition.at)
            .bind(from);
        if let DeadlineGuard::NotPassed(at) | DeadlineGuard::Passed(at) = transition.deadline {
            query = query.bind(at);
        }

        query
            .fetch_optional(conn)
            .await
            .map_err(db_err("Failed to update reservation status"))
    }
}
