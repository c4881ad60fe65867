//! Reservation audit trail repository.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use seatgate_core::result::AppResult;
use seatgate_entity::audit::{ReservationAction, ReservationLog};

use super::db_err;

/// Append-only access to `reservation_logs`.
#[derive(Debug, Clone)]
pub struct ReservationLogRepository {
    pool: PgPool,
}

impl ReservationLogRepository {
    /// Create a new log repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All entries for one reservation, oldest first.
    pub async fn find_by_reservation(&self, reservation_id: Uuid) -> AppResult<Vec<ReservationLog>> {
        sqlx::query_as::<_, ReservationLog>(
            "SELECT * FROM reservation_logs WHERE reservation_id = $1 ORDER BY created_at, id",
        )
        .bind(reservation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to load reservation history"))
    }

    /// Append one entry.
    pub async fn append(
        conn: &mut PgConnection,
        reservation_id: Uuid,
        action: ReservationAction,
        performed_by: &str,
        metadata: Option<&serde_json::Value>,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO reservation_logs (id, reservation_id, action, performed_by, metadata) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(reservation_id)
        .bind(action)
        .bind(performed_by)
        .bind(metadata)
        .execute(conn)
        .await
        .map_err(db_err("Failed to append reservation log"))?;
        Ok(())
    }
}
