//! Section repository implementation.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use seatgate_core::result::AppResult;
use seatgate_entity::section::{CreateSection, Section, SectionStatus};

use super::db_err;

/// Repository for section rows.
#[derive(Debug, Clone)]
pub struct SectionRepository {
    pool: PgPool,
}

impl SectionRepository {
    /// Create a new section repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new open section with zero occupancy.
    pub async fn create(&self, data: &CreateSection) -> AppResult<Section> {
        sqlx::query_as::<_, Section>(
            "INSERT INTO sections (id, name, description, total_capacity, price_cents) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&data.name)
        .bind(&data.description)
        .bind(data.total_capacity)
        .bind(data.price_cents)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("Failed to create section"))
    }

    /// Find a section by id.
    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Section>> {
        sqlx::query_as::<_, Section>("SELECT * FROM sections WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to find section"))
    }

    /// List all sections ordered by name.
    pub async fn find_all(&self) -> AppResult<Vec<Section>> {
        sqlx::query_as::<_, Section>("SELECT * FROM sections ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("Failed to list sections"))
    }

    /// Change a section's status.
    pub async fn update_status(&self, id: Uuid, status: SectionStatus) -> AppResult<Option<Section>> {
        sqlx::query_as::<_, Section>(
            "UPDATE sections SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to update section status"))
    }

    /// Shift the occupancy mirror by `delta` units.
    ///
    /// The table's bounds constraint rejects any change that would leave
    /// occupancy below zero or above capacity.
    pub async fn adjust_occupancy(
        conn: &mut PgConnection,
        id: Uuid,
        delta: i32,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE sections SET current_occupancy = current_occupancy + $2, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(delta)
        .execute(conn)
        .await
        .map_err(db_err("Failed to adjust section occupancy"))?;
        Ok(())
    }
}
