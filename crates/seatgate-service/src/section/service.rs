//! Section CRUD plus admission provisioning.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use seatgate_admission::{AdmissionBackend, CapacitySnapshot, RecoveryReport};
use seatgate_cache::keys;
use seatgate_core::error::AppError;
use seatgate_core::result::AppResult;
use seatgate_database::store::ReservationStore;
use seatgate_entity::section::{CreateSection, Section, SectionStatus};

use crate::cache::ReadCache;

/// A section with its free units as seen by the admission backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionAvailability {
    /// The section row.
    pub section: Section,
    /// Units free to claim. Falls back to the durable occupancy mirror
    /// when the backend has no state for the section.
    pub available: i64,
}

/// Manages sections and their admission state.
#[derive(Debug, Clone)]
pub struct SectionService {
    /// System of record.
    store: Arc<dyn ReservationStore>,
    /// Capacity admission.
    backend: Arc<dyn AdmissionBackend>,
    /// Read-through cache.
    cache: ReadCache,
}

impl SectionService {
    /// Creates a new section service.
    pub fn new(
        store: Arc<dyn ReservationStore>,
        backend: Arc<dyn AdmissionBackend>,
        cache: ReadCache,
    ) -> Self {
        Self {
            store,
            backend,
            cache,
        }
    }

    /// Create an open section and provision its capacity.
    pub async fn create_section(&self, data: CreateSection) -> AppResult<Section> {
        let name = data.name.trim();
        if name.is_empty() {
            return Err(AppError::validation("Section name must not be empty"));
        }
        if data.total_capacity < 1 {
            return Err(AppError::validation("Section capacity must be at least 1"));
        }
        if data.price_cents.is_some_and(|p| p < 0) {
            return Err(AppError::validation("Section price must not be negative"));
        }

        let section = self
            .store
            .create_section(&CreateSection {
                name: name.to_string(),
                ..data
            })
            .await?;

        if let Err(e) = self
            .backend
            .provision(section.id, section.total_capacity as u32)
            .await
        {
            error!(
                section_id = %section.id,
                error = %e,
                "Section stored but not provisioned; startup recovery will provision it"
            );
            return Err(e);
        }

        self.cache.invalidate_section(section.id).await;
        info!(
            section_id = %section.id,
            name = %section.name,
            capacity = section.total_capacity,
            backend = %self.backend.kind(),
            "Section created"
        );
        Ok(section)
    }

    /// A section by id.
    pub async fn get_section(&self, section_id: Uuid) -> AppResult<Section> {
        self.store
            .find_section(section_id)
            .await?
            .ok_or_else(|| AppError::not_found("Section not found"))
    }

    /// Every section regardless of status.
    pub async fn list_sections(&self) -> AppResult<Vec<Section>> {
        self.store.list_sections().await
    }

    /// Open sections with their free units, read in one batch.
    pub async fn list_available(&self) -> AppResult<Vec<SectionAvailability>> {
        let key = keys::sections_available();
        if let Some(cached) = self.cache.read::<Vec<SectionAvailability>>(&key).await {
            return Ok(cached);
        }

        let open: Vec<Section> = self
            .store
            .list_sections()
            .await?
            .into_iter()
            .filter(Section::is_open)
            .collect();
        let ids: Vec<Uuid> = open.iter().map(|s| s.id).collect();
        let counts = self.backend.available_many(&ids).await?;

        let listing: Vec<SectionAvailability> = open
            .into_iter()
            .map(|section| {
                let available = counts
                    .get(&section.id)
                    .copied()
                    .unwrap_or_else(|| i64::from(section.available_units()));
                SectionAvailability { section, available }
            })
            .collect();

        self.cache
            .write(&key, &listing, self.cache.section_ttl())
            .await;
        Ok(listing)
    }

    /// One section with its free units.
    pub async fn availability(&self, section_id: Uuid) -> AppResult<SectionAvailability> {
        let key = keys::section(section_id);
        if let Some(cached) = self.cache.read::<SectionAvailability>(&key).await {
            return Ok(cached);
        }

        let section = self.get_section(section_id).await?;
        let available = self
            .backend
            .available(section_id)
            .await?
            .unwrap_or_else(|| i64::from(section.available_units()));
        let entry = SectionAvailability { section, available };

        self.cache
            .write(&key, &entry, self.cache.section_ttl())
            .await;
        Ok(entry)
    }

    /// Open, close or put a section into maintenance.
    pub async fn set_status(&self, section_id: Uuid, status: SectionStatus) -> AppResult<Section> {
        let section = self
            .store
            .set_section_status(section_id, status)
            .await?
            .ok_or_else(|| AppError::not_found("Section not found"))?;

        self.cache.invalidate_section(section_id).await;
        info!(section_id = %section_id, status = %status, "Section status changed");
        Ok(section)
    }

    /// Admission accounting for a section, with per-status slot counts on
    /// the slot backend.
    pub async fn slot_stats(&self, section_id: Uuid) -> AppResult<CapacitySnapshot> {
        let section = self.get_section(section_id).await?;
        self.backend
            .inspect(section_id, section.total_capacity as u32)
            .await
    }

    /// Rebuild a section's admission state from its durable live holds.
    pub async fn reprovision(&self, section_id: Uuid) -> AppResult<RecoveryReport> {
        let section = self.get_section(section_id).await?;
        let live = self.store.live_holds(section_id).await?;
        let report = self
            .backend
            .recover(section_id, section.total_capacity as u32, &live)
            .await?;

        self.cache.invalidate_section(section_id).await;
        info!(
            section_id = %section_id,
            backend = %self.backend.kind(),
            live = live.len(),
            available = report.available_after,
            "Section reprovisioned"
        );
        Ok(report)
    }
}
