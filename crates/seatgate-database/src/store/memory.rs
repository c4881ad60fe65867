//! In-process [`ReservationStore`] for single-node runs and tests.
//!
//! Enforces the same constraints as the PostgreSQL schema: unique section
//! names, occupancy bounds, and all-or-nothing writes.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use seatgate_core::error::AppError;
use seatgate_core::result::AppResult;
use seatgate_entity::audit::{ReservationAction, ReservationLog};
use seatgate_entity::reservation::{
    NewReservation, Reservation, ReservationStatus, ReservationTally,
};
use seatgate_entity::section::{CreateSection, Section, SectionStatus};

use super::{ReservationStore, Transition};

#[derive(Debug, Default)]
struct State {
    sections: HashMap<Uuid, Section>,
    reservations: HashMap<Uuid, Reservation>,
    logs: Vec<ReservationLog>,
}

impl State {
    fn adjust_occupancy(&mut self, section_id: Uuid, delta: i32) -> AppResult<()> {
        let section = self
            .sections
            .get_mut(&section_id)
            .ok_or_else(|| AppError::database(format!("Section {section_id} does not exist")))?;
        let next = section.current_occupancy + delta;
        if next < 0 || next > section.total_capacity {
            return Err(AppError::database(format!(
                "Occupancy {next} out of bounds for section {section_id} (capacity {})",
                section.total_capacity
            )));
        }
        section.current_occupancy = next;
        section.updated_at = Utc::now();
        Ok(())
    }

    fn append_log(
        &mut self,
        reservation_id: Uuid,
        action: ReservationAction,
        performed_by: String,
        metadata: Option<serde_json::Value>,
    ) {
        self.logs.push(ReservationLog {
            id: Uuid::new_v4(),
            reservation_id,
            action,
            performed_by,
            metadata,
            created_at: Utc::now(),
        });
    }
}

/// Reservation store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryReservationStore {
    state: RwLock<State>,
}

impl MemoryReservationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a reservation's deadline.
    pub async fn set_deadline(&self, id: Uuid, expires_at: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.state.write().await;
        let reservation = state
            .reservations
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Reservation {id} not found")))?;
        reservation.expires_at = expires_at;
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for MemoryReservationStore {
    async fn create_section(&self, data: &CreateSection) -> AppResult<Section> {
        let mut state = self.state.write().await;
        if state.sections.values().any(|s| s.name == data.name) {
            return Err(AppError::database(format!(
                "Section name '{}' already exists",
                data.name
            )));
        }
        if data.total_capacity < 1 {
            return Err(AppError::database("Section capacity must be at least 1"));
        }

        let now = Utc::now();
        let section = Section {
            id: Uuid::new_v4(),
            name: data.name.clone(),
            description: data.description.clone(),
            total_capacity: data.total_capacity,
            current_occupancy: 0,
            status: SectionStatus::Open,
            price_cents: data.price_cents,
            created_at: now,
            updated_at: now,
        };
        state.sections.insert(section.id, section.clone());
        Ok(section)
    }

    async fn find_section(&self, id: Uuid) -> AppResult<Option<Section>> {
        Ok(self.state.read().await.sections.get(&id).cloned())
    }

    async fn list_sections(&self) -> AppResult<Vec<Section>> {
        let mut sections: Vec<Section> =
            self.state.read().await.sections.values().cloned().collect();
        sections.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sections)
    }

    async fn set_section_status(
        &self,
        id: Uuid,
        status: SectionStatus,
    ) -> AppResult<Option<Section>> {
        let mut state = self.state.write().await;
        Ok(state.sections.get_mut(&id).map(|section| {
            section.status = status;
            section.updated_at = Utc::now();
            section.clone()
        }))
    }

    async fn insert_pending(
        &self,
        data: &NewReservation,
        metadata: Option<serde_json::Value>,
    ) -> AppResult<Reservation> {
        let mut state = self.state.write().await;
        if state.reservations.contains_key(&data.id) {
            return Err(AppError::database(format!(
                "Reservation {} already exists",
                data.id
            )));
        }
        state.adjust_occupancy(data.section_id, data.quantity)?;

        let now = Utc::now();
        let reservation = Reservation {
            id: data.id,
            user_id: data.user_id,
            section_id: data.section_id,
            quantity: data.quantity,
            status: ReservationStatus::Pending,
            confirmation_code: data.confirmation_code.clone(),
            expires_at: data.expires_at,
            confirmed_at: None,
            cancelled_at: None,
            total_price_cents: data.total_price_cents,
            created_at: now,
            updated_at: now,
        };
        state.reservations.insert(reservation.id, reservation.clone());
        state.append_log(
            reservation.id,
            ReservationAction::Created,
            data.user_id.to_string(),
            metadata,
        );
        Ok(reservation)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Reservation>> {
        Ok(self.state.read().await.reservations.get(&id).cloned())
    }

    async fn find_for_user(&self, id: Uuid, user_id: Uuid) -> AppResult<Option<Reservation>> {
        Ok(self
            .state
            .read()
            .await
            .reservations
            .get(&id)
            .filter(|r| r.is_owned_by(user_id))
            .cloned())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<ReservationStatus>,
    ) -> AppResult<Vec<Reservation>> {
        let state = self.state.read().await;
        let mut found: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.user_id == user_id && status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn transition(&self, transition: &Transition) -> AppResult<Option<Reservation>> {
        let mut state = self.state.write().await;
        let Some(current) = state.reservations.get(&transition.reservation_id).cloned() else {
            return Ok(None);
        };
        if !transition.from.contains(&current.status)
            || !transition.deadline.admits(current.expires_at)
        {
            return Ok(None);
        }

        if transition.releases_capacity() {
            state.adjust_occupancy(current.section_id, -current.quantity)?;
        }

        let mut updated = current;
        updated.status = transition.to;
        updated.updated_at = transition.at;
        match transition.to {
            ReservationStatus::Confirmed => updated.confirmed_at = Some(transition.at),
            ReservationStatus::Cancelled => updated.cancelled_at = Some(transition.at),
            ReservationStatus::Pending | ReservationStatus::Expired => {}
        }
        state.reservations.insert(updated.id, updated.clone());
        state.append_log(
            updated.id,
            ReservationAction::entering(transition.to),
            transition.actor.clone(),
            transition.metadata.clone(),
        );
        Ok(Some(updated))
    }

    async fn find_expired_pending(&self, now: DateTime<Utc>) -> AppResult<Vec<Reservation>> {
        let state = self.state.read().await;
        let mut expired: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Pending && r.expires_at < now)
            .cloned()
            .collect();
        expired.sort_by_key(|r| r.expires_at);
        Ok(expired)
    }

    async fn live_holds(&self, section_id: Uuid) -> AppResult<Vec<Reservation>> {
        let state = self.state.read().await;
        Ok(state
            .reservations
            .values()
            .filter(|r| r.section_id == section_id && r.status.is_live())
            .cloned()
            .collect())
    }

    async fn status_tallies(&self, section_id: Option<Uuid>) -> AppResult<Vec<ReservationTally>> {
        let state = self.state.read().await;
        let mut tallies = Vec::new();
        for status in ReservationStatus::ALL {
            let (reservations, quantity) = state
                .reservations
                .values()
                .filter(|r| r.status == status && section_id.is_none_or(|id| r.section_id == id))
                .fold((0i64, 0i64), |(n, q), r| (n + 1, q + i64::from(r.quantity)));
            if reservations > 0 {
                tallies.push(ReservationTally {
                    status,
                    reservations,
                    quantity,
                });
            }
        }
        Ok(tallies)
    }

    async fn logs_for(&self, reservation_id: Uuid) -> AppResult<Vec<ReservationLog>> {
        let state = self.state.read().await;
        Ok(state
            .logs
            .iter()
            .filter(|l| l.reservation_id == reservation_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DeadlineGuard;
    use chrono::Duration;
    use seatgate_entity::audit::SYSTEM_ACTOR;

    async fn store_with_section(capacity: i32) -> (MemoryReservationStore, Section) {
        let store = MemoryReservationStore::new();
        let section = store
            .create_section(&CreateSection {
                name: "Balcony".to_string(),
                description: None,
                total_capacity: capacity,
                price_cents: Some(1000),
            })
            .await
            .unwrap();
        (store, section)
    }

    fn pending(section_id: Uuid, quantity: i32, expires_at: DateTime<Utc>) -> NewReservation {
        NewReservation {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            section_id,
            quantity,
            confirmation_code: "ABCD1234".to_string(),
            expires_at,
            total_price_cents: Some(1000 * i64::from(quantity)),
        }
    }

    fn expire(id: Uuid, now: DateTime<Utc>) -> Transition {
        Transition {
            reservation_id: id,
            from: vec![ReservationStatus::Pending],
            to: ReservationStatus::Expired,
            deadline: DeadlineGuard::Passed(now),
            actor: SYSTEM_ACTOR.to_string(),
            metadata: None,
            at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_pending_tracks_occupancy_and_logs() {
        let (store, section) = store_with_section(10).await;
        let new = pending(section.id, 4, Utc::now() + Duration::minutes(15));
        store.insert_pending(&new, None).await.unwrap();

        let section = store.find_section(section.id).await.unwrap().unwrap();
        assert_eq!(section.current_occupancy, 4);

        let logs = store.logs_for(new.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, ReservationAction::Created);
        assert_eq!(logs[0].performed_by, new.user_id.to_string());
    }

    #[tokio::test]
    async fn test_occupancy_bound_rejects_insert() {
        let (store, section) = store_with_section(3).await;
        let new = pending(section.id, 4, Utc::now());
        assert!(store.insert_pending(&new, None).await.is_err());
        assert!(store.find_by_id(new.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transition_applies_once() {
        let (store, section) = store_with_section(10).await;
        let now = Utc::now();
        let new = pending(section.id, 5, now - Duration::seconds(1));
        store.insert_pending(&new, None).await.unwrap();

        let first = store.transition(&expire(new.id, now)).await.unwrap();
        assert_eq!(first.map(|r| r.status), Some(ReservationStatus::Expired));
        assert!(store.transition(&expire(new.id, now)).await.unwrap().is_none());

        let section = store.find_section(section.id).await.unwrap().unwrap();
        assert_eq!(section.current_occupancy, 0);
        assert_eq!(store.logs_for(new.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_deadline_guard_blocks_early_expiry() {
        let (store, section) = store_with_section(10).await;
        let now = Utc::now();
        let new = pending(section.id, 2, now + Duration::minutes(5));
        store.insert_pending(&new, None).await.unwrap();

        assert!(store.transition(&expire(new.id, now)).await.unwrap().is_none());
        let found = store.find_by_id(new.id).await.unwrap().unwrap();
        assert_eq!(found.status, ReservationStatus::Pending);
    }

    #[tokio::test]
    async fn test_owner_scoped_lookup() {
        let (store, section) = store_with_section(10).await;
        let new = pending(section.id, 1, Utc::now());
        store.insert_pending(&new, None).await.unwrap();

        assert!(store.find_for_user(new.id, new.user_id).await.unwrap().is_some());
        assert!(store.find_for_user(new.id, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_tallies() {
        let (store, section) = store_with_section(20).await;
        let now = Utc::now();
        for quantity in [2, 3] {
            store
                .insert_pending(&pending(section.id, quantity, now + Duration::minutes(1)), None)
                .await
                .unwrap();
        }
        let tallies = store.status_tallies(Some(section.id)).await.unwrap();
        assert_eq!(tallies.len(), 1);
        assert_eq!(tallies[0].status, ReservationStatus::Pending);
        assert_eq!(tallies[0].reservations, 2);
        assert_eq!(tallies[0].quantity, 5);
    }
}
