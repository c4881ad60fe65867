//! Owner-scoped reads and reservation statistics.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use seatgate_cache::keys;
use seatgate_core::error::AppError;
use seatgate_core::result::AppResult;
use seatgate_entity::audit::ReservationLog;
use seatgate_entity::reservation::{Reservation, ReservationStatus, ReservationTally};

use super::service::ReservationService;

/// Reservation counts per status, for one section or all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationStats {
    /// Section the numbers cover, `None` for every section.
    pub section_id: Option<Uuid>,
    /// One row per status, zero rows included.
    pub by_status: Vec<ReservationTally>,
}

impl ReservationStats {
    fn from_tallies(section_id: Option<Uuid>, tallies: Vec<ReservationTally>) -> Self {
        let by_status = ReservationStatus::ALL
            .iter()
            .map(|status| {
                tallies
                    .iter()
                    .find(|t| t.status == *status)
                    .copied()
                    .unwrap_or(ReservationTally {
                        status: *status,
                        reservations: 0,
                        quantity: 0,
                    })
            })
            .collect();
        Self {
            section_id,
            by_status,
        }
    }

    /// Tally for one status.
    pub fn tally(&self, status: ReservationStatus) -> Option<&ReservationTally> {
        self.by_status.iter().find(|t| t.status == status)
    }

    /// Units currently held by pending and confirmed reservations.
    pub fn held_units(&self) -> i64 {
        self.by_status
            .iter()
            .filter(|t| t.status.is_live())
            .map(|t| t.quantity)
            .sum()
    }

    /// Number of reservations in any status.
    pub fn total_reservations(&self) -> i64 {
        self.by_status.iter().map(|t| t.reservations).sum()
    }
}

impl ReservationService {
    /// A reservation owned by `user_id`.
    pub async fn get(&self, reservation_id: Uuid, user_id: Uuid) -> AppResult<Reservation> {
        let key = keys::reservation(reservation_id);
        if let Some(cached) = self.cache.read::<Reservation>(&key).await {
            return if cached.is_owned_by(user_id) {
                Ok(cached)
            } else {
                Err(AppError::not_found("Reservation not found"))
            };
        }

        let reservation = self.owned(reservation_id, user_id).await?;
        self.cache
            .write(&key, &reservation, self.cache.reservation_ttl())
            .await;
        Ok(reservation)
    }

    /// A user's reservations, newest first, optionally filtered by status.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<ReservationStatus>,
    ) -> AppResult<Vec<Reservation>> {
        let key = keys::user_reservations(user_id, status.map(|s| s.as_str()));
        if let Some(cached) = self.cache.read::<Vec<Reservation>>(&key).await {
            return Ok(cached);
        }

        let reservations = self.store.list_for_user(user_id, status).await?;
        self.cache
            .write(&key, &reservations, self.cache.list_ttl())
            .await;
        Ok(reservations)
    }

    /// Counts and quantities per status.
    pub async fn stats(&self, section_id: Option<Uuid>) -> AppResult<ReservationStats> {
        let tallies = self.store.status_tallies(section_id).await?;
        Ok(ReservationStats::from_tallies(section_id, tallies))
    }

    /// Audit trail of a reservation owned by `user_id`, oldest first.
    pub async fn history(
        &self,
        reservation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Vec<ReservationLog>> {
        let reservation = self.owned(reservation_id, user_id).await?;
        self.store.logs_for(reservation.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_fill_missing_statuses() {
        let stats = ReservationStats::from_tallies(
            None,
            vec![
                ReservationTally {
                    status: ReservationStatus::Pending,
                    reservations: 2,
                    quantity: 5,
                },
                ReservationTally {
                    status: ReservationStatus::Confirmed,
                    reservations: 1,
                    quantity: 3,
                },
                ReservationTally {
                    status: ReservationStatus::Expired,
                    reservations: 4,
                    quantity: 9,
                },
            ],
        );

        assert_eq!(stats.by_status.len(), 4);
        assert_eq!(stats.held_units(), 8);
        assert_eq!(stats.total_reservations(), 7);
        assert_eq!(
            stats.tally(ReservationStatus::Cancelled).map(|t| t.quantity),
            Some(0)
        );
    }
}
