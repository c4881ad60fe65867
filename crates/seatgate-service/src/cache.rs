//! Read-through caching for service reads.
//!
//! Cached values are never consulted for admission decisions. A failing
//! cache degrades to a miss.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use seatgate_cache::{CacheManager, keys};
use seatgate_core::config::CacheConfig;
use seatgate_core::traits::CacheProvider;
use seatgate_entity::reservation::Reservation;

/// Cache handle with the configured TTL per entry kind.
#[derive(Debug, Clone)]
pub struct ReadCache {
    cache: CacheManager,
    reservation_ttl: Duration,
    list_ttl: Duration,
    section_ttl: Duration,
}

impl ReadCache {
    /// Wrap a cache manager with TTLs from `config`.
    pub fn new(cache: CacheManager, config: &CacheConfig) -> Self {
        Self {
            cache,
            reservation_ttl: Duration::from_secs(config.reservation_ttl_seconds),
            list_ttl: Duration::from_secs(config.list_ttl_seconds),
            section_ttl: Duration::from_secs(config.section_ttl_seconds),
        }
    }

    /// TTL for single reservations.
    pub fn reservation_ttl(&self) -> Duration {
        self.reservation_ttl
    }

    /// TTL for per-user reservation lists.
    pub fn list_ttl(&self) -> Duration {
        self.list_ttl
    }

    /// TTL for section availability.
    pub fn section_ttl(&self) -> Duration {
        self.section_ttl
    }

    /// Read a cached value.
    pub async fn read<T: DeserializeOwned + Send>(&self, key: &str) -> Option<T> {
        match self.cache.get_json::<T>(key).await {
            Ok(hit) => {
                debug!(key, hit = hit.is_some(), "Cache lookup");
                hit
            }
            Err(e) => {
                warn!(key, error = %e, "Cache read failed");
                None
            }
        }
    }

    /// Store a value.
    pub async fn write<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(e) = self.cache.set_json(key, value, ttl).await {
            warn!(key, error = %e, "Cache write failed");
        }
    }

    /// Drop everything derived from `reservation`: the record, its owner's
    /// lists and its section's availability.
    pub async fn invalidate_reservation(&self, reservation: &Reservation) {
        self.remove(&keys::reservation(reservation.id)).await;
        let pattern = keys::user_reservations_pattern(reservation.user_id);
        if let Err(e) = self.cache.delete_pattern(&pattern).await {
            warn!(pattern, error = %e, "Cache invalidation failed");
        }
        self.invalidate_section(reservation.section_id).await;
    }

    /// Drop a section's cached availability and the open-section listing.
    pub async fn invalidate_section(&self, section_id: Uuid) {
        self.remove(&keys::section(section_id)).await;
        self.remove(&keys::sections_available()).await;
    }

    async fn remove(&self, key: &str) {
        if let Err(e) = self.cache.delete(key).await {
            warn!(key, error = %e, "Cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use seatgate_entity::reservation::ReservationStatus;

    fn reservation() -> Reservation {
        let now = Utc::now();
        Reservation {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            section_id: Uuid::new_v4(),
            quantity: 2,
            status: ReservationStatus::Pending,
            confirmation_code: "ABCDEF01".to_string(),
            expires_at: now,
            confirmed_at: None,
            cancelled_at: None,
            total_price_cents: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_invalidation_clears_every_derived_entry() {
        let cache = ReadCache::new(CacheManager::in_memory(), &CacheConfig::default());
        let r = reservation();
        let ttl = Duration::from_secs(60);

        cache.write(&keys::reservation(r.id), &r, ttl).await;
        cache
            .write(&keys::user_reservations(r.user_id, None), &vec![r.clone()], ttl)
            .await;
        cache
            .write(&keys::user_reservations(r.user_id, Some("pending")), &vec![r.clone()], ttl)
            .await;
        cache.write(&keys::section(r.section_id), &5_i64, ttl).await;
        cache.write(&keys::sections_available(), &5_i64, ttl).await;

        cache.invalidate_reservation(&r).await;

        assert!(cache.read::<Reservation>(&keys::reservation(r.id)).await.is_none());
        assert!(cache
            .read::<Vec<Reservation>>(&keys::user_reservations(r.user_id, None))
            .await
            .is_none());
        assert!(cache
            .read::<Vec<Reservation>>(&keys::user_reservations(r.user_id, Some("pending")))
            .await
            .is_none());
        assert!(cache.read::<i64>(&keys::section(r.section_id)).await.is_none());
        assert!(cache.read::<i64>(&keys::sections_available()).await.is_none());
    }

    #[tokio::test]
    async fn test_read_back_written_value() {
        let cache = ReadCache::new(CacheManager::in_memory(), &CacheConfig::default());
        let r = reservation();
        cache.write(&keys::reservation(r.id), &r, cache.reservation_ttl()).await;

        let hit: Reservation = cache.read(&keys::reservation(r.id)).await.unwrap();
        assert_eq!(hit.id, r.id);
        assert_eq!(hit.status, ReservationStatus::Pending);
    }
}
