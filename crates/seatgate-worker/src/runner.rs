//! Periodic expiry sweep runner.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time;
use tracing::{error, info};

use seatgate_core::config::ReconcilerConfig;

use crate::jobs::ExpiryReconciler;

/// Repeats the expiry sweep until told to stop.
///
/// A sweep that has started always runs to the end; the stop signal is
/// only observed between sweeps.
#[derive(Debug)]
pub struct SweepRunner {
    /// The sweep to repeat.
    reconciler: Arc<ExpiryReconciler>,
    /// Pause between sweeps.
    interval: Duration,
    /// Sweep once immediately on start.
    run_on_start: bool,
}

impl SweepRunner {
    /// Create a runner from reconciler settings.
    pub fn new(reconciler: Arc<ExpiryReconciler>, config: &ReconcilerConfig) -> Self {
        Self {
            reconciler,
            interval: Duration::from_secs(config.sweep_interval_seconds.max(1)),
            run_on_start: config.run_on_start,
        }
    }

    /// Run until `cancel` turns `true`.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        info!(
            interval_seconds = self.interval.as_secs(),
            run_on_start = self.run_on_start,
            "Expiry sweep runner started"
        );

        if self.run_on_start {
            self.sweep_once().await;
        }

        loop {
            if *cancel.borrow() {
                break;
            }
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                _ = time::sleep(self.interval) => self.sweep_once().await,
            }
        }

        info!("Expiry sweep runner stopped");
    }

    async fn sweep_once(&self) {
        if let Err(e) = self.reconciler.run_sweep(Utc::now()).await {
            error!(error = %e, "Expiry sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    use seatgate_admission::{AdmissionBackend, AdmissionDispatch, LockService};
    use seatgate_cache::CacheManager;
    use seatgate_cache::memory::MemoryCoordinationStore;
    use seatgate_core::config::{CacheConfig, ReservationConfig};
    use seatgate_database::store::{MemoryReservationStore, ReservationStore};
    use seatgate_entity::reservation::ReservationStatus;
    use seatgate_entity::section::CreateSection;
    use seatgate_service::{ReadCache, ReservationService, SectionService};

    #[tokio::test(flavor = "multi_thread")]
    async fn test_runs_on_start_and_stops_on_signal() {
        let store = Arc::new(MemoryReservationStore::new());
        let backend = Arc::new(AdmissionDispatch::bitmap_slots());
        let cache = ReadCache::new(CacheManager::in_memory(), &CacheConfig::default());
        let config = ReservationConfig::default();
        let locks = LockService::new(
            Arc::new(MemoryCoordinationStore::new()),
            config.lock_retry_delay(),
        );
        let reservations =
            ReservationService::new(store.clone(), backend.clone(), locks, cache.clone(), config);
        let section = SectionService::new(store.clone(), backend.clone(), cache)
            .create_section(CreateSection {
                name: "Terrace".to_string(),
                description: None,
                total_capacity: 10,
                price_cents: None,
            })
            .await
            .unwrap();
        let held = reservations.create(Uuid::new_v4(), section.id, 4).await.unwrap();
        store
            .set_deadline(held.id, Utc::now() - ChronoDuration::seconds(1))
            .await
            .unwrap();

        let sweeper = Arc::new(ExpiryReconciler::new(reservations, store.clone(), backend.clone()));
        let runner = SweepRunner::new(
            sweeper,
            &ReconcilerConfig {
                sweep_interval_seconds: 3600,
                ..ReconcilerConfig::default()
            },
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { runner.run(rx).await });

        let mut expired = false;
        for _ in 0..100 {
            let current = store.find_by_id(held.id).await.unwrap().unwrap();
            if current.status == ReservationStatus::Expired {
                expired = true;
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert!(expired);
        assert_eq!(backend.available(section.id).await.unwrap(), Some(10));

        tx.send(true).unwrap();
        time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("runner stops promptly")
            .unwrap();
    }
}
