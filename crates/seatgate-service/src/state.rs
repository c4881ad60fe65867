//! Process-wide service graph built from configuration.

use std::sync::Arc;

use tracing::info;

use seatgate_admission::{AdmissionBackend, AdmissionDispatch, CapacityReconciler, LockService};
use seatgate_cache::{CacheManager, coordination_store};
use seatgate_core::config::AppConfig;
use seatgate_core::result::AppResult;
use seatgate_database::store::{PgReservationStore, ReservationStore};
use seatgate_database::{DatabasePool, migration};

use crate::cache::ReadCache;
use crate::reservation::ReservationService;
use crate::section::SectionService;

/// Every shared dependency, wired once at startup.
///
/// All fields are `Arc`-backed for cheap cloning across tasks.
#[derive(Debug, Clone)]
pub struct ServiceState {
    // ── Configuration ────────────────────────────────────────
    /// Application configuration
    pub config: Arc<AppConfig>,

    // ── Infrastructure ───────────────────────────────────────
    /// PostgreSQL connection pool
    pub database: DatabasePool,
    /// Durable system of record
    pub store: Arc<dyn ReservationStore>,
    /// Configured admission backend
    pub backend: Arc<dyn AdmissionBackend>,

    // ── Services ─────────────────────────────────────────────
    /// Reservation lifecycle
    pub reservations: ReservationService,
    /// Section provisioning and availability
    pub sections: SectionService,
    /// Drift check and startup repair
    pub capacity: Arc<CapacityReconciler>,
}

impl ServiceState {
    /// Connect to every backing store named in `config` and build the services.
    pub async fn build(config: AppConfig) -> AppResult<Self> {
        info!("Connecting to database...");
        let database = DatabasePool::connect(&config.database).await?;
        migration::run_migrations(database.pool()).await?;
        let store: Arc<dyn ReservationStore> =
            Arc::new(PgReservationStore::new(database.pool().clone()));

        let (coordination, redis) = coordination_store(&config.coordination).await?;
        let backend: Arc<dyn AdmissionBackend> = Arc::new(AdmissionDispatch::new(
            config.reservation.backend,
            coordination.clone(),
            redis.clone(),
        ));
        let cache = ReadCache::new(
            CacheManager::new(&config.cache, redis.as_ref())?,
            &config.cache,
        );
        let locks = LockService::new(coordination, config.reservation.lock_retry_delay());

        let reservations = ReservationService::new(
            store.clone(),
            backend.clone(),
            locks,
            cache.clone(),
            config.reservation.clone(),
        );
        let sections = SectionService::new(store.clone(), backend.clone(), cache);
        let capacity = Arc::new(CapacityReconciler::new(backend.clone(), store.clone()));

        info!(
            backend = %config.reservation.backend,
            coordination = %config.coordination.provider,
            cache = %config.cache.provider,
            "Services initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            database,
            store,
            backend,
            reservations,
            sections,
            capacity,
        })
    }
}
