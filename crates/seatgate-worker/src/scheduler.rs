//! Cron scheduler for capacity drift checks.

use std::sync::Arc;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{error, info};

use seatgate_admission::CapacityReconciler;
use seatgate_core::error::AppError;
use seatgate_core::result::AppResult;

/// Cron-based scheduler for periodic checks.
pub struct CronScheduler {
    /// The underlying job scheduler.
    scheduler: JobScheduler,
    /// Drift checker.
    reconciler: Arc<CapacityReconciler>,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler").finish()
    }
}

impl CronScheduler {
    /// Create a new cron scheduler.
    pub async fn new(reconciler: Arc<CapacityReconciler>) -> AppResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;

        Ok(Self {
            scheduler,
            reconciler,
        })
    }

    /// Check every section's accounting on `schedule` (six-field cron).
    ///
    /// Disagreements are logged as invariant violations; nothing is repaired.
    pub async fn register_drift_check(&self, schedule: &str) -> AppResult<()> {
        let reconciler = Arc::clone(&self.reconciler);
        let job = CronJob::new_async(schedule, move |_uuid, _lock| {
            let reconciler = Arc::clone(&reconciler);
            Box::pin(async move {
                if let Err(e) = reconciler.check_all().await {
                    error!(error = %e, "Capacity drift check failed");
                }
            })
        })
        .map_err(|e| {
            AppError::configuration(format!("Invalid drift check schedule '{schedule}': {e}"))
        })?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add drift check schedule: {e}")))?;

        info!(schedule, "Registered: capacity drift check");
        Ok(())
    }

    /// Start the scheduler.
    pub async fn start(&self) -> AppResult<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;

        info!("Cron scheduler started");
        Ok(())
    }

    /// Shut the scheduler down.
    pub async fn shutdown(&mut self) -> AppResult<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {e}")))?;

        info!("Cron scheduler shut down");
        Ok(())
    }
}
