//! One-shot expiry sweep command.

use chrono::Utc;

use seatgate_core::error::AppError;
use seatgate_service::ServiceState;
use seatgate_worker::ExpiryReconciler;

use crate::output::{self, OutputFormat};

/// Run a single expiry sweep
pub async fn execute(state: &ServiceState, format: OutputFormat) -> Result<(), AppError> {
    let reconciler = ExpiryReconciler::new(
        state.reservations.clone(),
        state.store.clone(),
        state.backend.clone(),
    );
    let report = reconciler.run_sweep(Utc::now()).await?;

    output::print_success(&format!(
        "Expired {} of {} overdue holds, released {} orphaned units",
        report.expired, report.due, report.orphans_released
    ));
    if report.failed > 0 || report.sections_failed > 0 {
        output::print_warning("Some records failed and are left for the next sweep");
    }
    output::print_report(&report, format);
    Ok(())
}
