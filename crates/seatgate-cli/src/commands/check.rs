//! Capacity drift check command.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use seatgate_admission::reconciler::DriftReport;
use seatgate_core::error::AppError;
use seatgate_service::ServiceState;

use crate::output::{self, OutputFormat};

/// Arguments for the drift check
#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Rebuild every section's admission state from durable holds
    #[arg(long)]
    pub repair: bool,
}

/// Drift display row
#[derive(Debug, Serialize, Tabled)]
struct DriftRow {
    /// Section
    section: String,
    /// Capacity
    capacity: i64,
    /// Durably held
    held: i64,
    /// Backend free
    available: String,
    /// Drift
    drift: String,
    /// OK
    ok: String,
}

impl From<&DriftReport> for DriftRow {
    fn from(report: &DriftReport) -> Self {
        Self {
            section: report.section_name.clone(),
            capacity: report.capacity,
            held: report.durable_held,
            available: report
                .snapshot
                .map(|s| s.available.to_string())
                .unwrap_or_else(|| "-".to_string()),
            drift: report
                .drift()
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
            ok: if report.is_consistent() { "✓" } else { "✗" }.to_string(),
        }
    }
}

/// Execute the drift check
pub async fn execute(
    args: &CheckArgs,
    state: &ServiceState,
    format: OutputFormat,
) -> Result<(), AppError> {
    if args.repair {
        let reports = state.capacity.startup_recovery().await?;
        let repaired = reports.iter().filter(|r| r.repaired()).count();
        output::print_success(&format!(
            "Checked {} sections, repaired {repaired}",
            reports.len()
        ));
    }

    let reports = state.capacity.check_all().await?;
    let rows: Vec<DriftRow> = reports.iter().map(DriftRow::from).collect();
    output::print_list(&rows, format);

    let inconsistent = reports.iter().filter(|r| !r.is_consistent()).count();
    if inconsistent > 0 {
        output::print_warning(&format!(
            "{inconsistent} sections disagree with durable holds; rerun with --repair while traffic is stopped"
        ));
    }
    Ok(())
}
