//! Reservation statistics command.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use seatgate_core::error::AppError;
use seatgate_service::ServiceState;

use crate::output::{self, OutputFormat};

/// Arguments for stats
#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Limit to one section
    #[arg(long)]
    pub section: Option<String>,
}

/// Per-status display row
#[derive(Debug, Serialize, Tabled)]
struct StatusRow {
    /// Status
    status: String,
    /// Reservations
    reservations: i64,
    /// Units
    units: i64,
}

/// Execute stats
pub async fn execute(
    args: &StatsArgs,
    state: &ServiceState,
    format: OutputFormat,
) -> Result<(), AppError> {
    let section_id = args.section.as_deref().map(super::parse_id).transpose()?;
    let stats = state.reservations.stats(section_id).await?;

    let rows: Vec<StatusRow> = stats
        .by_status
        .iter()
        .map(|t| StatusRow {
            status: t.status.to_string(),
            reservations: t.reservations,
            units: t.quantity,
        })
        .collect();
    output::print_list(&rows, format);

    if format == OutputFormat::Table {
        output::print_kv("Held units", &stats.held_units().to_string());
        output::print_kv("Reservations", &stats.total_reservations().to_string());
    }
    Ok(())
}
