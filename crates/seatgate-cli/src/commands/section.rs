//! Section management CLI commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use seatgate_core::error::AppError;
use seatgate_entity::section::{CreateSection, SectionStatus};
use seatgate_service::{SectionAvailability, ServiceState};

use crate::output::{self, OutputFormat};

/// Arguments for section commands
#[derive(Debug, Args)]
pub struct SectionArgs {
    /// Section subcommand
    #[command(subcommand)]
    pub command: SectionCommand,
}

/// Section subcommands
#[derive(Debug, Subcommand)]
pub enum SectionCommand {
    /// Create and provision a section
    Create {
        /// Unique name
        #[arg(long)]
        name: String,
        /// Number of units
        #[arg(long)]
        capacity: i32,
        /// Unit price in cents
        #[arg(long)]
        price_cents: Option<i64>,
        /// Description
        #[arg(long)]
        description: Option<String>,
    },
    /// List sections with free units
    List {
        /// Only open sections
        #[arg(long)]
        open: bool,
    },
    /// Change a section's status (open, closed, maintenance)
    Status {
        /// Section ID
        id: String,
        /// New status
        status: String,
    },
    /// Rebuild a section's admission state from durable holds
    Provision {
        /// Section ID
        id: String,
    },
    /// Show a section's capacity accounting
    Inspect {
        /// Section ID
        id: String,
    },
}

/// Section display row
#[derive(Debug, Serialize, Tabled)]
struct SectionRow {
    /// Section ID
    id: String,
    /// Name
    name: String,
    /// Status
    status: String,
    /// Capacity
    capacity: i32,
    /// Free units
    available: i64,
    /// Unit price
    price: String,
}

impl From<&SectionAvailability> for SectionRow {
    fn from(entry: &SectionAvailability) -> Self {
        let s = &entry.section;
        Self {
            id: s.id.to_string(),
            name: s.name.clone(),
            status: s.status.to_string(),
            capacity: s.total_capacity,
            available: entry.available,
            price: s
                .price_cents
                .map(|c| format!("{}.{:02}", c / 100, c % 100))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Execute section commands
pub async fn execute(
    args: &SectionArgs,
    state: &ServiceState,
    format: OutputFormat,
) -> Result<(), AppError> {
    let sections = &state.sections;

    match &args.command {
        SectionCommand::Create {
            name,
            capacity,
            price_cents,
            description,
        } => {
            let section = sections
                .create_section(CreateSection {
                    name: name.clone(),
                    description: description.clone(),
                    total_capacity: *capacity,
                    price_cents: *price_cents,
                })
                .await?;
            output::print_success(&format!(
                "Section '{}' created with {} units ({})",
                section.name, section.total_capacity, section.id
            ));
        }
        SectionCommand::List { open } => {
            let entries = if *open {
                sections.list_available().await?
            } else {
                let mut entries = Vec::new();
                for section in sections.list_sections().await? {
                    entries.push(sections.availability(section.id).await?);
                }
                entries
            };
            let rows: Vec<SectionRow> = entries.iter().map(SectionRow::from).collect();
            output::print_list(&rows, format);
        }
        SectionCommand::Status { id, status } => {
            let status: SectionStatus = status.parse().map_err(AppError::validation)?;
            let section = sections.set_status(super::parse_id(id)?, status).await?;
            output::print_success(&format!("Section '{}' is now {}", section.name, section.status));
        }
        SectionCommand::Provision { id } => {
            let report = sections.reprovision(super::parse_id(id)?).await?;
            if report.repaired() {
                output::print_warning("Admission state differed from durable holds and was rebuilt");
            } else {
                output::print_success("Admission state already matched durable holds");
            }
            output::print_report(&report, format);
        }
        SectionCommand::Inspect { id } => {
            let snapshot = sections.slot_stats(super::parse_id(id)?).await?;
            if !snapshot.is_conserved() {
                output::print_warning("Capacity is not conserved");
            }
            output::print_report(&snapshot, format);
        }
    }

    Ok(())
}
