//! CLI command definitions and dispatch.

pub mod check;
pub mod section;
pub mod stats;
pub mod sweep;

use clap::{Parser, Subcommand};

use seatgate_core::config::{AppConfig, CoordinationConfig};
use seatgate_core::error::AppError;
use seatgate_service::ServiceState;

use crate::output::OutputFormat;

/// Seatgate: seat admission operator tools
#[derive(Debug, Parser)]
#[command(name = "seatgate", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Environment overlay (config/<env>.toml)
    #[arg(short, long, env = "SEATGATE_ENV", default_value = "development")]
    pub env: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Section management
    Section(section::SectionArgs),
    /// Expire overdue holds once and release orphaned claims
    Sweep,
    /// Compare admission state with durable holds
    Check(check::CheckArgs),
    /// Reservation counts per status
    Stats(stats::StatsArgs),
}

impl Commands {
    /// Name of the command when it reads or writes coordination state.
    fn coordination_command(&self) -> Option<&'static str> {
        match self {
            Self::Section(args) => match args.command {
                section::SectionCommand::Create { .. } => Some("section create"),
                section::SectionCommand::Provision { .. } => Some("section provision"),
                section::SectionCommand::Inspect { .. } => Some("section inspect"),
                _ => None,
            },
            Self::Sweep => Some("sweep"),
            Self::Check(_) => Some("check"),
            Self::Stats(_) => None,
        }
    }

    /// Reject commands whose coordination state would live only in this process.
    pub fn ensure_runnable(&self, coordination: &CoordinationConfig) -> Result<(), AppError> {
        match self.coordination_command() {
            Some(name) if !coordination.is_shared() => Err(AppError::configuration(format!(
                "`{name}` needs a shared coordination store; coordination.provider = \"{}\" \
                 only exists inside this process. Set coordination.provider = \"redis\"",
                coordination.provider
            ))),
            _ => Ok(()),
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let config = AppConfig::load(&self.config, &self.env)?;
        self.command.ensure_runnable(&config.coordination)?;
        let state = ServiceState::build(config).await?;
        match &self.command {
            Commands::Section(args) => section::execute(args, &state, self.format).await,
            Commands::Sweep => sweep::execute(&state, self.format).await,
            Commands::Check(args) => check::execute(args, &state, self.format).await,
            Commands::Stats(args) => stats::execute(args, &state, self.format).await,
        }
    }
}

/// Parse a UUID argument
pub fn parse_id(raw: &str) -> Result<uuid::Uuid, AppError> {
    uuid::Uuid::parse_str(raw).map_err(|e| AppError::validation(format!("Invalid UUID '{raw}': {e}")))
}
