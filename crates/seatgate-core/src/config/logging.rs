//! Logging configuration.

use serde::{Deserialize, Serialize};

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line human readable output.
    Pretty,
}

/// Tracing subscriber settings for the server binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level for seatgate crates (`trace` .. `error`).
    #[serde(default = "default_level")]
    pub level: String,
    /// Line encoding.
    #[serde(default)]
    pub format: LogFormat,
    /// Level applied to the `sqlx` target.
    #[serde(default = "default_sqlx_level")]
    pub sqlx_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            sqlx_level: default_sqlx_level(),
        }
    }
}

impl LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub fn directive(&self) -> String {
        format!("{},sqlx={}", self.level, self.sqlx_level)
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_sqlx_level() -> String {
    "warn".to_string()
}
