//! Background reconciler configuration.

use serde::{Deserialize, Serialize};

/// Expiry sweep and capacity drift check configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Whether the background sweep runs in this process.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Interval in seconds between expiry sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Run one sweep immediately at startup.
    #[serde(default = "default_true")]
    pub run_on_start: bool,
    /// Cron expression (with seconds) for the capacity drift check.
    #[serde(default = "default_drift_check_cron")]
    pub drift_check_cron: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_seconds: default_sweep_interval(),
            run_on_start: true,
            drift_check_cron: default_drift_check_cron(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_drift_check_cron() -> String {
    "0 */5 * * * *".to_string()
}
