//! Reservation lifecycle and admission backend configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which admission backend guards section capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// One integer counter per section, claim+persist serialized by a lock.
    #[default]
    Counter,
    /// One addressable slot per unit, claimed individually without a lock.
    Slots,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter => write!(f, "counter"),
            Self::Slots => write!(f, "slots"),
        }
    }
}

/// Reservation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationConfig {
    /// Active admission backend.
    #[serde(default)]
    pub backend: BackendKind,
    /// How long a pending reservation holds its capacity, in minutes.
    #[serde(default = "default_hold_minutes")]
    pub hold_minutes: i64,
    /// TTL of the per-section creation lock, in milliseconds.
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_ms: u64,
    /// Acquisition attempts before reporting contention.
    #[serde(default = "default_lock_retries")]
    pub lock_max_retries: u32,
    /// Fixed delay between acquisition attempts, in milliseconds.
    #[serde(default = "default_lock_retry_delay")]
    pub lock_retry_delay_ms: u64,
}

impl ReservationConfig {
    /// Hold duration as a chrono duration.
    pub fn hold_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.hold_minutes)
    }

    /// Lock TTL as a std duration.
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    /// Retry delay as a std duration.
    pub fn lock_retry_delay(&self) -> Duration {
        Duration::from_millis(self.lock_retry_delay_ms)
    }
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            hold_minutes: default_hold_minutes(),
            lock_ttl_ms: default_lock_ttl(),
            lock_max_retries: default_lock_retries(),
            lock_retry_delay_ms: default_lock_retry_delay(),
        }
    }
}

fn default_hold_minutes() -> i64 {
    15
}

fn default_lock_ttl() -> u64 {
    10_000
}

fn default_lock_retries() -> u32 {
    20
}

fn default_lock_retry_delay() -> u64 {
    50
}
