//! Read-through cache configuration.

use serde::{Deserialize, Serialize};

/// Cache settings for section and reservation reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache provider type: `"memory"` or `"redis"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Maximum number of entries held by the in-memory cache.
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
    /// TTL for a single cached reservation, in seconds.
    #[serde(default = "default_reservation_ttl")]
    pub reservation_ttl_seconds: u64,
    /// TTL for a user's cached reservation list, in seconds.
    #[serde(default = "default_list_ttl")]
    pub list_ttl_seconds: u64,
    /// TTL for cached section availability, in seconds.
    #[serde(default = "default_section_ttl")]
    pub section_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            max_capacity: default_max_capacity(),
            reservation_ttl_seconds: default_reservation_ttl(),
            list_ttl_seconds: default_list_ttl(),
            section_ttl_seconds: default_section_ttl(),
        }
    }
}

fn default_provider() -> String {
    "memory".to_string()
}

fn default_max_capacity() -> u64 {
    10000
}

fn default_reservation_ttl() -> u64 {
    300
}

fn default_list_ttl() -> u64 {
    60
}

fn default_section_ttl() -> u64 {
    30
}
