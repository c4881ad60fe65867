//! Coordination store configuration.

use serde::{Deserialize, Serialize};

/// Where locks, counters, and slot sets live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Store type: `"memory"` (single process) or `"redis"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Redis connection settings, used when `provider = "redis"`.
    #[serde(default)]
    pub redis: RedisConfig,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            redis: RedisConfig::default(),
        }
    }
}

impl CoordinationConfig {
    /// Whether other processes observe the same locks, counters and slots.
    pub fn is_shared(&self) -> bool {
        self.provider != "memory"
    }
}

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Key prefix applied to every Seatgate key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_provider() -> String {
    "memory".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "seatgate:".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_provider_is_process_local() {
        let mut config = CoordinationConfig::default();
        assert!(!config.is_shared());

        config.provider = "redis".to_string();
        assert!(config.is_shared());
    }
}
