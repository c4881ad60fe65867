//! Section status enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a section accepts new reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "section_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SectionStatus {
    /// Accepting reservations.
    Open,
    /// Closed to new reservations.
    Closed,
    /// Temporarily unavailable.
    Maintenance,
}

impl SectionStatus {
    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "maintenance" => Ok(Self::Maintenance),
            other => Err(format!("unknown section status '{other}'")),
        }
    }
}
