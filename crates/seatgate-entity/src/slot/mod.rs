//! Per-unit slot entities used by the slot admission backend.

pub mod model;

pub use model::{SlotMetadata, SlotRecord, SlotStats, SlotStatus};
