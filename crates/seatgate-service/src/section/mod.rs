//! Section provisioning and availability.

pub mod service;

pub use service::{SectionAvailability, SectionService};
