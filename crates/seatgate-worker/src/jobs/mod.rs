//! Sweep jobs.

pub mod expiry;

pub use expiry::{ExpiryReconciler, SweepReport};
