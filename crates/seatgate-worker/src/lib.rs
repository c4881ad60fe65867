//! Background work for Seatgate.
//!
//! This crate provides:
//! - The expiry reconciler that turns overdue holds into `expired` and
//!   gives their capacity back
//! - A cancellable runner that repeats the sweep on a fixed interval
//! - A cron scheduler for capacity drift checks

pub mod jobs;
pub mod runner;
pub mod scheduler;

pub use jobs::{ExpiryReconciler, SweepReport};
pub use runner::SweepRunner;
pub use scheduler::CronScheduler;
