//! # seatgate-database
//!
//! PostgreSQL connection management, repositories for sections,
//! reservations and their audit trail, and the [`ReservationStore`]
//! abstraction the lifecycle manager and reconciler depend on.

pub mod connection;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use store::{
    DeadlineGuard, MemoryReservationStore, PgReservationStore, ReservationStore, Transition,
};
