//! Reservation lifecycle: create, confirm, cancel, expire, and reads.

pub mod code;
pub mod query;
pub mod service;

pub use query::ReservationStats;
pub use service::ReservationService;
