//! Reservation audit trail entities.

pub mod model;

pub use model::{ReservationAction, ReservationLog, SYSTEM_ACTOR};
