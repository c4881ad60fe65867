//! Reservation domain entities.

pub mod model;
pub mod status;

pub use model::{NewReservation, Reservation, ReservationTally};
pub use status::ReservationStatus;
