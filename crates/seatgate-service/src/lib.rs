//! # seatgate-service
//!
//! Use cases built on the admission backend and the durable store. The
//! outer API layer calls these services and nothing below them.
//!
//! Services follow constructor injection: every dependency is passed in
//! at construction time behind an `Arc`.

pub mod cache;
pub mod reservation;
pub mod section;
pub mod state;

pub use cache::ReadCache;
pub use reservation::{ReservationService, ReservationStats};
pub use section::{SectionAvailability, SectionService};
pub use state::ServiceState;
