//! Repository implementations for Seatgate entities.
//!
//! Read paths run against the pool. Writes that must commit together
//! take a `&mut PgConnection` so the store can run them inside one
//! transaction.

pub mod reservation;
pub mod reservation_log;
pub mod section;

pub use reservation::ReservationRepository;
pub use reservation_log::ReservationLogRepository;
pub use section::SectionRepository;

use seatgate_core::error::{AppError, ErrorKind};

/// Wrap a sqlx failure as a database error.
pub(crate) fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::Database, context, e)
}
