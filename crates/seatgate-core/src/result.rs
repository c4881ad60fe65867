//! Convenience result type alias for Seatgate.

use crate::error::AppError;

/// A specialized `Result` type for Seatgate operations.
pub type AppResult<T> = Result<T, AppError>;
