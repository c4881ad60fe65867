//! # seatgate-core
//!
//! Core crate for Seatgate. Contains the coordination-store and cache
//! traits, configuration schemas, and the unified error system shared by
//! every admission and reservation crate.
//!
//! This crate has **no** internal dependencies on other Seatgate crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;

pub use error::{AppError, ErrorKind, TransitionRejection};
pub use result::AppResult;
