//! # seatgate-entity
//!
//! Domain entity models for Seatgate. Every struct in this crate
//! represents a database table row or a coordination-store value object.
//! Database entities derive `sqlx::FromRow`.

pub mod audit;
pub mod reservation;
pub mod section;
pub mod slot;
