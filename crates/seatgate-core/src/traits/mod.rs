//! Core traits defined in `seatgate-core` and implemented by other crates.

pub mod cache;
pub mod coordination;

pub use cache::CacheProvider;
pub use coordination::{CompareAndSubtract, CoordinationStore};
