//! # seatgate-cache
//!
//! Two kinds of fast store live here:
//!
//! - **coordination** stores implement [`CoordinationStore`]: locks and
//!   counters whose every operation is a single atomic step
//! - **cache** providers implement [`CacheProvider`]: read-through
//!   copies of durable rows that are safe to lose
//!
//! Both come in an in-process flavour ([moka](https://crates.io/crates/moka)
//! and [dashmap](https://crates.io/crates/dashmap)) and a Redis flavour.
//!
//! [`CoordinationStore`]: seatgate_core::traits::CoordinationStore
//! [`CacheProvider`]: seatgate_core::traits::CacheProvider

pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use provider::CacheManager;
#[cfg(feature = "redis-backend")]
pub use provider::coordination_store;
