//! # seatgate-admission
//!
//! Decides which requests may take a unit of a section's capacity.
//!
//! - [`lock`]: token-owned mutual exclusion with TTL
//! - [`counter`]: one available-units integer per section
//! - [`slot`]: one addressable record per unit
//! - [`backend`]: the single [`AdmissionBackend`] contract the lifecycle
//!   manager uses, with counter and slot variants
//! - [`reconciler`]: drift detection and startup repair against the
//!   durable store

pub mod backend;
pub mod counter;
pub mod lock;
pub mod reconciler;
pub mod slot;

pub use backend::{AdmissionBackend, AdmissionDispatch, CapacitySnapshot, ClaimOutcome, RecoveryReport};
pub use counter::SeatCounter;
pub use lock::LockService;
pub use reconciler::{CapacityReconciler, DriftReport};
pub use slot::{BitmapSlotAllocator, SlotAllocator};
