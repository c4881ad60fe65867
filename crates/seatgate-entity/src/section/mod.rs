//! Section domain entities.

pub mod model;
pub mod status;

pub use model::{CreateSection, Section};
pub use status::SectionStatus;
