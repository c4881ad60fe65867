//! In-process providers.

pub mod cache;
pub mod coordination;

pub use cache::MemoryCacheProvider;
pub use coordination::MemoryCoordinationStore;
