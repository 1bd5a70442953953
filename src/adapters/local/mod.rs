//! Local adapters for single-process runs and tests.

pub mod channel;
pub mod fs;
pub mod tracker;

pub use channel::MemoryChannel;
pub use fs::FsObjectStore;
pub use tracker::MemoryTracker;
