//! Ports - Trait definitions for every external capability.

pub mod media;
pub mod queue;
pub mod storage;
pub mod tracker;
