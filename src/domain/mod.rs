//! Domain layer - Pure logic, no I/O.

pub mod keys;
pub mod messages;
pub mod segments;
