//! Application layer - Generic services that use ports.

pub mod dispatcher;
pub mod processor;
pub mod router;
pub mod worker;
