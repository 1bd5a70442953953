//! Framesplit - Video Frame Extraction Pipeline
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (segmentation, keys, messages)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations (aws, media tools, local)
//! - application/: Generic services (dispatcher, worker, router, processor)
//! - config: Environment configuration
//!
//! # Features
//! - `aws`: S3, SQS and DynamoDB adapters plus the `aws_processor` binary (default)

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod logging;
pub mod ports;

pub use config::{ConfigError, LocalConfig, ProcessorConfig};
