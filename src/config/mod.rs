//! Configuration management for docindex.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables
//! - JSON configuration file (lowest priority)

mod settings;

pub use settings::{Config, IndexConfig, JobSettings, Parallelism};
