//! docindex library
//!
//! Incrementally indexes filesystem document trees into a search index. Each run
//! re-processes only files whose content changed since the last run, and a
//! separate cleanup job removes index entries whose files disappeared.
//!
//! The building blocks:
//! - [`comparer`]: persistent path hash → content hash map used for change detection
//! - [`jobs`]: the processing pipeline, the cleanup job and their shared state
//! - [`index`]: the search index abstraction with Elasticsearch and in-memory stores
//! - [`scheduler`]: periodic, non-reentrant job triggers

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod comparer;
pub mod config;
pub mod decode;
pub mod error;
pub mod index;
pub mod jobs;
pub mod kind;
pub mod observability;
pub mod scan;
pub mod scheduler;
pub mod server;

pub use config::Config;
pub use error::{Error, Result};
pub use kind::{DocumentKind, JobKey, JobRole};
