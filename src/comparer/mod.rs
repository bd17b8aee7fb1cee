//! Change detection.
//!
//! Tracks the content hash last indexed for every file so unchanged documents are
//! skipped on the next run.

mod store;

pub use store::{ComparerEntry, ComparerStore};
