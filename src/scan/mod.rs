//! File system enumeration.
//!
//! This module provides:
//! - Extension and exclude-substring filtering
//! - A restartable directory walk feeding the processing pipeline

mod enumerator;
mod filter;

pub use enumerator::{FileEnumerator, ScanStats, ScanStatsSnapshot};
pub use filter::FileFilter;
