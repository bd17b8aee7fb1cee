//! Directory enumeration for processing runs.
//!
//! Walks a scan root and yields every file accepted by a [`FileFilter`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::filter::FileFilter;
use crate::error::JobError;
use crate::Result;

/// Scan statistics.
#[derive(Debug, Default)]
pub struct ScanStats {
    pub files_found: AtomicU64,
    pub files_queued: AtomicU64,
    pub files_skipped: AtomicU64,
    pub errors: AtomicU64,
}

impl ScanStats {
    /// Create new stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> ScanStatsSnapshot {
        ScanStatsSnapshot {
            files_found: self.files_found.load(Ordering::Relaxed),
            files_queued: self.files_queued.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of scan stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStatsSnapshot {
    pub files_found: u64,
    pub files_queued: u64,
    pub files_skipped: u64,
    pub errors: u64,
}

/// Lists candidate files under a root.
///
/// Each call to [`FileEnumerator::iter`] starts a fresh walk, so the sequence can
/// be restarted any number of times.
#[derive(Debug, Clone)]
pub struct FileEnumerator {
    root: PathBuf,
    filter: FileFilter,
}

impl FileEnumerator {
    /// Create an enumerator over `root`.
    ///
    /// The root is canonicalized so yielded paths are absolute.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::ScanRoot`] if the root does not exist, cannot be read
    /// or is not a directory.
    pub fn open(root: impl AsRef<Path>, filter: FileFilter) -> Result<Self> {
        let root = root.as_ref();
        let scan_root_err = |reason: String| JobError::ScanRoot {
            path: root.display().to_string(),
            reason,
        };

        let root = std::fs::canonicalize(root).map_err(|e| scan_root_err(e.to_string()))?;
        if !root.is_dir() {
            return Err(scan_root_err("not a directory".to_string()).into());
        }
        std::fs::read_dir(&root).map_err(|e| scan_root_err(e.to_string()))?;

        Ok(Self { root, filter })
    }

    /// The canonical scan root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily walk the root, yielding matching file paths.
    ///
    /// Walk errors are logged and skipped.
    pub fn iter(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.walk(None)
    }

    fn walk<'a>(&'a self, stats: Option<&'a ScanStats>) -> impl Iterator<Item = PathBuf> + 'a {
        WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) => {
                    if !entry.file_type().is_file() {
                        return None;
                    }
                    if let Some(stats) = stats {
                        stats.files_found.fetch_add(1, Ordering::Relaxed);
                    }
                    if self.filter.matches(entry.path()) {
                        Some(entry.into_path())
                    } else {
                        if let Some(stats) = stats {
                            stats.files_skipped.fetch_add(1, Ordering::Relaxed);
                        }
                        None
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Error walking directory");
                    if let Some(stats) = stats {
                        stats.errors.fetch_add(1, Ordering::Relaxed);
                    }
                    None
                }
            })
    }

    /// Walk the root and push every match into `tx`.
    ///
    /// Blocks on channel capacity, so it must run on a blocking thread. Stops early
    /// when `cancel` fires or the receiver is dropped.
    pub fn send_all(
        &self,
        tx: &mpsc::Sender<PathBuf>,
        cancel: &CancellationToken,
    ) -> ScanStatsSnapshot {
        let stats = ScanStats::new();

        tracing::info!(path = %self.root.display(), "Starting directory scan");

        for path in self.walk(Some(&stats)) {
            if cancel.is_cancelled() {
                tracing::info!("Scan cancelled");
                break;
            }
            if tx.blocking_send(path).is_err() {
                tracing::debug!("Scan channel closed");
                break;
            }
            stats.files_queued.fetch_add(1, Ordering::Relaxed);
        }

        let snapshot = stats.snapshot();
        tracing::info!(
            path = %self.root.display(),
            found = snapshot.files_found,
            queued = snapshot.files_queued,
            skipped = snapshot.files_skipped,
            errors = snapshot.errors,
            "Directory scan complete"
        );

        snapshot
    }

    /// Run [`Self::send_all`] on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan task panics.
    pub async fn send_all_async(
        self,
        tx: mpsc::Sender<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<ScanStatsSnapshot> {
        tokio::task::spawn_blocking(move || self.send_all(&tx, &cancel))
            .await
            .map_err(|e| {
                JobError::Stage {
                    stage: "enumerate",
                    reason: e.to_string(),
                }
                .into()
            })
    }
}
