//! Per-run document counters and the persisted run summary.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::kind::DocumentKind;
use crate::observability::metrics::{DOCUMENTS_CHANGED, DOCUMENTS_FAILED, DOCUMENTS_SEEN};
use crate::Result;

/// Summary of one completed processing run.
///
/// Serialized with the field names the statistics file has always used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRunStatistic {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "StartJob")]
    pub start_job: DateTime<Utc>,
    #[serde(rename = "EndJob")]
    pub end_job: DateTime<Utc>,
    #[serde(rename = "ElapsedTimeMillis")]
    pub elapsed_time_millis: u64,
    #[serde(rename = "EntireDocCount")]
    pub entire_doc_count: u64,
    #[serde(rename = "ProcessingError")]
    pub processing_error: u64,
    #[serde(rename = "IndexedDocCount")]
    pub indexed_doc_count: u64,
}

/// Snapshot of the live counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub entire: u64,
    pub failed: u64,
    pub changed: u64,
}

/// Counters for one run, shared by all pipeline stages.
#[derive(Debug)]
pub struct RunStatistics {
    id: Uuid,
    kind: DocumentKind,
    started_at: DateTime<Utc>,
    started: Instant,
    entire: AtomicU64,
    failed: AtomicU64,
    changed: AtomicU64,
}

impl RunStatistics {
    /// Start counting a new run.
    #[must_use]
    pub fn new(kind: DocumentKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            started_at: Utc::now(),
            started: Instant::now(),
            entire: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            changed: AtomicU64::new(0),
        }
    }

    /// Unique id of this run.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// One document found by the scanner.
    pub fn record_seen(&self) {
        self.entire.fetch_add(1, Ordering::Relaxed);
        DOCUMENTS_SEEN.with_label_values(&[self.kind.as_str()]).inc();
    }

    /// `n` documents failed to decode or write.
    pub fn record_failed(&self, n: u64) {
        self.failed.fetch_add(n, Ordering::Relaxed);
        DOCUMENTS_FAILED
            .with_label_values(&[self.kind.as_str()])
            .inc_by(n);
    }

    /// `n` new or changed documents entered the write stage.
    pub fn record_changed(&self, n: u64) {
        self.changed.fetch_add(n, Ordering::Relaxed);
        DOCUMENTS_CHANGED
            .with_label_values(&[self.kind.as_str()])
            .inc_by(n);
    }

    /// Current counter values.
    #[must_use]
    pub fn counts(&self) -> RunCounts {
        RunCounts {
            entire: self.entire.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            changed: self.changed.load(Ordering::Relaxed),
        }
    }

    /// Build the run summary as of now.
    #[must_use]
    pub fn finish(&self) -> JobRunStatistic {
        let counts = self.counts();
        let elapsed = self.started.elapsed();
        JobRunStatistic {
            id: self.id.to_string(),
            start_job: self.started_at,
            end_job: Utc::now(),
            elapsed_time_millis: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            entire_doc_count: counts.entire,
            processing_error: counts.failed,
            indexed_doc_count: counts.changed,
        }
    }
}

/// Directory of per-kind statistics files, each holding the latest run only.
#[derive(Debug, Clone)]
pub struct StatisticsStore {
    dir: PathBuf,
}

impl StatisticsStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Statistics file for `kind`.
    #[must_use]
    pub fn path(&self, kind: DocumentKind) -> PathBuf {
        self.dir.join(format!("{kind}_statistics.json"))
    }

    /// Overwrite the statistics file for `kind`.
    ///
    /// Failures are logged and swallowed. Returns whether the file was written.
    pub fn persist(&self, kind: DocumentKind, statistic: &JobRunStatistic) -> bool {
        let path = self.path(kind);
        match write_json(&self.dir, &path, statistic) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Run statistics saved");
                true
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to save run statistics");
                false
            }
        }
    }

    /// Latest statistics for `kind`, if a run has completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self, kind: DocumentKind) -> Result<Option<JobRunStatistic>> {
        let path = self.path(kind);
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_json(dir: &Path, path: &Path, statistic: &JobRunStatistic) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(statistic)?;
    std::fs::write(path, json)?;
    Ok(())
}
