//! Reconciliation job: removes index entries whose source file disappeared.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future;
use futures::{stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::state::JobStateRegistry;
use super::stats::RunCounts;
use super::{record_outcome, JobOutcome};
use crate::comparer::ComparerStore;
use crate::config::JobSettings;
use crate::index::IndexStore;
use crate::kind::{DocumentKind, JobKey};
use crate::observability::metrics::{JOB_DURATION, ORPHANS_REMOVED};
use crate::observability::spans;
use crate::Result;

/// What one reconciliation run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Comparer entries checked.
    pub checked: u64,
    /// Path hashes whose file no longer exists.
    pub orphans: Vec<String>,
    /// Entries the index reported as deleted.
    pub removed: u64,
    /// Whether the comparer file was rewritten.
    pub rewritten: bool,
}

/// Cleanup job for one document kind.
pub struct CleanupJob {
    kind: DocumentKind,
    settings: JobSettings,
    index_name: String,
    index: Arc<dyn IndexStore>,
    registry: Arc<JobStateRegistry>,
}

impl CleanupJob {
    /// Create the job and clear any state left in `registry` for it.
    #[must_use]
    pub fn new(
        kind: DocumentKind,
        settings: JobSettings,
        index_name: impl Into<String>,
        index: Arc<dyn IndexStore>,
        registry: Arc<JobStateRegistry>,
    ) -> Self {
        registry.reset(JobKey::cleanup(kind));
        Self {
            kind,
            settings,
            index_name: index_name.into(),
            index,
            registry,
        }
    }

    #[must_use]
    pub const fn key(&self) -> JobKey {
        JobKey::cleanup(self.kind)
    }

    /// Run once.
    ///
    /// Cancellation is honoured until removal starts; a cancelled run leaves the
    /// index and the comparer file untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the comparer file cannot be loaded or rewritten.
    /// Failed removal batches are logged and count as zero removed.
    pub async fn execute(&self, cancel: CancellationToken) -> Result<JobOutcome<ReconcileReport>> {
        let key = self.key();

        if !self.settings.active {
            tracing::info!(job = %key, "Job inactive, skipping");
            return Ok(JobOutcome::Inactive);
        }

        let _guard = match self.registry.try_begin(key) {
            Ok(guard) => guard,
            Err(conflict) => {
                tracing::warn!(job = %key, %conflict, "Opposing job running, skipping");
                record_outcome(key, "conflict");
                return Ok(JobOutcome::Conflict(conflict));
            }
        };

        let run_id = uuid::Uuid::new_v4().to_string();
        let span = spans::job_span(key, &self.index_name, &run_id);
        let timer = JOB_DURATION
            .with_label_values(&[self.kind.as_str(), key.role.as_str()])
            .start_timer();

        let result = self.run(&cancel).instrument(span).await;
        timer.observe_duration();

        match &result {
            Ok(outcome) => record_outcome(key, outcome.label()),
            Err(e) => {
                tracing::error!(job = %key, error = %e, "Cleanup run failed");
                record_outcome(key, "failed");
            }
        }
        result
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<JobOutcome<ReconcileReport>> {
        let comparer = ComparerStore::open(&self.settings.comparer_directory, self.kind)?;
        let entries = comparer.entries();
        let checked = entries.len() as u64;
        tracing::info!(entries = checked, "Cleanup run started");

        let parallelism = self.settings.parallelism;
        let orphans: Vec<String> = stream::iter(entries)
            .take_until(cancel.clone().cancelled_owned())
            .map(|entry| async move {
                let path = PathBuf::from(&entry.original_path);
                (!file_exists(path).await).then_some(entry.path_hash)
            })
            .buffer_unordered(parallelism.filter)
            .filter_map(future::ready)
            .collect()
            .await;

        if cancel.is_cancelled() {
            tracing::warn!(orphans = orphans.len(), "Cleanup run cancelled before removal");
            return Ok(JobOutcome::Cancelled(RunCounts {
                entire: checked,
                ..RunCounts::default()
            }));
        }

        if orphans.is_empty() {
            tracing::info!(checked, "No orphaned entries");
            return Ok(JobOutcome::Completed(ReconcileReport {
                checked,
                ..ReconcileReport::default()
            }));
        }

        let removed = self.remove_orphans(&orphans).await;
        ORPHANS_REMOVED
            .with_label_values(&[self.kind.as_str()])
            .inc_by(removed);

        let rewritten = if removed > 0 {
            comparer.remove(&orphans);
            comparer.persist()?;
            true
        } else {
            false
        };

        tracing::info!(
            checked,
            orphans = orphans.len(),
            removed,
            rewritten,
            "Cleanup run complete"
        );

        Ok(JobOutcome::Completed(ReconcileReport {
            checked,
            orphans,
            removed,
            rewritten,
        }))
    }

    async fn remove_orphans(&self, orphans: &[String]) -> u64 {
        let batches: Vec<Vec<String>> = orphans
            .chunks(self.settings.batch_size.max(1))
            .map(<[String]>::to_vec)
            .collect();

        stream::iter(batches)
            .map(|ids| {
                let store = Arc::clone(&self.index);
                let index = self.index_name.clone();
                async move {
                    match store.remove_by_id(&index, &ids).await {
                        Ok(removed) => {
                            tracing::debug!(requested = ids.len(), removed, "Orphans removed");
                            removed
                        }
                        Err(e) => {
                            tracing::error!(requested = ids.len(), error = %e, "Failed to remove orphans");
                            0
                        }
                    }
                }
            })
            .buffer_unordered(self.settings.parallelism.write)
            .fold(0, |total, removed| future::ready(total + removed))
            .await
    }
}

/// Whether `path` exists. An error while checking counts as existing, so an
/// unreadable share never causes deletions.
async fn file_exists(path: PathBuf) -> bool {
    match tokio::fs::try_exists(&path).await {
        Ok(exists) => exists,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Existence check failed, keeping entry");
            true
        }
    }
}
