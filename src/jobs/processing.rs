//! Incremental processing job.
//!
//! Streams files through enumerate → decode → change filter → batch → bulk write,
//! each concurrent stage bounded by its own parallelism setting.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::state::JobStateRegistry;
use super::stats::{JobRunStatistic, RunStatistics, StatisticsStore};
use super::{record_outcome, JobOutcome};
use crate::comparer::{ComparerEntry, ComparerStore};
use crate::config::JobSettings;
use crate::decode::{DocumentDecoder, ExtractedDocument};
use crate::error::JobError;
use crate::index::IndexStore;
use crate::kind::{DocumentKind, JobKey};
use crate::observability::metrics::JOB_DURATION;
use crate::observability::spans;
use crate::scan::{FileEnumerator, FileFilter};
use crate::Result;

/// Processing job for one document kind.
pub struct ProcessingJob {
    kind: DocumentKind,
    settings: JobSettings,
    index_name: String,
    decoder: Arc<dyn DocumentDecoder>,
    index: Arc<dyn IndexStore>,
    registry: Arc<JobStateRegistry>,
}

/// Outcome of the write stage.
#[derive(Debug, Default, Clone, Copy)]
struct WriteSummary {
    batches_ok: u64,
    batches_failed: u64,
}

/// Everything a batch write needs, owned so write futures are `'static`.
#[derive(Clone)]
struct BatchWriter {
    index: Arc<dyn IndexStore>,
    index_name: Arc<str>,
    comparer: Arc<ComparerStore>,
    stats: Arc<RunStatistics>,
}

impl ProcessingJob {
    /// Create the job and clear any state left in `registry` for it.
    #[must_use]
    pub fn new(
        kind: DocumentKind,
        settings: JobSettings,
        index_name: impl Into<String>,
        decoder: Arc<dyn DocumentDecoder>,
        index: Arc<dyn IndexStore>,
        registry: Arc<JobStateRegistry>,
    ) -> Self {
        registry.reset(JobKey::processing(kind));
        Self {
            kind,
            settings,
            index_name: index_name.into(),
            decoder,
            index,
            registry,
        }
    }

    /// This job's identity.
    #[must_use]
    pub const fn key(&self) -> JobKey {
        JobKey::processing(self.kind)
    }

    /// Name of the index written to.
    #[must_use]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Run once.
    ///
    /// Returns without touching any data if the job is inactive or the cleanup job
    /// for the same kind is running. The job state is `Stopped` again when this
    /// returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan root is inaccessible, the comparer store
    /// cannot be loaded or saved, or the index service fails outside the
    /// per-batch write stage.
    pub async fn execute(&self, cancel: CancellationToken) -> Result<JobOutcome<JobRunStatistic>> {
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

        let stats = Arc::new(RunStatistics::new(self.kind));
        let span = spans::job_span(key, &self.index_name, &stats.id().to_string());
        let timer = JOB_DURATION
            .with_label_values(&[self.kind.as_str(), key.role.as_str()])
            .start_timer();

        let result = self.run(Arc::clone(&stats), &cancel).instrument(span).await;
        timer.observe_duration();

        match &result {
            Ok(outcome) => record_outcome(key, outcome.label()),
            Err(e) => {
                tracing::error!(job = %key, error = %e, "Processing run failed");
                record_outcome(key, "failed");
            }
        }
        result
    }

    async fn run(
        &self,
        stats: Arc<RunStatistics>,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome<JobRunStatistic>> {
        let filter = FileFilter::new(&self.settings.file_extension, &self.settings.exclude_filter);
        let enumerator = FileEnumerator::open(&self.settings.scan_path, filter)?;
        let comparer = Arc::new(ComparerStore::open(
            &self.settings.comparer_directory,
            self.kind,
        )?);

        tracing::info!(
            root = %enumerator.root().display(),
            tracked = comparer.len(),
            "Processing run started"
        );

        self.ensure_index(&comparer).await?;

        let summary = self
            .pipeline(enumerator, Arc::clone(&comparer), Arc::clone(&stats), cancel)
            .await?;

        if cancel.is_cancelled() {
            let counts = stats.counts();
            tracing::warn!(
                seen = counts.entire,
                changed = counts.changed,
                "Processing run cancelled, nothing persisted"
            );
            return Ok(JobOutcome::Cancelled(counts));
        }

        self.index.flush(&self.index_name).await?;
        self.index.refresh(&self.index_name).await?;

        let statistic = stats.finish();
        StatisticsStore::new(&self.settings.statistics_directory).persist(self.kind, &statistic);
        comparer.persist()?;

        tracing::info!(
            seen = statistic.entire_doc_count,
            changed = statistic.indexed_doc_count,
            failed = statistic.processing_error,
            batches_ok = summary.batches_ok,
            batches_failed = summary.batches_failed,
            elapsed_ms = statistic.elapsed_time_millis,
            "Processing run complete"
        );

        Ok(JobOutcome::Completed(statistic))
    }

    /// Create the index if missing. A new index starts empty, so the comparer is
    /// reset to force a full rebuild.
    async fn ensure_index(&self, comparer: &ComparerStore) -> Result<()> {
        if self.index.index_exists(&self.index_name).await? {
            return Ok(());
        }
        self.index.create_index(&self.index_name).await?;
        if !comparer.is_empty() {
            tracing::warn!(
                tracked = comparer.len(),
                "Index was missing, rebuilding from scratch"
            );
        }
        comparer.reset()
    }

    async fn pipeline(
        &self,
        enumerator: FileEnumerator,
        comparer: Arc<ComparerStore>,
        stats: Arc<RunStatistics>,
        cancel: &CancellationToken,
    ) -> Result<WriteSummary> {
        let parallelism = self.settings.parallelism;
        let (decoders, filters, writers) = (
            parallelism.decode.max(1),
            parallelism.filter.max(1),
            parallelism.write.max(1),
        );
        let (path_tx, path_rx) = mpsc::channel::<PathBuf>(decoders * 4);
        let scan = tokio::spawn(enumerator.send_all_async(path_tx, cancel.clone()));

        let decoder = Arc::clone(&self.decoder);
        let decode_stats = Arc::clone(&stats);
        let seen_stats = Arc::clone(&stats);
        let filter_stats = Arc::clone(&stats);
        let filter_comparer = Arc::clone(&comparer);

        let changed = ReceiverStream::new(path_rx)
            .take_until(cancel.clone().cancelled_owned())
            .inspect(move |_| seen_stats.record_seen())
            .map(move |path| decode_one(Arc::clone(&decoder), Arc::clone(&decode_stats), path))
            .buffer_unordered(decoders)
            .filter_map(future::ready)
            .map(move |doc| {
                let comparer = Arc::clone(&filter_comparer);
                let stats = Arc::clone(&filter_stats);
                async move {
                    if !ComparerEntry::is_recordable(&doc.original_path) {
                        tracing::warn!(
                            path = ?doc.original_path,
                            "Path contains a line break, skipping"
                        );
                        stats.record_failed(1);
                        return None;
                    }
                    comparer.filter_existing_unchanged(doc)
                }
            })
            .buffer_unordered(filters)
            .filter_map(future::ready);

        let batches = tokio_stream::StreamExt::chunks_timeout(
            changed,
            self.settings.batch_size.max(1),
            self.settings.batch_window(),
        );

        let writer = BatchWriter {
            index: Arc::clone(&self.index),
            index_name: Arc::from(self.index_name.as_str()),
            comparer,
            stats: Arc::clone(&stats),
        };
        let changed_stats = Arc::clone(&stats);

        let summary = batches
            .take_until(cancel.clone().cancelled_owned())
            .inspect(move |batch| changed_stats.record_changed(batch.len() as u64))
            .map(move |batch| writer.clone().write(batch))
            .buffer_unordered(writers)
            .fold(WriteSummary::default(), |mut acc, ok| {
                if ok {
                    acc.batches_ok += 1;
                } else {
                    acc.batches_failed += 1;
                }
                future::ready(acc)
            })
            .await;

        let scanned = scan.await.map_err(|e| JobError::Stage {
            stage: "enumerate",
            reason: e.to_string(),
        })??;
        tracing::debug!(
            found = scanned.files_found,
            queued = scanned.files_queued,
            errors = scanned.errors,
            "Enumeration finished"
        );

        Ok(summary)
    }
}

/// Decode one file on the blocking pool. Failures are logged, counted and
/// turned into `None`.
async fn decode_one(
    decoder: Arc<dyn DocumentDecoder>,
    stats: Arc<RunStatistics>,
    path: PathBuf,
) -> Option<ExtractedDocument> {
    let shown = path.display().to_string();
    match tokio::task::spawn_blocking(move || decoder.decode(&path)).await {
        Ok(Ok(doc)) => Some(doc),
        Ok(Err(e)) => {
            tracing::warn!(path = %shown, error = %e, "Failed to decode document");
            stats.record_failed(1);
            None
        }
        Err(e) => {
            tracing::error!(path = %shown, error = %e, "Decoder task failed");
            stats.record_failed(1);
            None
        }
    }
}

impl BatchWriter {
    /// Write one batch. On failure the batch's comparer entries are invalidated so
    /// the documents are resent on the next run and stay visible to cleanup.
    async fn write(self, batch: Vec<ExtractedDocument>) -> bool {
        let count = batch.len();
        let failure = match self.index.bulk_write(&self.index_name, &batch).await {
            Ok(true) => {
                tracing::debug!(count, "Batch indexed");
                return true;
            }
            Ok(false) => "rejected by index service".to_string(),
            Err(e) => e.to_string(),
        };

        let ids: Vec<&str> = batch.iter().map(|d| d.id.as_str()).collect();
        let invalidated = self.comparer.invalidate(&ids);
        self.stats.record_failed(count as u64);
        tracing::error!(
            count,
            invalidated,
            error = %failure,
            first = %batch.first().map_or("", |d| d.original_path.as_str()),
            "Batch write failed"
        );
        false
    }
}
