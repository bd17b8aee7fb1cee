//! Processing and cleanup jobs, and the state and statistics they share.

pub mod cleanup;
pub mod processing;
pub mod state;
pub mod stats;

pub use cleanup::{CleanupJob, ReconcileReport};
pub use processing::ProcessingJob;
pub use state::{Conflict, JobState, JobStateEntry, JobStateRegistry, RunGuard};
pub use stats::{JobRunStatistic, RunCounts, RunStatistics, StatisticsStore};

use crate::kind::JobKey;
use crate::observability::metrics::JOB_RUNS;

/// How a job run ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome<T> {
    /// The job is configured inactive; nothing was touched.
    Inactive,
    /// The opposing job was running; nothing was touched.
    Conflict(Conflict),
    /// Cancelled part way; nothing was persisted.
    Cancelled(RunCounts),
    /// Ran to completion.
    Completed(T),
}

impl<T> JobOutcome<T> {
    /// Metric label for this outcome.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Conflict(_) => "conflict",
            Self::Cancelled(_) => "cancelled",
            Self::Completed(_) => "completed",
        }
    }

    /// The completed result, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }
}

pub(crate) fn record_outcome(key: JobKey, outcome: &str) {
    JOB_RUNS
        .with_label_values(&[key.kind.as_str(), key.role.as_str(), outcome])
        .inc();
}
