//! Process-wide job state tracking.
//!
//! A processing job and the cleanup job of the same document kind must not run at
//! the same time. Each job records `Running`/`Stopped` here, and checks the state of
//! its opposing job before doing any work.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Serialize;

use crate::kind::JobKey;

static GLOBAL: Lazy<Arc<JobStateRegistry>> = Lazy::new(|| Arc::new(JobStateRegistry::new()));

/// Run state of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Running,
    Stopped,
}

/// A recorded state and when it was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobStateEntry {
    pub state: JobState,
    pub updated_at: DateTime<Utc>,
}

/// The opposing job was found running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict {
    /// The job that was found running.
    pub opposing: JobKey,
    /// When it last changed state.
    pub since: DateTime<Utc>,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} running since {}", self.opposing, self.since.to_rfc3339())
    }
}

impl std::error::Error for Conflict {}

/// Typed registry of job states, one slot per [`JobKey`].
#[derive(Debug)]
pub struct JobStateRegistry {
    slots: Mutex<[Option<JobStateEntry>; JobKey::COUNT]>,
}

impl Default for JobStateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStateRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Mutex::new([None; JobKey::COUNT]),
        }
    }

    /// The process-wide registry.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Forget any recorded state for `key`.
    pub fn reset(&self, key: JobKey) {
        self.slots.lock()[key.slot()] = None;
        tracing::debug!(job = %key, "Job state reset");
    }

    /// Record `state` for `key` with the current time.
    pub fn set(&self, key: JobKey, state: JobState) {
        self.slots.lock()[key.slot()] = Some(JobStateEntry {
            state,
            updated_at: Utc::now(),
        });
        tracing::debug!(job = %key, ?state, "Job state updated");
    }

    /// Current state of `key`, if any was recorded.
    #[must_use]
    pub fn get(&self, key: JobKey) -> Option<JobStateEntry> {
        self.slots.lock()[key.slot()]
    }

    /// Mark `key` as running unless its opposing job is running.
    ///
    /// The check and the write happen under one lock, so the processing and cleanup
    /// jobs of a kind can never both pass. The returned guard marks the job
    /// `Stopped` when dropped, including on error and panic paths.
    ///
    /// # Errors
    ///
    /// Returns [`Conflict`] without changing any state if the opposing job is
    /// recorded as anything other than `Stopped`.
    pub fn try_begin(self: &Arc<Self>, key: JobKey) -> Result<RunGuard, Conflict> {
        let opposing = key.opposing();
        {
            let mut slots = self.slots.lock();
            if let Some(entry) = slots[opposing.slot()] {
                if entry.state != JobState::Stopped {
                    return Err(Conflict {
                        opposing,
                        since: entry.updated_at,
                    });
                }
            }
            slots[key.slot()] = Some(JobStateEntry {
                state: JobState::Running,
                updated_at: Utc::now(),
            });
        }
        tracing::debug!(job = %key, "Job state updated to Running");

        Ok(RunGuard {
            registry: Arc::clone(self),
            key,
        })
    }

    /// All recorded states.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(JobKey, JobStateEntry)> {
        let slots = self.slots.lock();
        crate::kind::DocumentKind::ALL
            .iter()
            .flat_map(|&kind| [JobKey::processing(kind), JobKey::cleanup(kind)])
            .filter_map(|key| slots[key.slot()].map(|entry| (key, entry)))
            .collect()
    }
}

/// Holds a job in the `Running` state; sets `Stopped` on drop.
#[derive(Debug)]
pub struct RunGuard {
    registry: Arc<JobStateRegistry>,
    key: JobKey,
}

impl RunGuard {
    /// The job this guard belongs to.
    #[must_use]
    pub const fn key(&self) -> JobKey {
        self.key
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry.set(self.key, JobState::Stopped);
    }
}
