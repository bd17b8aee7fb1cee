//! Periodic job triggers.
//!
//! Each trigger owns one tokio task ticking at a fixed period. A run is awaited
//! before the next tick is taken, so a trigger never overlaps itself; ticks missed
//! while a run is in progress are skipped. Triggers can be paused and resumed by
//! name through a [`SchedulerControl`], and a run that exceeds its timeout is asked
//! to cancel.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

type RunFn = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, ()> + Send + Sync>;

/// A named, periodically invoked job.
pub struct Trigger {
    name: String,
    period: Duration,
    timeout: Option<Duration>,
    run: RunFn,
}

impl Trigger {
    /// Invoke `run` every `period`, starting immediately.
    ///
    /// `run` receives a token that fires on timeout or scheduler shutdown.
    pub fn new<F, Fut>(name: impl Into<String>, period: Duration, run: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            period,
            timeout: None,
            run: Arc::new(move |cancel| run(cancel).boxed()),
        }
    }

    /// Cancel runs still going after `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Collects triggers before they are started.
pub struct Scheduler {
    triggers: Vec<Trigger>,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Create a scheduler that stops when `shutdown` fires.
    #[must_use]
    pub const fn new(shutdown: CancellationToken) -> Self {
        Self {
            triggers: Vec::new(),
            shutdown,
        }
    }

    /// Register a trigger. A later trigger with the same name replaces the earlier one.
    pub fn add(&mut self, trigger: Trigger) {
        self.triggers.retain(|t| t.name != trigger.name);
        self.triggers.push(trigger);
    }

    /// Number of registered triggers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Start one task per trigger.
    #[must_use]
    pub fn spawn(self) -> SchedulerHandle {
        let mut paused = BTreeMap::new();
        let mut tasks = Vec::with_capacity(self.triggers.len());

        for trigger in self.triggers {
            let flag = Arc::new(AtomicBool::new(false));
            paused.insert(trigger.name.clone(), Arc::clone(&flag));
            tasks.push(tokio::spawn(run_trigger(trigger, flag, self.shutdown.clone())));
        }

        tracing::info!(triggers = tasks.len(), "Scheduler started");

        SchedulerHandle {
            control: SchedulerControl {
                paused: Arc::new(paused),
            },
            shutdown: self.shutdown,
            tasks,
        }
    }
}

/// Pauses and resumes the triggers of a running scheduler. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct SchedulerControl {
    paused: Arc<BTreeMap<String, Arc<AtomicBool>>>,
}

impl SchedulerControl {
    /// Stop starting new runs of `name`. A run in progress is not interrupted.
    ///
    /// Returns `false` if no trigger has that name.
    pub fn pause(&self, name: &str) -> bool {
        self.set_paused(name, true)
    }

    /// Undo [`Self::pause`].
    pub fn resume(&self, name: &str) -> bool {
        self.set_paused(name, false)
    }

    #[must_use]
    pub fn is_paused(&self, name: &str) -> Option<bool> {
        self.paused.get(name).map(|flag| flag.load(Ordering::SeqCst))
    }

    /// Every trigger name with its paused flag, sorted by name.
    pub fn states(&self) -> impl Iterator<Item = (&str, bool)> {
        self.paused
            .iter()
            .map(|(name, flag)| (name.as_str(), flag.load(Ordering::SeqCst)))
    }

    fn set_paused(&self, name: &str, paused: bool) -> bool {
        let Some(flag) = self.paused.get(name) else {
            tracing::warn!(trigger = name, "Unknown trigger");
            return false;
        };
        flag.store(paused, Ordering::SeqCst);
        tracing::info!(trigger = name, paused, "Trigger updated");
        true
    }
}

/// Owns the trigger tasks of a running scheduler.
pub struct SchedulerHandle {
    control: SchedulerControl,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Pause/resume access that outlives `&self`.
    #[must_use]
    pub fn control(&self) -> SchedulerControl {
        self.control.clone()
    }

    /// Cancel in-flight runs and wait for every trigger task to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Trigger task failed");
            }
        }
        tracing::info!("Scheduler stopped");
    }
}

async fn run_trigger(trigger: Trigger, paused: Arc<AtomicBool>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(trigger.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if paused.load(Ordering::SeqCst) {
            tracing::debug!(trigger = %trigger.name, "Trigger paused, skipping tick");
            continue;
        }

        let cancel = shutdown.child_token();
        let run = (trigger.run)(cancel.clone());
        tracing::debug!(trigger = %trigger.name, "Trigger fired");

        match trigger.timeout {
            Some(limit) => {
                tokio::pin!(run);
                tokio::select! {
                    () = &mut run => {}
                    () = tokio::time::sleep(limit) => {
                        tracing::warn!(
                            trigger = %trigger.name,
                            timeout_secs = limit.as_secs(),
                            "Run timed out, cancelling"
                        );
                        cancel.cancel();
                        run.await;
                    }
                }
            }
            None => run.await,
        }
    }

    tracing::debug!(trigger = %trigger.name, "Trigger stopped");
}
