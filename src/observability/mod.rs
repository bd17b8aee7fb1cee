//! Structured logging and metrics.
//!
//! Provides setup for observability using the `tracing` crate with:
//! - Structured logging with JSON output option
//! - Configurable log levels, overridable through `RUST_LOG`
//! - Job spans carrying document kind and role

pub mod metrics;

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

pub use metrics::init_metrics;

/// Initialize tracing.
///
/// # Panics
///
/// Panics if a tracing subscriber has already been initialized in this process.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(true);

        Registry::default().with(env_filter).with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer().with_target(true).with_thread_names(true);

        Registry::default().with(env_filter).with(fmt_layer).init();
    }

    tracing::debug!("Tracing initialized: level={}, json={}", level, json);
}

/// Span helpers shared by the job runners.
pub mod spans {
    use tracing::{info_span, Span};

    use crate::kind::JobKey;

    /// Span wrapping one job run.
    #[must_use]
    pub fn job_span(key: JobKey, index: &str, run_id: &str) -> Span {
        info_span!(
            "job",
            kind = %key.kind,
            role = %key.role,
            index = %index,
            run_id = %run_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{DocumentKind, JobKey};

    #[test]
    fn test_job_span() {
        let span = spans::job_span(JobKey::processing(DocumentKind::Word), "docs-word", "r-1");
        let _guard = span.enter();
    }
}
