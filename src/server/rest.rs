//! REST API endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;

use crate::config::Config;
use crate::jobs::{JobRunStatistic, JobStateEntry, JobStateRegistry, StatisticsStore};
use crate::kind::{DocumentKind, JobKey};
use crate::scheduler::SchedulerControl;

/// Shared state for the REST handlers.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    pub registry: Arc<JobStateRegistry>,
    pub triggers: SchedulerControl,
}

impl ApiState {
    /// State with no scheduled triggers.
    #[must_use]
    pub fn new(config: Arc<Config>, registry: Arc<JobStateRegistry>) -> Self {
        Self {
            config,
            registry,
            triggers: SchedulerControl::default(),
        }
    }

    /// Expose pause/resume for the triggers of a running scheduler.
    #[must_use]
    pub fn with_triggers(mut self, triggers: SchedulerControl) -> Self {
        self.triggers = triggers;
        self
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub jobs: usize,
}

/// Status of one configured document kind.
#[derive(Debug, Serialize)]
pub struct JobStatus {
    pub kind: DocumentKind,
    pub active: bool,
    pub index: String,
    pub processing: Option<JobStateEntry>,
    pub cleanup: Option<JobStateEntry>,
    pub last_run: Option<JobRunStatistic>,
}

/// Paused flag of one scheduler trigger.
#[derive(Debug, Serialize)]
pub struct TriggerStatus {
    pub name: String,
    pub paused: bool,
}

/// Create REST API router.
pub fn create_rest_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/api/v1/jobs", get(jobs))
        .route("/api/v1/triggers", get(triggers))
        .route("/api/v1/triggers/{name}/pause", post(pause_trigger))
        .route("/api/v1/triggers/{name}/resume", post(resume_trigger))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        jobs: state.config.jobs.len(),
    };

    tracing::debug!(jobs = response.jobs, "Health check");

    (StatusCode::OK, Json(response))
}

/// Prometheus metrics endpoint.
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            tracing::trace!("Metrics encoded successfully");
            (
                StatusCode::OK,
                [(
                    axum::http::header::CONTENT_TYPE,
                    "text/plain; charset=utf-8",
                )],
                buffer,
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(
                    axum::http::header::CONTENT_TYPE,
                    "text/plain; charset=utf-8",
                )],
                b"Failed to encode metrics".to_vec(),
            )
        }
    }
}

/// Job states and the latest statistics of every configured kind.
async fn jobs(State(state): State<ApiState>) -> impl IntoResponse {
    let statuses = collect_statuses(&state.config, &state.registry);
    tracing::debug!(jobs = statuses.len(), "Job status retrieved");
    Json(statuses)
}

async fn triggers(State(state): State<ApiState>) -> impl IntoResponse {
    let triggers: Vec<TriggerStatus> = state
        .triggers
        .states()
        .map(|(name, paused)| TriggerStatus {
            name: name.to_string(),
            paused,
        })
        .collect();
    Json(triggers)
}

async fn pause_trigger(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<TriggerStatus>, StatusCode> {
    set_paused(&state.triggers, name, true)
}

async fn resume_trigger(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<TriggerStatus>, StatusCode> {
    set_paused(&state.triggers, name, false)
}

fn set_paused(
    control: &SchedulerControl,
    name: String,
    paused: bool,
) -> Result<Json<TriggerStatus>, StatusCode> {
    let found = if paused {
        control.pause(&name)
    } else {
        control.resume(&name)
    };
    if !found {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(TriggerStatus { name, paused }))
}

/// Build the status list. Unreadable statistics files are logged and reported as
/// no previous run.
#[must_use]
pub fn collect_statuses(config: &Config, registry: &JobStateRegistry) -> Vec<JobStatus> {
    config
        .jobs
        .iter()
        .map(|(&kind, settings)| {
            let last_run = StatisticsStore::new(&settings.statistics_directory)
                .load(kind)
                .unwrap_or_else(|e| {
                    tracing::warn!(%kind, error = %e, "Failed to load run statistics");
                    None
                });
            JobStatus {
                kind,
                active: settings.active,
                index: config.index_name(settings),
                processing: registry.get(JobKey::processing(kind)),
                cleanup: registry.get(JobKey::cleanup(kind)),
                last_run,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobSettings;
    use crate::jobs::{JobState, RunStatistics};
    use crate::scheduler::{Scheduler, Trigger};
    use axum::body::Body;
    use axum::http::{Method, Request};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn create_test_state(stats_dir: &std::path::Path) -> ApiState {
        let mut config = Config::default();
        let mut settings = JobSettings::for_kind(DocumentKind::Word, "/share/word");
        settings.statistics_directory = stats_dir.to_path_buf();
        config.jobs.insert(DocumentKind::Word, settings);
        ApiState::new(Arc::new(config), Arc::new(JobStateRegistry::new()))
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        send(app, Method::GET, uri).await
    }

    async fn send(app: Router, method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_health_check() {
        let tmp = TempDir::new().unwrap();
        let app = create_rest_router(create_test_state(tmp.path()));

        let (status, body) = get_body(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["jobs"], 1);
    }

    #[tokio::test]
    async fn test_metrics() {
        crate::observability::init_metrics();
        let tmp = TempDir::new().unwrap();
        let app = create_rest_router(create_test_state(tmp.path()));

        let (status, _) = get_body(app, "/metrics").await;

        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_jobs_reports_state_and_last_run() {
        let tmp = TempDir::new().unwrap();
        let state = create_test_state(tmp.path());
        state
            .registry
            .set(JobKey::processing(DocumentKind::Word), JobState::Running);
        let stat = RunStatistics::new(DocumentKind::Word).finish();
        StatisticsStore::new(tmp.path()).persist(DocumentKind::Word, &stat);

        let (status, body) = get_body(create_rest_router(state), "/api/v1/jobs").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let word = &json[0];
        assert_eq!(word["kind"], "word");
        assert_eq!(word["index"], "docindex-word");
        assert_eq!(word["processing"]["state"], "Running");
        assert!(word["cleanup"].is_null());
        assert_eq!(word["last_run"]["Id"], stat.id);
    }

    #[tokio::test]
    async fn test_jobs_without_history() {
        let tmp = TempDir::new().unwrap();
        let app = create_rest_router(create_test_state(tmp.path()));

        let (_, body) = get_body(app, "/api/v1/jobs").await;

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json[0]["last_run"].is_null());
    }

    #[tokio::test]
    async fn test_pause_and_resume_trigger() {
        let tmp = TempDir::new().unwrap();
        let mut scheduler = Scheduler::new(CancellationToken::new());
        scheduler.add(Trigger::new("word-processing", Duration::from_secs(3600), |_| async {}));
        let handle = scheduler.spawn();
        let control = handle.control();
        let app = create_rest_router(create_test_state(tmp.path()).with_triggers(handle.control()));

        let (status, body) = send(
            app.clone(),
            Method::POST,
            "/api/v1/triggers/word-processing/pause",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["paused"], true);
        assert_eq!(control.is_paused("word-processing"), Some(true));

        let (_, body) = get_body(app.clone(), "/api/v1/triggers").await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json[0]["name"], "word-processing");
        assert_eq!(json[0]["paused"], true);

        let (status, _) = send(
            app.clone(),
            Method::POST,
            "/api/v1/triggers/word-processing/resume",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(control.is_paused("word-processing"), Some(false));

        let (status, _) = send(app, Method::POST, "/api/v1/triggers/missing/pause").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_triggers_empty_without_scheduler() {
        let tmp = TempDir::new().unwrap();
        let app = create_rest_router(create_test_state(tmp.path()));

        let (status, body) = get_body(app, "/api/v1/triggers").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"[]");
    }
}
