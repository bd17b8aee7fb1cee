//! HTTP server for health, metrics, job status and trigger control.
//!
//! This module provides:
//! - `/health` liveness endpoint
//! - `/metrics` Prometheus text exposition
//! - `/api/v1/jobs` job states and latest run statistics
//! - `/api/v1/triggers` scheduler triggers, paused and resumed with
//!   `POST /api/v1/triggers/{name}/pause` and `.../resume`

mod app;
mod rest;

pub use app::{shutdown_signal, App, ServerConfig};
pub use rest::{
    collect_statuses, create_rest_router, ApiState, HealthResponse, JobStatus, TriggerStatus,
};
