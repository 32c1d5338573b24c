//! HTTP request handlers.

use crate::db::DbError;
use crate::report::{Assets, REPORT_FILE};
use crate::scheduler::{SchedulerError, SchedulerStatus};
use crate::state::AppState;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Redirect},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub async fn handle_root() -> impl IntoResponse {
    Redirect::temporary(&format!("/reports/{}", REPORT_FILE))
}

// ============================================================================
// API: Endpoints
// ============================================================================

pub async fn handle_list_endpoints(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.list())
}

#[derive(Debug, Deserialize)]
pub struct AddEndpointRequest {
    pub endpoint: String,
}

#[derive(Debug, Serialize)]
pub struct AddEndpointResponse {
    pub endpoint: String,
    pub created: bool,
}

pub async fn handle_add_endpoint(
    State(state): State<AppState>,
    Json(req): Json<AddEndpointRequest>,
) -> impl IntoResponse {
    match state.registry.add(&req.endpoint) {
        Ok(created) => {
            let status = if created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            let body = AddEndpointResponse {
                endpoint: req.endpoint.trim().to_string(),
                created,
            };
            (status, Json(body)).into_response()
        }
        Err(e @ DbError::EmptyEndpoint) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_remove_endpoint(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
) -> impl IntoResponse {
    match state.registry.remove(&endpoint) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, "Endpoint not found").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_get_checks(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
) -> impl IntoResponse {
    match state.registry.history(&endpoint) {
        Some(checks) => Json(checks).into_response(),
        None => (StatusCode::NOT_FOUND, "Endpoint not found").into_response(),
    }
}

// ============================================================================
// API: Event log
// ============================================================================

pub async fn handle_get_log(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.log.load_all())
}

// ============================================================================
// API: Monitoring
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MonitoringStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u64>,
}

impl From<SchedulerStatus> for MonitoringStatus {
    fn from(status: SchedulerStatus) -> Self {
        match status {
            SchedulerStatus::Stopped => Self {
                running: false,
                interval_seconds: None,
            },
            SchedulerStatus::Running { interval } => Self {
                running: true,
                interval_seconds: Some(interval.as_secs()),
            },
        }
    }
}

pub async fn handle_monitoring_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(MonitoringStatus::from(state.scheduler.status().await))
}

#[derive(Debug, Deserialize)]
pub struct StartMonitoringRequest {
    pub interval_seconds: u64,
}

pub async fn handle_start_monitoring(
    State(state): State<AppState>,
    Json(req): Json<StartMonitoringRequest>,
) -> impl IntoResponse {
    let interval = Duration::from_secs(req.interval_seconds);

    match state.scheduler.start(interval).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(MonitoringStatus::from(state.scheduler.status().await)),
        )
            .into_response(),
        Err(e @ SchedulerError::AlreadyRunning(_)) => {
            (StatusCode::CONFLICT, e.to_string()).into_response()
        }
        Err(e @ SchedulerError::InvalidInterval) => {
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

pub async fn handle_stop_monitoring(State(state): State<AppState>) -> impl IntoResponse {
    let was_running = state.scheduler.stop().await;
    if !was_running {
        tracing::debug!("Stop requested while monitoring was not running");
    }
    Json(MonitoringStatus::from(state.scheduler.status().await))
}

// ============================================================================
// Static Assets
// ============================================================================

pub async fn handle_asset(Path(path): Path<String>) -> impl IntoResponse {
    match Assets::get(&path) {
        Some(file) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref().to_string())],
                file.data.into_owned(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}
