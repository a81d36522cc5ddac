//! Management API Handlers

use super::types::*;
use crate::command::{CommandDispatcher, DispatchOutcome};
use crate::connection::ConnectionSupervisor;
use crate::error::ControlError;
use crate::metrics::Metrics;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{info, warn};

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub supervisor: ConnectionSupervisor,
    pub dispatcher: Arc<CommandDispatcher>,
    pub metrics: Arc<Metrics>,
    pub start_time: SystemTime,
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<T>>)>;

fn reject<T>(error: ControlError) -> (StatusCode, Json<ApiResponse<T>>) {
    let status = match &error {
        ControlError::Config(_) => StatusCode::BAD_REQUEST,
        ControlError::NotAllowed(_) => StatusCode::CONFLICT,
        _ => StatusCode::BAD_GATEWAY,
    };
    warn!("Control request rejected: {}", error);
    (status, Json(ApiResponse::error(error.to_string())))
}

/// Health check handler
pub async fn health_check() -> Json<ApiResponse<HealthStatus>> {
    Json(ApiResponse::success(HealthStatus {
        status: "healthy".to_string(),
        timestamp: SystemTime::now(),
    }))
}

/// Readiness of every backend plus toggle state
pub async fn get_status(State(state): State<AppState>) -> Json<ApiResponse<ControlStatus>> {
    let uptime = SystemTime::now()
        .duration_since(state.start_time)
        .unwrap_or_default()
        .as_secs();

    let status = ControlStatus {
        uptime_seconds: uptime,
        version: env!("CARGO_PKG_VERSION").to_string(),
        all_ready: state.supervisor.is_all_ready(),
        is_running: state.dispatcher.is_running().await,
        polling: state.supervisor.is_polling(),
        reconcile_ticks: state.supervisor.tick_count(),
        backends: state.supervisor.backend_statuses().await,
    };

    Json(ApiResponse::success(status))
}

/// Apply host changes to named backends
pub async fn update_hosts(
    State(state): State<AppState>,
    Json(request): Json<UpdateHostsRequest>,
) -> ApiResult<UpdateHostsResult> {
    match state.supervisor.apply_hosts(&request.hosts).await {
        Ok(changed) => {
            info!(changed, "Backend hosts updated via management API");
            Ok(Json(ApiResponse::success(UpdateHostsResult { changed })))
        }
        Err(e) => Err(reject(e)),
    }
}

pub async fn control_start(State(state): State<AppState>) -> ApiResult<DispatchOutcome> {
    outcome_response(state.dispatcher.toggle_start().await)
}

pub async fn control_end(State(state): State<AppState>) -> ApiResult<DispatchOutcome> {
    outcome_response(state.dispatcher.toggle_end().await)
}

pub async fn control_toggle(State(state): State<AppState>) -> ApiResult<DispatchOutcome> {
    outcome_response(state.dispatcher.toggle().await)
}

pub async fn control_event(
    State(state): State<AppState>,
    Json(request): Json<EventRequest>,
) -> ApiResult<DispatchOutcome> {
    outcome_response(state.dispatcher.send_event(&request.payload).await)
}

/// Prometheus text exposition
pub async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
}

// A dispatch that reached the backends is a 200 even when some failed;
// the outcome carries the failed names.
fn outcome_response(result: Result<DispatchOutcome, ControlError>) -> ApiResult<DispatchOutcome> {
    result
        .map(|outcome| Json(ApiResponse::success(outcome)))
        .map_err(reject)
}
