use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use objgate::HealthStatus;
use serde_json::json;
use std::sync::Arc;
use std::time::SystemTime;

/// Global server start time for uptime calculation
static SERVER_START_TIME: once_cell::sync::Lazy<SystemTime> =
    once_cell::sync::Lazy::new(SystemTime::now);

fn uptime_seconds() -> u64 {
    SERVER_START_TIME
        .elapsed()
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Liveness: 200 while the process is serving requests
pub async fn liveness() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "objgate",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
    }))
}

/// Readiness: round-trips a probe document through the store.
/// Degraded stores still report 200; unhealthy ones report 503.
pub async fn readiness(State(state): State<Arc<ServerState>>) -> ServerResult<impl IntoResponse> {
    let report = state
        .run(|svc| Ok::<_, ServerError>(svc.probe_health()))
        .await?;
    let code = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    Ok((
        code,
        Json(json!({
            "status": report.status,
            "service": "objgate",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "uptime_seconds": uptime_seconds(),
            "components": {
                "store": report,
            }
        })),
    ))
}

/// Prometheus metrics endpoint
pub async fn metrics(State(state): State<Arc<ServerState>>) -> ServerResult<impl IntoResponse> {
    let handle = state
        .metrics_handle
        .as_ref()
        .filter(|_| state.config.metrics_enabled)
        .ok_or(ServerError::NotFound)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    ))
}
