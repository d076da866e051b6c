use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::{db, server::AppState};

/// Health check endpoint
/// Returns 200 OK if the process is running
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({
        "status": "healthy",
        "service": "funnel-analyzer",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

/// Readiness check endpoint
/// Returns 200 OK only while the database answers
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match db::ping(&state.pool).await {
        Ok(()) => (StatusCode::OK, Json(json!({
            "status": "ready",
            "service": "funnel-analyzer",
        }))),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed: database unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({
                "status": "not_ready",
                "service": "funnel-analyzer",
                "reason": "database unavailable",
            })))
        }
    }
}

/// Prometheus text exposition; 404 when disabled in configuration
pub async fn metrics(State(state): State<AppState>) -> Response {
    if !state.config.load().metrics.enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    (StatusCode::OK, state.metrics.render()).into_response()
}
