//! Health check routes.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};

use crate::api::models::{ComponentHealth, HealthResponse};
use crate::api::server::AppState;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness_check))
}

/// Health check endpoint.
///
/// `degraded` when at least one channel is not initialized; the service
/// still dispatches on the others.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = state.start_time.elapsed().as_secs();

    let mut components: Vec<ComponentHealth> = state
        .registry()
        .health_report()
        .into_iter()
        .map(|report| ComponentHealth {
            name: report.channel.to_string(),
            status: if report.health.initialized {
                "healthy".to_string()
            } else {
                "unavailable".to_string()
            },
            message: report.health.reason,
        })
        .collect();

    if let Some(scheduler) = &state.scheduler {
        let jobs = scheduler.status();
        let running = jobs.iter().filter(|j| j.is_running()).count();
        components.push(ComponentHealth {
            name: "scheduler".to_string(),
            status: "healthy".to_string(),
            message: Some(format!("{running}/{} jobs scheduled", jobs.len())),
        });
    }

    let status = if components.iter().all(|c| c.status == "healthy") {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime,
        components,
    })
}

/// Liveness check - is the service alive?
async fn liveness_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "alive",
            "uptime_secs": uptime
        })),
    )
}
