//! Scheduler inspection routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::TriggerResponse;
use crate::api::server::AppState;
use crate::scheduler::{JobStatus, Scheduler};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{name}/run", post(run_job))
}

fn scheduler(state: &AppState) -> ApiResult<&Arc<Scheduler>> {
    state
        .scheduler
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Scheduler is not running"))
}

async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<Vec<JobStatus>>> {
    Ok(Json(scheduler(&state)?.status()))
}

/// Run a job now. Answers 409 while its previous run is still in flight.
async fn run_job(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<TriggerResponse>> {
    let started = scheduler(&state)?.trigger(&name)?;
    if !started {
        return Err(ApiError::conflict(format!("Job '{name}' is already running")));
    }
    Ok(Json(TriggerResponse { job: name, started }))
}
