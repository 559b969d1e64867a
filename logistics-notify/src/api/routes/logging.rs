//! Logging API routes.
//!
//! Provides endpoints to view and modify the active log filter.

use axum::{Json, Router, extract::State, routing::get};
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::LogFilterBody;
use crate::api::server::AppState;
use crate::logging::LoggingConfig;

pub fn router() -> Router<AppState> {
    Router::new().route("/filter", get(get_filter).put(set_filter))
}

fn logging_config(state: &AppState) -> ApiResult<&Arc<LoggingConfig>> {
    state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Logging configuration not available"))
}

async fn get_filter(State(state): State<AppState>) -> ApiResult<Json<LogFilterBody>> {
    let filter = logging_config(&state)?.get_filter();
    Ok(Json(LogFilterBody { filter }))
}

/// Replace the filter directive, e.g. `logistics_notify=debug`.
async fn set_filter(
    State(state): State<AppState>,
    Json(body): Json<LogFilterBody>,
) -> ApiResult<Json<LogFilterBody>> {
    let config = logging_config(&state)?;
    config.set_filter(&body.filter)?;
    Ok(Json(LogFilterBody {
        filter: config.get_filter(),
    }))
}
