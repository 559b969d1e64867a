//! Notification dispatch and history routes.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{HistoryQuery, HistoryResponse, TemplateSummary};
use crate::api::server::AppState;
use crate::notification::{
    ChannelHealthReport, DispatchResult, NotificationEvent, notification_event_types,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dispatch", post(dispatch))
        .route("/history", get(history))
        .route("/channels", get(channels))
        .route("/templates", get(templates))
}

/// Dispatch one event on the channels its priority selects.
///
/// Channel failures are part of the result, not an HTTP error: the response
/// is 200 even when nothing was delivered.
async fn dispatch(
    State(state): State<AppState>,
    Json(event): Json<NotificationEvent>,
) -> ApiResult<Json<DispatchResult>> {
    if event.template_name.trim().is_empty() {
        return Err(ApiError::validation("templateName must not be empty"));
    }
    let result = state.dispatcher.dispatch(&event).await;
    Ok(Json(result))
}

async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let history = state.history();
    Json(HistoryResponse {
        entries: history.recent(query.effective_limit()),
        summary: history.summary(),
    })
}

async fn channels(State(state): State<AppState>) -> Json<Vec<ChannelHealthReport>> {
    Json(state.registry().health_report())
}

/// Known templates, with catalogue metadata where the name is a known event type.
async fn templates(State(state): State<AppState>) -> Json<Vec<TemplateSummary>> {
    let catalogue = notification_event_types();
    Json(
        state
            .dispatcher
            .templates()
            .names()
            .into_iter()
            .map(|name| {
                let info = catalogue.iter().find(|i| i.template_name == name);
                TemplateSummary::new(name, info)
            })
            .collect(),
    )
}
