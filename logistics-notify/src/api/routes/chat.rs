//! Chat bot webhook.

use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use serde_json::{Value, json};
use tracing::warn;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::notification::channels::chat::commands::ChatUpdate;

/// Header the Bot API sends with the secret registered via `setWebhook`.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(webhook))
}

/// Receive one bot update and answer its command.
///
/// Non-command updates are acknowledged and ignored so the Bot API does not
/// redeliver them.
async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<ChatUpdate>,
) -> ApiResult<Json<Value>> {
    let router = state
        .command_router
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Chat commands are not enabled"))?;

    if let Some(expected) = &state.chat_webhook_secret {
        let presented = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            warn!(update_id = update.update_id, "Rejected chat webhook with bad secret");
            return Err(ApiError::new(
                axum::http::StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Invalid webhook secret",
            ));
        }
    }

    let reply = router.handle_update(&update).await;
    Ok(Json(json!({ "handled": reply.is_some() })))
}
