//! API route modules.
//!
//! Organizes routes by resource type.

pub mod chat;
pub mod health;
pub mod logging;
pub mod notifications;
pub mod push;
pub mod scheduler;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/notifications", notifications::router())
        .nest("/api/scheduler", scheduler::router())
        .nest("/api/chat", chat::router())
        .nest("/api/logging", logging::router())
        .nest("/api/health", health::router())
        .nest("/ws", push::router())
        .with_state(state)
}
