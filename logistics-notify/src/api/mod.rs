//! REST API server module.
//!
//! Provides HTTP endpoints for dispatching notifications, reading the
//! dispatch history and channel health, inspecting scheduled jobs, receiving
//! chat bot updates, and the realtime push WebSocket.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
