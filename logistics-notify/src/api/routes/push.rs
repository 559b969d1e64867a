//! Realtime push WebSocket route.
//!
//! Streams every [`PushMessage`] from the shared [`PushHub`] to the client as
//! a JSON text frame. A client that joins a group receives that group's
//! messages in addition to broadcasts.

use axum::{
    Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::notification::channels::{PushHub, PushMessage};

/// Heartbeat interval; a client that misses one Pong is disconnected.
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
pub struct PushParams {
    /// Group to join, e.g. a user or depot id.
    pub group: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/push", get(push_ws))
}

async fn push_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<PushParams>,
) -> ApiResult<Response> {
    let hub = state
        .push_hub
        .clone()
        .ok_or_else(|| ApiError::service_unavailable("Push channel is not enabled"))?;
    let group = params.group.filter(|g| !g.trim().is_empty());
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub, group)))
}

/// Receive from an optional group subscription; pends forever without one.
async fn recv_group(
    rx: &mut Option<broadcast::Receiver<PushMessage>>,
) -> Result<PushMessage, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_socket(socket: WebSocket, hub: Arc<PushHub>, group: Option<String>) {
    let (mut sender, mut receiver) = socket.split();

    let mut all_rx = hub.subscribe();
    let mut group_rx = group.as_deref().map(|g| hub.subscribe_group(g));
    debug!(group = group.as_deref().unwrap_or("*"), "Push subscriber connected");

    let mut heartbeat_interval =
        tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    let mut awaiting_pong = false;

    loop {
        let outgoing = tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                        continue;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        awaiting_pong = false;
                        continue;
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    // The stream is one-way; client text is ignored.
                    _ => continue,
                }
            }
            event = all_rx.recv() => event,
            event = recv_group(&mut group_rx) => event,
            _ = heartbeat_interval.tick() => {
                if awaiting_pong {
                    debug!("Client failed to respond to Ping, closing connection");
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_ok() {
                    awaiting_pong = true;
                } else {
                    debug!("Failed to send Ping, closing connection");
                    break;
                }
                continue;
            }
        };

        match outgoing {
            Ok(message) => {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode push message");
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(text.into())).await {
                    debug!("Failed to send push message, client gone: {}", e);
                    break;
                }
            }
            Err(RecvError::Lagged(n)) => {
                warn!("Push subscriber lagged by {} messages", n);
            }
            Err(RecvError::Closed) => {
                debug!("Push hub closed");
                break;
            }
        }
    }

    drop(group_rx);
    if let Some(group) = group.as_deref() {
        hub.release_group(group);
    }
    debug!(group = group.as_deref().unwrap_or("*"), "Push subscriber disconnected");
}
