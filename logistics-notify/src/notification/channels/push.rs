//! Realtime push channel.
//!
//! [`PushHub`] fans messages out to every connected subscriber over
//! `tokio::sync::broadcast`, with lazily created per-group channels for
//! targeted delivery. Browsers attach through the `/ws/push` WebSocket route.
//! There is no per-recipient addressing and no delivery confirmation: a send
//! succeeds once the broadcast is issued.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use super::{ChannelAdapter, ChannelHealth, ChannelKind, OutboundMessage};
use crate::{Error, Result};

/// Default per-channel buffer for slow subscribers.
const DEFAULT_PUSH_CAPACITY: usize = 256;

/// Push channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Broadcast buffer size per channel.
    pub capacity: usize,
    /// Event name emitted to subscribers.
    pub event_name: String,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_PUSH_CAPACITY,
            event_name: "notification".to_string(),
        }
    }
}

/// A message delivered to push subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    /// Event name subscribers listen for.
    pub event: String,
    /// Target group, `None` for a broadcast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// Transport that broadcasts to connected subscribers.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Emit to every current subscriber.
    async fn broadcast(&self, event_name: &str, payload: Value) -> Result<()>;

    /// Emit to the subscribers of one group.
    async fn send_to_group(&self, group: &str, event_name: &str, payload: Value) -> Result<()>;
}

/// In-process realtime fan-out hub.
pub struct PushHub {
    capacity: usize,
    all: broadcast::Sender<PushMessage>,
    groups: RwLock<HashMap<String, broadcast::Sender<PushMessage>>>,
}

impl PushHub {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (all, _) = broadcast::channel(capacity);
        Self {
            capacity,
            all,
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to broadcasts.
    pub fn subscribe(&self) -> broadcast::Receiver<PushMessage> {
        self.all.subscribe()
    }

    /// Subscribe to one group, creating it on first use.
    ///
    /// Creating a group also drops any group left without subscribers.
    pub fn subscribe_group(&self, group: &str) -> broadcast::Receiver<PushMessage> {
        if let Some(sender) = self.groups.read().get(group) {
            return sender.subscribe();
        }
        let mut groups = self.groups.write();
        if !groups.contains_key(group) {
            Self::retain_live(&mut groups);
        }
        groups
            .entry(group.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drop a group once its last subscriber is gone.
    ///
    /// Call after the group's receiver has been dropped.
    pub fn release_group(&self, group: &str) {
        let mut groups = self.groups.write();
        if groups
            .get(group)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            groups.remove(group);
            trace!(group = %group, "Released empty push group");
        }
    }

    /// Number of groups currently tracked.
    pub fn group_count(&self) -> usize {
        self.groups.read().len()
    }

    /// Number of broadcast subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.all.receiver_count()
    }

    /// Number of subscribers in a group.
    pub fn group_subscriber_count(&self, group: &str) -> usize {
        self.groups
            .read()
            .get(group)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    /// Drop groups nobody listens to anymore.
    fn prune_groups(&self) {
        Self::retain_live(&mut self.groups.write());
    }

    fn retain_live(groups: &mut HashMap<String, broadcast::Sender<PushMessage>>) {
        let before = groups.len();
        groups.retain(|_, sender| sender.receiver_count() > 0);
        if groups.len() != before {
            trace!(removed = before - groups.len(), "Pruned empty push groups");
        }
    }
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new(DEFAULT_PUSH_CAPACITY)
    }
}

#[async_trait]
impl PushTransport for PushHub {
    async fn broadcast(&self, event_name: &str, payload: Value) -> Result<()> {
        let message = PushMessage {
            event: event_name.to_string(),
            group: None,
            payload,
            timestamp: Utc::now(),
        };
        // A send error only means nobody is connected right now.
        match self.all.send(message) {
            Ok(receivers) => debug!(receivers, event = %event_name, "Push broadcast issued"),
            Err(_) => debug!(event = %event_name, "Push broadcast issued with no subscribers"),
        }
        Ok(())
    }

    async fn send_to_group(&self, group: &str, event_name: &str, payload: Value) -> Result<()> {
        if group.trim().is_empty() {
            return Err(Error::validation("push group must not be empty"));
        }
        let sender = self.groups.read().get(group).cloned();
        match sender {
            Some(sender) => {
                let message = PushMessage {
                    event: event_name.to_string(),
                    group: Some(group.to_string()),
                    payload,
                    timestamp: Utc::now(),
                };
                if sender.send(message).is_err() {
                    self.prune_groups();
                }
            }
            None => debug!(group = %group, "Push group has no subscribers"),
        }
        Ok(())
    }
}

/// Push channel adapter.
pub struct PushAdapter {
    config: PushConfig,
    transport: Option<Arc<dyn PushTransport>>,
    health: ChannelHealth,
}

impl PushAdapter {
    /// Attach the adapter to a push transport (normally the shared hub).
    pub fn initialize(config: PushConfig, transport: Arc<dyn PushTransport>) -> Self {
        if !config.enabled {
            warn!("Push channel disabled");
            return Self {
                config,
                transport: None,
                health: ChannelHealth::unavailable("push channel disabled"),
            };
        }
        info!(event = %config.event_name, "Push channel initialized");
        Self {
            config,
            transport: Some(transport),
            health: ChannelHealth::ready(),
        }
    }

    fn build_payload(&self, message: &OutboundMessage) -> Value {
        json!({
            "type": message.event_name,
            "title": message.subject,
            "message": message.body,
            "priority": message.priority,
            "timestamp": Utc::now().to_rfc3339(),
        })
    }
}

#[async_trait]
impl ChannelAdapter for PushAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Push
    }

    fn health(&self) -> ChannelHealth {
        self.health.clone()
    }

    async fn send(&self, _destination: Option<&str>, message: &OutboundMessage) -> bool {
        let Some(transport) = self.transport.as_ref() else {
            debug!(event = %message.event_name, "Push channel not initialized, skipping send");
            return false;
        };

        let payload = self.build_payload(message);
        let result = match message.group.as_deref() {
            Some(group) => {
                transport
                    .send_to_group(group, &self.config.event_name, payload)
                    .await
            }
            None => transport.broadcast(&self.config.event_name, payload).await,
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    channel = "push",
                    destination = message.group.as_deref().unwrap_or("*"),
                    event = %message.event_name,
                    error = %e,
                    "Push notification failed"
                );
                false
            }
        }
    }
}
