//! Notification dispatcher.
//!
//! Resolves the channel set for an event's priority, renders the
//! channel-specific body from the shared templates and sends through every
//! applicable adapter concurrently. Each channel runs in its own task, and
//! every destination send inside it is bounded by the send timeout; a
//! failure, timeout or panic in one channel is recorded against that channel
//! only. The aggregate outcome is appended to the
//! [`HistoryLog`] before it is returned.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::channels::{ChannelAdapter, ChannelKind, ChannelRegistry, OutboundMessage};
use super::events::NotificationEvent;
use super::history::{HistoryEntry, HistoryLog};
use super::policy::ChannelPolicy;
use super::template::{self, MessageTemplate, TemplateRegistry};
use crate::Result;

const DEFAULT_SEND_TIMEOUT_MS: u64 = 15_000;

/// Destinations of one channel sent to at the same time.
const MAX_CONCURRENT_DESTINATIONS: usize = 8;

/// Per-channel outcome of one dispatch.
///
/// A channel in neither set was not applicable (not in the policy, no
/// template body, no recipients, or skipped as uninitialized).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    #[serde(rename = "succeededChannels")]
    pub succeeded: BTreeSet<ChannelKind>,
    #[serde(rename = "failedChannels")]
    pub failed: BTreeSet<ChannelKind>,
    pub timestamp: DateTime<Utc>,
}

impl DispatchResult {
    pub fn new() -> Self {
        Self {
            succeeded: BTreeSet::new(),
            failed: BTreeSet::new(),
            timestamp: Utc::now(),
        }
    }

    /// At least one channel accepted the notification.
    pub fn delivered(&self) -> bool {
        !self.succeeded.is_empty()
    }

    fn record(&mut self, channel: ChannelKind, ok: bool) {
        if ok {
            self.failed.remove(&channel);
            self.succeeded.insert(channel);
        } else if !self.succeeded.contains(&channel) {
            self.failed.insert(channel);
        }
    }
}

impl Default for DispatchResult {
    fn default() -> Self {
        Self::new()
    }
}

/// What to record for a channel whose adapter is not initialized.
///
/// The adapter's `send` is never invoked in either case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UninitializedPolicy {
    /// Leave the channel out of both result sets.
    #[default]
    Skip,
    /// Record the channel as failed.
    RecordFailure,
}

/// Dispatcher tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Upper bound for one destination send, in milliseconds.
    pub send_timeout_ms: u64,
    pub uninitialized_policy: UninitializedPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            uninitialized_policy: UninitializedPolicy::default(),
        }
    }
}

impl DispatcherConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms.max(1))
    }
}

/// A channel that passed every applicability check and is ready to send.
struct ChannelJob {
    channel: ChannelKind,
    adapter: Arc<dyn ChannelAdapter>,
    message: OutboundMessage,
    destinations: Vec<Option<String>>,
}

/// Multi-channel notification orchestrator.
pub struct NotificationDispatcher {
    policy: ChannelPolicy,
    templates: TemplateRegistry,
    registry: ChannelRegistry,
    history: Arc<HistoryLog>,
    config: DispatcherConfig,
}

impl NotificationDispatcher {
    /// Build a dispatcher; fails if the policy references unregistered channels.
    pub fn new(
        policy: ChannelPolicy,
        templates: TemplateRegistry,
        registry: ChannelRegistry,
        history: Arc<HistoryLog>,
        config: DispatcherConfig,
    ) -> Result<Self> {
        policy.validate(&registry)?;
        info!(
            channels = ?registry,
            templates = templates.len(),
            send_timeout_ms = config.send_timeout_ms,
            uninitialized_policy = ?config.uninitialized_policy,
            "Notification dispatcher ready"
        );
        Ok(Self {
            policy,
            templates,
            registry,
            history,
            config,
        })
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn history(&self) -> &Arc<HistoryLog> {
        &self.history
    }

    pub fn policy(&self) -> &ChannelPolicy {
        &self.policy
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Deliver `event` and return `true` if any channel accepted it.
    pub async fn notify(&self, event: NotificationEvent) -> bool {
        self.dispatch(&event).await.delivered()
    }

    /// Deliver `event` on every applicable channel and record the outcome.
    pub async fn dispatch(&self, event: &NotificationEvent) -> DispatchResult {
        let mut result = DispatchResult::new();

        let Some(template) = self.templates.get(&event.template_name) else {
            warn!(template = %event.template_name, "No message template, nothing to send");
            self.history.append(HistoryEntry::new(event, result.clone()));
            return result;
        };

        let timeout = self.config.send_timeout();
        let mut tasks = Vec::new();
        for &channel in self.policy.resolve(event.priority) {
            let Some(job) = self.prepare(channel, template, event, &mut result) else {
                continue;
            };
            let handle = tokio::spawn(job.run(timeout));
            tasks.push(async move { (channel, handle.await) });
        }

        for (channel, joined) in join_all(tasks).await {
            match joined {
                Ok(ok) => result.record(channel, ok),
                Err(e) => {
                    warn!(
                        channel = %channel,
                        template = %event.template_name,
                        error = %e,
                        "Channel send task aborted"
                    );
                    result.record(channel, false);
                }
            }
        }
        result.timestamp = Utc::now();

        info!(
            template = %event.template_name,
            priority = %event.priority,
            succeeded = ?result.succeeded,
            failed = ?result.failed,
            "Notification dispatched"
        );
        self.history.append(HistoryEntry::new(event, result.clone()));
        result
    }

    /// Decide whether `channel` applies to `event` and build its message.
    fn prepare(
        &self,
        channel: ChannelKind,
        template: &MessageTemplate,
        event: &NotificationEvent,
        result: &mut DispatchResult,
    ) -> Option<ChannelJob> {
        let Some(body) = template.body_for(channel) else {
            debug!(channel = %channel, template = %template.name, "No body for channel, skipping");
            return None;
        };

        let Some(adapter) = self.registry.get(channel) else {
            warn!(channel = %channel, "No adapter registered for channel, skipping");
            return None;
        };

        let health = adapter.health();
        if !health.initialized {
            match self.config.uninitialized_policy {
                UninitializedPolicy::Skip => {
                    debug!(
                        channel = %channel,
                        reason = health.reason.as_deref().unwrap_or("unknown"),
                        "Channel not initialized, skipping"
                    );
                }
                UninitializedPolicy::RecordFailure => {
                    warn!(
                        channel = %channel,
                        reason = health.reason.as_deref().unwrap_or("unknown"),
                        "Channel not initialized, recording failure"
                    );
                    result.record(channel, false);
                }
            }
            return None;
        }

        let destinations: Vec<Option<String>> = if channel == ChannelKind::Email {
            let emails: Vec<Option<String>> = event
                .recipients
                .iter()
                .map(|r| r.email.trim())
                .filter(|email| !email.is_empty())
                .map(|email| Some(email.to_string()))
                .collect();
            if emails.is_empty() {
                debug!(template = %template.name, "No email recipients, skipping email");
                return None;
            }
            emails
        } else {
            vec![None]
        };

        let rendered = match channel {
            ChannelKind::Push => template::render(body, &event.data),
            ChannelKind::Chat | ChannelKind::Email => template::render_html(body, &event.data),
        };
        let message = OutboundMessage {
            event_name: template.name.clone(),
            subject: template
                .subject
                .as_deref()
                .map(|s| template::render(s, &event.data)),
            body: rendered,
            priority: event.priority,
            group: event.group.clone(),
        };

        Some(ChannelJob {
            channel,
            adapter,
            message,
            destinations,
        })
    }
}

impl ChannelJob {
    /// Send to every destination, each under its own timeout. The channel
    /// succeeds only if all were accepted.
    async fn run(self, timeout: Duration) -> bool {
        let channel = self.channel;
        let adapter = &self.adapter;
        let message = &self.message;

        let outcomes: Vec<bool> = stream::iter(&self.destinations)
            .map(|destination| async move {
                let destination = destination.as_deref();
                match tokio::time::timeout(timeout, adapter.send(destination, message)).await {
                    Ok(true) => true,
                    Ok(false) => {
                        debug!(
                            channel = %channel,
                            destination = destination.unwrap_or("-"),
                            "Destination rejected notification"
                        );
                        false
                    }
                    Err(_) => {
                        warn!(
                            channel = %channel,
                            destination = destination.unwrap_or("-"),
                            template = %message.event_name,
                            timeout_ms = timeout.as_millis() as u64,
                            "Channel send timed out"
                        );
                        false
                    }
                }
            })
            .buffer_unordered(MAX_CONCURRENT_DESTINATIONS)
            .boxed()
            .collect()
            .await;

        outcomes.into_iter().all(|ok| ok)
    }
}
