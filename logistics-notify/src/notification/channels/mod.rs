//! Notification channels.
//!
//! This module provides the adapters that deliver rendered notifications:
//! - Chat (Telegram Bot API), with an inbound command router
//! - Email (Resend primary, SendGrid fallback)
//! - Realtime push (in-process hub exposed over WebSocket)

pub mod chat;
pub mod email;
pub mod push;

pub use chat::{ChatAdapter, ChatConfig, ChatTransport, TelegramTransport};
pub use email::{
    EmailAdapter, EmailConfig, EmailProviderConfig, EmailTransport, ResendTransport,
    SendGridTransport,
};
pub use push::{PushAdapter, PushConfig, PushHub, PushMessage, PushTransport};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::events::Priority;
use crate::Error;

/// The closed set of delivery channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Chat,
    Email,
    Push,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [ChannelKind::Chat, ChannelKind::Email, ChannelKind::Push];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Email => "email",
            Self::Push => "push",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chat" | "telegram" => Ok(Self::Chat),
            "email" => Ok(Self::Email),
            "push" | "socket" | "realtime" => Ok(Self::Push),
            other => Err(Error::validation(format!("Unknown channel: {other}"))),
        }
    }
}

/// Whether an adapter managed to stand up its transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHealth {
    pub initialized: bool,
    /// Why the adapter is not initialized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ChannelHealth {
    pub fn ready() -> Self {
        Self {
            initialized: true,
            reason: None,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            initialized: false,
            reason: Some(reason.into()),
        }
    }
}

/// A rendered message plus the metadata adapters need to deliver it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    /// Template name the body was rendered from.
    pub event_name: String,
    /// Rendered subject line (email).
    pub subject: Option<String>,
    /// Rendered channel-specific body.
    pub body: String,
    pub priority: Priority,
    /// Push subscriber group.
    pub group: Option<String>,
}

impl OutboundMessage {
    pub fn new(event_name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            subject: None,
            body: body.into(),
            priority: Priority::default(),
            group: None,
        }
    }
}

/// Trait implemented by every delivery channel.
///
/// `send` never fails past this boundary: transport errors, missing
/// configuration and an uninitialized state all come back as `false`.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// The channel this adapter delivers through.
    fn kind(&self) -> ChannelKind;

    /// Health established during initialization.
    fn health(&self) -> ChannelHealth;

    /// Attempt one delivery; `true` only on confirmed acceptance.
    async fn send(&self, destination: Option<&str>, message: &OutboundMessage) -> bool;
}

/// Health of one registered channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelHealthReport {
    pub channel: ChannelKind,
    #[serde(flatten)]
    pub health: ChannelHealth,
}

/// Channel-to-adapter table, resolved once at startup.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    adapters: HashMap<ChannelKind, Arc<dyn ChannelAdapter>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own kind, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) -> &mut Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    pub fn with(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, kind: ChannelKind) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    pub fn contains(&self, kind: ChannelKind) -> bool {
        self.adapters.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Health of every registered adapter, in channel order.
    pub fn health_report(&self) -> Vec<ChannelHealthReport> {
        let mut report: Vec<ChannelHealthReport> = self
            .adapters
            .iter()
            .map(|(kind, adapter)| ChannelHealthReport {
                channel: *kind,
                health: adapter.health(),
            })
            .collect();
        report.sort_by_key(|r| r.channel);
        report
    }

    /// Channels whose adapter is registered but not initialized.
    pub fn uninitialized(&self) -> Vec<ChannelKind> {
        self.health_report()
            .into_iter()
            .filter(|r| !r.health.initialized)
            .map(|r| r.channel)
            .collect()
    }
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.adapters.keys().collect();
        kinds.sort();
        f.debug_struct("ChannelRegistry")
            .field("channels", &kinds)
            .finish()
    }
}
