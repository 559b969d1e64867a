//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use logistics_notify::Result;
use logistics_notify::notification::channels::ChatTransport;
use logistics_notify::notification::{ChannelAdapter, ChannelHealth, ChannelKind, OutboundMessage};

/// Adapter with a fixed outcome that records what it was asked to send.
pub struct StubAdapter {
    kind: ChannelKind,
    health: ChannelHealth,
    outcome: bool,
    pub calls: AtomicU32,
    pub sent: Mutex<Vec<OutboundMessage>>,
}

impl StubAdapter {
    pub fn succeeding(kind: ChannelKind) -> Arc<Self> {
        Self::build(kind, ChannelHealth::ready(), true)
    }

    pub fn failing(kind: ChannelKind) -> Arc<Self> {
        Self::build(kind, ChannelHealth::ready(), false)
    }

    pub fn uninitialized(kind: ChannelKind) -> Arc<Self> {
        Self::build(kind, ChannelHealth::unavailable("not configured"), true)
    }

    fn build(kind: ChannelKind, health: ChannelHealth, outcome: bool) -> Arc<Self> {
        Arc::new(Self {
            kind,
            health,
            outcome,
            calls: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelAdapter for StubAdapter {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn health(&self) -> ChannelHealth {
        self.health.clone()
    }

    async fn send(&self, _destination: Option<&str>, message: &OutboundMessage) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().push(message.clone());
        self.outcome
    }
}

/// Chat transport that keeps every reply.
#[derive(Default)]
pub struct RecordingTransport {
    pub messages: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        self.messages
            .lock()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
}
