//! Chat notification channel (Telegram Bot API).
//!
//! Outbound messages always go to the single configured chat; there is no
//! per-recipient fan-out. Inbound bot commands are handled by
//! [`commands::CommandRouter`], which shares this channel's transport.

pub mod commands;

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{ChannelAdapter, ChannelHealth, ChannelKind, OutboundMessage};
use crate::notification::events::Priority;
use crate::utils::http_client;
use crate::{Error, Result};

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Telegram `sendMessage` text limit (UTF-8 characters).
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

const TRUNCATED_SUFFIX: &str = "\n\n[truncated]";

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>?").expect("tag pattern is valid"));

/// Chat channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Telegram Bot API token.
    pub bot_token: String,
    /// Target chat ID (user, group, or channel).
    pub chat_id: String,
    /// Parse mode for message formatting (HTML, Markdown, MarkdownV2).
    pub parse_mode: String,
    /// Bot API base URL.
    pub api_base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` on webhook calls; empty
    /// disables the check.
    pub webhook_secret: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token: String::new(),
            chat_id: String::new(),
            parse_mode: "HTML".to_string(),
            api_base_url: DEFAULT_API_BASE.to_string(),
            timeout_secs: 10,
            webhook_secret: String::new(),
        }
    }
}

impl ChatConfig {
    fn missing_reason(&self) -> Option<&'static str> {
        if !self.enabled {
            Some("chat channel disabled")
        } else if self.bot_token.trim().is_empty() {
            Some("bot token not configured")
        } else if self.chat_id.trim().is_empty() {
            Some("chat id not configured")
        } else {
            None
        }
    }
}

/// Transport that delivers a text message to a chat.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()>;
}

/// Telegram Bot API transport.
///
/// Handles 429 rate limits by respecting the `parameters.retry_after` field
/// returned in the JSON response body.
pub struct TelegramTransport {
    client: Client,
    bot_token: String,
    api_base_url: String,
    parse_mode: String,
}

impl TelegramTransport {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = http_client::build_client(
            "Telegram",
            Duration::from_secs(config.timeout_secs.max(1)),
        )?;
        Ok(Self {
            client,
            bot_token: config.bot_token.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            parse_mode: config.parse_mode.clone(),
        })
    }

    /// Send request with rate limit handling.
    async fn send_with_retry(&self, payload: &serde_json::Value) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base_url, self.bot_token);
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(&url)
                .json(payload)
                .send()
                .await
                .map_err(|e| Error::transport("chat", format!("Telegram request failed: {e}")))?;

            let status = response.status();

            if status.is_success() {
                return Ok(());
            }

            if status.as_u16() == 429 {
                let body: serde_json::Value = response.json().await.unwrap_or_default();

                let retry_after = body
                    .get("parameters")
                    .and_then(|p| p.get("retry_after"))
                    .and_then(|v| v.as_u64())
                    .map(Duration::from_secs);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Telegram rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Err(Error::transport(
                        "chat",
                        format!("Telegram rate limit exceeded after {MAX_RATE_LIMIT_RETRIES} retries"),
                    ));
                }

                let wait_duration = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    "Telegram rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait_duration, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait_duration).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(Error::transport(
                "chat",
                format!("Telegram sendMessage failed: {status} - {body}"),
            ));
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let payload = json!({
            "chat_id": chat_id,
            "text": truncate_message(
                text,
                TELEGRAM_MESSAGE_LIMIT,
                self.parse_mode.eq_ignore_ascii_case("html"),
            ),
            "parse_mode": self.parse_mode,
            "disable_web_page_preview": true,
        });
        self.send_with_retry(&payload).await
    }
}

/// Chat channel adapter.
pub struct ChatAdapter {
    config: ChatConfig,
    transport: Option<Arc<dyn ChatTransport>>,
    health: ChannelHealth,
}

impl ChatAdapter {
    /// Stand up the Telegram transport from configuration.
    ///
    /// Never fails: missing credentials leave the adapter uninitialized.
    pub fn initialize(config: ChatConfig) -> Self {
        if let Some(reason) = config.missing_reason() {
            return Self::unavailable(config, reason);
        }
        match TelegramTransport::new(&config) {
            Ok(transport) => Self::with_transport(config, Arc::new(transport)),
            Err(e) => {
                let reason = e.to_string();
                Self::unavailable(config, reason)
            }
        }
    }

    /// Build the adapter around an existing transport.
    pub fn with_transport(config: ChatConfig, transport: Arc<dyn ChatTransport>) -> Self {
        if let Some(reason) = config.missing_reason() {
            return Self::unavailable(config, reason);
        }
        info!(chat_id = %config.chat_id, "Chat channel initialized");
        Self {
            config,
            transport: Some(transport),
            health: ChannelHealth::ready(),
        }
    }

    fn unavailable(config: ChatConfig, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(reason = %reason, "Chat channel not initialized");
        Self {
            config,
            transport: None,
            health: ChannelHealth::unavailable(reason),
        }
    }

    /// The configured destination chat.
    pub fn chat_id(&self) -> &str {
        &self.config.chat_id
    }

    /// Transport shared with the inbound command router.
    pub fn transport(&self) -> Option<Arc<dyn ChatTransport>> {
        self.transport.clone()
    }

    /// Build the message text for a rendered notification.
    fn build_message(&self, message: &OutboundMessage) -> String {
        let emoji = match message.priority {
            Priority::Low => "\u{2139}\u{fe0f}",   // ℹ️
            Priority::Medium => "\u{1f514}",       // 🔔
            Priority::High => "\u{1f6a8}",         // 🚨
        };
        format!("{emoji} {}", message.body)
    }
}

#[async_trait]
impl ChannelAdapter for ChatAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Chat
    }

    fn health(&self) -> ChannelHealth {
        self.health.clone()
    }

    async fn send(&self, _destination: Option<&str>, message: &OutboundMessage) -> bool {
        let Some(transport) = self.transport.as_ref() else {
            debug!(event = %message.event_name, "Chat channel not initialized, skipping send");
            return false;
        };

        let text = self.build_message(message);
        match transport.send_message(&self.config.chat_id, &text).await {
            Ok(()) => {
                debug!(event = %message.event_name, "Chat notification sent");
                true
            }
            Err(e) => {
                warn!(
                    channel = "chat",
                    destination = %self.config.chat_id,
                    event = %message.event_name,
                    error = %e,
                    "Chat notification failed"
                );
                false
            }
        }
    }
}

/// Truncate a message to fit within the Telegram character limit.
///
/// HTML messages lose their markup before the cut, and the cut never ends
/// inside an entity such as `&amp;`, so Telegram can still parse the result.
fn truncate_message(text: &str, limit: usize, html: bool) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let text = if html {
        HTML_TAG.replace_all(text, "")
    } else {
        text.into()
    };
    if text.chars().count() <= limit {
        return text.into_owned();
    }

    let budget = limit.saturating_sub(TRUNCATED_SUFFIX.chars().count());
    let mut truncated: String = text.chars().take(budget).collect();
    if html
        && let Some(amp) = truncated.rfind('&')
        && !truncated[amp..].contains(';')
    {
        truncated.truncate(amp);
    }
    format!("{truncated}{TRUNCATED_SUFFIX}")
}
