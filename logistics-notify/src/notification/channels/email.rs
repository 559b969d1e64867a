//! Email notification channel.
//!
//! Two interchangeable HTTP providers sit behind [`EmailTransport`]: Resend is
//! the primary, SendGrid the fallback. The fallback is only used when the
//! primary is not configured; a single send never touches both.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{ChannelAdapter, ChannelHealth, ChannelKind, OutboundMessage};
use crate::notification::events::Priority;
use crate::notification::template::escape_html;
use crate::utils::http_client;
use crate::{Error, Result};

const RESEND_API_BASE: &str = "https://api.resend.com";
const SENDGRID_API_BASE: &str = "https://api.sendgrid.com";

/// Credentials for one HTTP email provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailProviderConfig {
    /// Provider API key; the provider is unconfigured when empty.
    pub api_key: String,
    /// Override for the provider base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl EmailProviderConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Email channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Sender email address.
    pub from_address: String,
    /// Sender display name.
    pub from_name: String,
    /// Prefix prepended to every subject.
    pub subject_prefix: String,
    /// Primary provider (Resend).
    pub primary: EmailProviderConfig,
    /// Fallback provider (SendGrid).
    pub fallback: EmailProviderConfig,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            from_address: String::new(),
            from_name: "Logistics".to_string(),
            subject_prefix: "[Logistics]".to_string(),
            primary: EmailProviderConfig::default(),
            fallback: EmailProviderConfig::default(),
            timeout_secs: 15,
        }
    }
}

impl EmailConfig {
    fn sender(&self) -> String {
        if self.from_name.trim().is_empty() {
            self.from_address.clone()
        } else {
            format!("{} <{}>", self.from_name, self.from_address)
        }
    }
}

/// Transport that hands one email to a provider.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;

    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()>;
}

fn build_client(timeout_secs: u64) -> Result<Client> {
    http_client::build_client("email", Duration::from_secs(timeout_secs.max(1)))
}

/// Resend HTTP API transport.
pub struct ResendTransport {
    client: Client,
    api_key: String,
    base_url: String,
    from: String,
}

impl ResendTransport {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_key: config.primary.api_key.clone(),
            base_url: config
                .primary
                .base_url
                .clone()
                .unwrap_or_else(|| RESEND_API_BASE.to_string()),
            from: config.sender(),
        })
    }
}

#[async_trait]
impl EmailTransport for ResendTransport {
    fn name(&self) -> &'static str {
        "resend"
    }

    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/emails", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": [to],
                "subject": subject,
                "html": html_body,
            }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::transport(
            "email",
            format!("Resend rejected message: {status} - {body}"),
        ))
    }
}

/// SendGrid v3 mail-send transport.
pub struct SendGridTransport {
    client: Client,
    api_key: String,
    base_url: String,
    from_address: String,
    from_name: String,
}

impl SendGridTransport {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_key: config.fallback.api_key.clone(),
            base_url: config
                .fallback
                .base_url
                .clone()
                .unwrap_or_else(|| SENDGRID_API_BASE.to_string()),
            from_address: config.from_address.clone(),
            from_name: config.from_name.clone(),
        })
    }
}

#[async_trait]
impl EmailTransport for SendGridTransport {
    fn name(&self) -> &'static str {
        "sendgrid"
    }

    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "personalizations": [{ "to": [{ "email": to }] }],
                "from": { "email": self.from_address, "name": self.from_name },
                "subject": subject,
                "content": [{ "type": "text/html", "value": html_body }],
            }))
            .send()
            .await?;

        // SendGrid answers 202 Accepted on success.
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::transport(
            "email",
            format!("SendGrid rejected message: {status} - {body}"),
        ))
    }
}

/// Email channel adapter.
pub struct EmailAdapter {
    config: EmailConfig,
    transport: Option<Arc<dyn EmailTransport>>,
    health: ChannelHealth,
}

impl EmailAdapter {
    /// Stand up the email transport from configuration.
    ///
    /// The primary provider wins when configured; the fallback is only
    /// considered when the primary is absent or fails to build.
    pub fn initialize(config: EmailConfig) -> Self {
        let primary = if config.primary.is_configured() {
            match ResendTransport::new(&config) {
                Ok(t) => Some(Arc::new(t) as Arc<dyn EmailTransport>),
                Err(e) => {
                    warn!(error = %e, "Primary email transport unavailable");
                    None
                }
            }
        } else {
            None
        };

        let fallback = if primary.is_none() && config.fallback.is_configured() {
            match SendGridTransport::new(&config) {
                Ok(t) => Some(Arc::new(t) as Arc<dyn EmailTransport>),
                Err(e) => {
                    warn!(error = %e, "Fallback email transport unavailable");
                    None
                }
            }
        } else {
            None
        };

        Self::with_transports(config, primary, fallback)
    }

    /// Build the adapter around explicit transports.
    pub fn with_transports(
        config: EmailConfig,
        primary: Option<Arc<dyn EmailTransport>>,
        fallback: Option<Arc<dyn EmailTransport>>,
    ) -> Self {
        let missing = if !config.enabled {
            Some("email channel disabled")
        } else if config.from_address.trim().is_empty() {
            Some("sender address not configured")
        } else if primary.is_none() && fallback.is_none() {
            Some("no email provider configured")
        } else {
            None
        };

        if let Some(reason) = missing {
            warn!(reason = %reason, "Email channel not initialized");
            return Self {
                config,
                transport: None,
                health: ChannelHealth::unavailable(reason),
            };
        }

        let transport = primary.or(fallback);
        if let Some(t) = &transport {
            info!(provider = t.name(), "Email channel initialized");
        }
        Self {
            config,
            transport,
            health: ChannelHealth::ready(),
        }
    }

    /// Name of the provider selected at initialization.
    pub fn provider(&self) -> Option<&'static str> {
        self.transport.as_ref().map(|t| t.name())
    }

    /// Build the email subject.
    fn build_subject(&self, message: &OutboundMessage) -> String {
        let subject = message
            .subject
            .clone()
            .unwrap_or_else(|| message.event_name.clone());
        if self.config.subject_prefix.is_empty() {
            subject
        } else {
            format!("{} {}", self.config.subject_prefix, subject)
        }
    }

    /// Wrap the rendered body in the HTML layout.
    fn build_body_html(&self, message: &OutboundMessage) -> String {
        let priority_color = match message.priority {
            Priority::Low => "#808080",
            Priority::Medium => "#3498db",
            Priority::High => "#e74c3c",
        };
        let title = escape_html(message.subject.as_deref().unwrap_or(&message.event_name));

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 20px; }}
        .header {{ background-color: {}; color: white; padding: 15px; border-radius: 5px; }}
        .content {{ padding: 20px; background-color: #f9f9f9; border-radius: 5px; margin-top: 10px; }}
        .footer {{ color: #666; font-size: 12px; margin-top: 20px; }}
    </style>
</head>
<body>
    <div class="header">
        <h2>{}</h2>
    </div>
    <div class="content">
        {}
    </div>
    <div class="footer">
        <p>Priority: {} | Type: {} | Time: {}</p>
    </div>
</body>
</html>"#,
            priority_color,
            title,
            message.body,
            message.priority,
            escape_html(&message.event_name),
            Utc::now().to_rfc3339()
        )
    }
}

#[async_trait]
impl ChannelAdapter for EmailAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn health(&self) -> ChannelHealth {
        self.health.clone()
    }

    async fn send(&self, destination: Option<&str>, message: &OutboundMessage) -> bool {
        let Some(transport) = self.transport.as_ref() else {
            debug!(event = %message.event_name, "Email channel not initialized, skipping send");
            return false;
        };
        let Some(to) = destination.map(str::trim).filter(|to| !to.is_empty()) else {
            warn!(event = %message.event_name, "Email send without a destination address");
            return false;
        };

        let subject = self.build_subject(message);
        let html = self.build_body_html(message);

        match transport.send(to, &subject, &html).await {
            Ok(()) => {
                debug!(provider = transport.name(), to = %to, "Email notification sent");
                true
            }
            Err(e) => {
                warn!(
                    channel = "email",
                    provider = transport.name(),
                    destination = %to,
                    event = %message.event_name,
                    error = %e,
                    "Email notification failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;

    use super::*;

    /// Captures `(to, subject, html)` instead of calling a provider.
    pub struct RecordingEmailTransport {
        name: &'static str,
        pub fail_for: Vec<String>,
        pub sent: Mutex<Vec<(String, String, String)>>,
    }

    impl RecordingEmailTransport {
        pub fn new(name: &'static str) -> Self {
            Self {
                name,
                fail_for: Vec::new(),
                sent: Mutex::new(Vec::new()),
            }
        }

        pub fn failing_for(name: &'static str, addresses: &[&str]) -> Self {
            Self {
                name,
                fail_for: addresses.iter().map(|a| a.to_string()).collect(),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EmailTransport for RecordingEmailTransport {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
            self.sent
                .lock()
                .push((to.to_string(), subject.to_string(), html_body.to_string()));
            if self.fail_for.iter().any(|a| a == to) {
                Err(Error::transport("email", "mailbox unavailable"))
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingEmailTransport;
    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            from_address: "noreply@example.com".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_email_config_default() {
        let config = EmailConfig::default();
        assert!(config.enabled);
        assert!(!config.primary.is_configured());
        assert!(!config.fallback.is_configured());
        assert_eq!(config.timeout_secs, 15);
    }

    #[test]
    fn test_initialize_without_providers() {
        let adapter = EmailAdapter::initialize(config());
        assert!(!adapter.health().initialized);
        assert_eq!(
            adapter.health().reason.as_deref(),
            Some("no email provider configured")
        );
    }

    #[test]
    fn test_initialize_prefers_primary() {
        let mut config = config();
        config.primary.api_key = "re_123".to_string();
        config.fallback.api_key = "SG.456".to_string();
        let adapter = EmailAdapter::initialize(config);
        assert!(adapter.health().initialized);
        assert_eq!(adapter.provider(), Some("resend"));
    }

    #[test]
    fn test_initialize_uses_fallback_when_primary_missing() {
        let mut config = config();
        config.fallback.api_key = "SG.456".to_string();
        let adapter = EmailAdapter::initialize(config);
        assert_eq!(adapter.provider(), Some("sendgrid"));
    }

    #[tokio::test]
    async fn test_send_uses_only_primary() {
        let primary = Arc::new(RecordingEmailTransport::new("primary"));
        let fallback = Arc::new(RecordingEmailTransport::new("fallback"));
        let adapter =
            EmailAdapter::with_transports(config(), Some(primary.clone()), Some(fallback.clone()));

        let mut message = OutboundMessage::new("orderStatus", "<p>Order X1 shipped</p>");
        message.subject = Some("Order X1 update".to_string());

        assert!(adapter.send(Some("ops@example.com"), &message).await);
        assert_eq!(primary.sent.lock().len(), 1);
        assert!(fallback.sent.lock().is_empty());

        let (to, subject, html) = primary.sent.lock()[0].clone();
        assert_eq!(to, "ops@example.com");
        assert_eq!(subject, "[Logistics] Order X1 update");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<p>Order X1 shipped</p>"));
    }

    #[tokio::test]
    async fn test_primary_failure_does_not_fall_back() {
        let primary = Arc::new(RecordingEmailTransport::failing_for(
            "primary",
            &["ops@example.com"],
        ));
        let fallback = Arc::new(RecordingEmailTransport::new("fallback"));
        let adapter =
            EmailAdapter::with_transports(config(), Some(primary.clone()), Some(fallback.clone()));

        let message = OutboundMessage::new("orderStatus", "body");
        assert!(!adapter.send(Some("ops@example.com"), &message).await);
        assert!(fallback.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_send_without_destination_fails() {
        let primary = Arc::new(RecordingEmailTransport::new("primary"));
        let adapter = EmailAdapter::with_transports(config(), Some(primary.clone()), None);
        assert!(!adapter.send(None, &OutboundMessage::new("x", "y")).await);
        assert!(!adapter.send(Some("  "), &OutboundMessage::new("x", "y")).await);
        assert!(primary.sent.lock().is_empty());
    }

    #[test]
    fn test_subject_falls_back_to_event_name() {
        let adapter = EmailAdapter::initialize(config());
        let message = OutboundMessage::new("lowStock", "body");
        assert_eq!(adapter.build_subject(&message), "[Logistics] lowStock");
    }

    #[test]
    fn test_html_layout_escapes_title() {
        let adapter = EmailAdapter::initialize(config());
        let mut message = OutboundMessage::new("lowStock", "<p>ok</p>");
        message.subject = Some("Stock <low>".to_string());
        let html = adapter.build_body_html(&message);
        assert!(html.contains("Stock &lt;low&gt;"));
        assert!(html.contains("<p>ok</p>"));
    }
}
