//! Application configuration.
//!
//! Loaded once at startup: `.env` is read if present, then the JSON file
//! named by `NOTIFY_CONFIG_FILE` (default `notify.json`, optional), then
//! secrets and destinations are overlaid from environment variables. Every
//! field has a default, so an empty file or no file at all is valid.

use std::path::Path;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::server::ApiServerConfig;
use crate::notification::channels::{ChatConfig, EmailConfig, PushConfig};
use crate::notification::history::DEFAULT_HISTORY_CAPACITY;
use crate::notification::{
    ChannelPolicy, DispatcherConfig, MessageTemplate, Priority, StatsConfig, TemplateRegistry,
};
use crate::scheduler::SchedulesConfig;
use crate::{Error, Result};

/// Environment variable naming the JSON configuration file.
pub const CONFIG_FILE_ENV: &str = "NOTIFY_CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "notify.json";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// IANA timezone for schedules and report dates.
    pub timezone: String,
    /// Priority to channel-set table.
    pub policy: ChannelPolicy,
    pub chat: ChatConfig,
    pub email: EmailConfig,
    pub push: PushConfig,
    pub dispatcher: DispatcherConfig,
    pub schedules: SchedulesConfig,
    /// Extra templates, or overrides of the built-in ones by name.
    pub templates: Vec<MessageTemplate>,
    /// Email recipients of scheduled reports and alerts.
    pub report_recipients: Vec<String>,
    pub stats: StatsConfig,
    pub api: ApiServerConfig,
    pub history_capacity: usize,
    pub log_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            policy: ChannelPolicy::default(),
            chat: ChatConfig::default(),
            email: EmailConfig::default(),
            push: PushConfig::default(),
            dispatcher: DispatcherConfig::default(),
            schedules: SchedulesConfig::default(),
            templates: Vec::new(),
            report_recipients: Vec::new(),
            stats: StatsConfig::default(),
            api: ApiServerConfig::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            log_dir: "logs".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from `.env`, the config file and the process environment.
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }

        let path = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        let mut config = if Path::new(&path).exists() {
            info!(path = %path, "Loading configuration file");
            Self::from_file(&path)?
        } else {
            debug!(path = %path, "No configuration file, using defaults");
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            Error::config(format!("Invalid configuration file {}: {e}", path.display()))
        })
    }

    /// Overlay values from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.chat.bot_token = v;
        }
        if let Some(v) = get("TELEGRAM_CHAT_ID") {
            self.chat.chat_id = v;
        }
        if let Some(v) = get("TELEGRAM_WEBHOOK_SECRET") {
            self.chat.webhook_secret = v;
        }
        if let Some(v) = get("RESEND_API_KEY") {
            self.email.primary.api_key = v;
        }
        if let Some(v) = get("SENDGRID_API_KEY") {
            self.email.fallback.api_key = v;
        }
        if let Some(v) = get("EMAIL_FROM") {
            self.email.from_address = v;
        }
        if let Some(v) = get("REPORT_RECIPIENTS") {
            self.report_recipients = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = get("NOTIFY_TIMEZONE") {
            self.timezone = v;
        }
        if let Some(v) = get("STATS_URL") {
            self.stats.url = v;
        }
        if let Some(v) = get("API_BIND_ADDRESS") {
            self.api.bind_address = v;
        }
        if let Some(v) = get("API_PORT") {
            match v.parse::<u16>() {
                Ok(port) => self.api.port = port,
                Err(_) => warn!(value = %v, "Ignoring invalid API_PORT"),
            }
        }
        if let Some(v) = get("LOG_DIR") {
            self.log_dir = v;
        }
    }

    /// Check the parts that cannot be defaulted away.
    pub fn validate(&self) -> Result<()> {
        self.tz()?;
        if !self.policy.has_entry(Priority::Medium) {
            return Err(Error::config(
                "policy must define the medium priority fallback",
            ));
        }
        if let Some(t) = self.templates.iter().find(|t| t.name.trim().is_empty()) {
            return Err(Error::config(format!(
                "template with empty name (subject {:?})",
                t.subject
            )));
        }
        Ok(())
    }

    /// The configured timezone.
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .trim()
            .parse::<Tz>()
            .map_err(|_| Error::InvalidTimezone(self.timezone.clone()))
    }

    /// Built-in templates with the configured ones layered on top.
    pub fn template_registry(&self) -> TemplateRegistry {
        let mut registry = TemplateRegistry::with_builtins();
        for template in &self.templates {
            registry.insert(template.clone());
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;
    use crate::notification::{ChannelKind, UninitializedPolicy};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tz().unwrap(), chrono_tz::UTC);
        assert_eq!(config.history_capacity, 1000);
        assert!(config.schedules.health_check.enabled);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "timezone": "Europe/Warsaw",
                "policy": {{"high": ["chat", "email"], "medium": ["push"]}},
                "dispatcher": {{"send_timeout_ms": 500, "uninitialized_policy": "record_failure"}},
                "schedules": {{"daily_report": {{"cron": "30 7 * * *", "enabled": true}}}},
                "templates": [{{"name": "promo", "bodies": {{"push": "Sale: {{{{discount}}}}"}}}}],
                "report_recipients": ["boss@example.com"]
            }}"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.tz().unwrap(), chrono_tz::Europe::Warsaw);
        assert_eq!(
            config.policy.resolve(Priority::High),
            &[ChannelKind::Chat, ChannelKind::Email]
        );
        assert_eq!(config.dispatcher.send_timeout_ms, 500);
        assert_eq!(
            config.dispatcher.uninitialized_policy,
            UninitializedPolicy::RecordFailure
        );
        assert_eq!(config.schedules.daily_report.cron, "30 7 * * *");
        assert!(config.schedules.weekly_report.enabled);
        assert_eq!(config.report_recipients, vec!["boss@example.com"]);

        let templates = config.template_registry();
        assert_eq!(
            templates.body("promo", ChannelKind::Push),
            Some("Sale: {{discount}}")
        );
        assert!(templates.get("orderStatus").is_some());
    }

    #[test]
    fn test_malformed_file_is_configuration_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_env_overlay() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "-100"),
            ("RESEND_API_KEY", "re_key"),
            ("EMAIL_FROM", "noreply@example.com"),
            ("REPORT_RECIPIENTS", "a@example.com, b@example.com,,"),
            ("NOTIFY_TIMEZONE", "America/Sao_Paulo"),
            ("API_PORT", "8088"),
            ("SENDGRID_API_KEY", "  "),
        ]));

        assert_eq!(config.chat.bot_token, "123:abc");
        assert_eq!(config.chat.chat_id, "-100");
        assert_eq!(config.email.primary.api_key, "re_key");
        assert!(config.email.fallback.api_key.is_empty());
        assert_eq!(config.email.from_address, "noreply@example.com");
        assert_eq!(
            config.report_recipients,
            vec!["a@example.com", "b@example.com"]
        );
        assert_eq!(config.api.port, 8088);
        assert_eq!(config.tz().unwrap(), chrono_tz::America::Sao_Paulo);
    }

    #[test]
    fn test_invalid_port_ignored() {
        let mut config = AppConfig::default();
        let port = config.api.port;
        config.apply_env(env(&[("API_PORT", "http")]));
        assert_eq!(config.api.port, port);
    }

    #[test]
    fn test_validate_rejects_bad_timezone_and_policy() {
        let config = AppConfig {
            timezone: "Mars/Olympus".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidTimezone(_))));

        let config = AppConfig {
            policy: ChannelPolicy::new().with(Priority::High, [ChannelKind::Chat]),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }
}
