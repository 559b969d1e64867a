//! Notification events.
//!
//! Defines the events callers hand to the dispatcher, their priority levels,
//! and the catalogue of well-known logistics event types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Static metadata about a supported notification event type.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct NotificationEventTypeInfo {
    /// Canonical template name.
    pub template_name: &'static str,
    /// Human-friendly label.
    pub label: &'static str,
    /// Priority used when the caller does not pick one.
    pub default_priority: Priority,
    /// Additional accepted names (legacy / aliases).
    pub aliases: &'static [&'static str],
}

const NOTIFICATION_EVENT_TYPES: &[NotificationEventTypeInfo] = &[
    NotificationEventTypeInfo {
        template_name: "orderStatus",
        label: "Order Status Changed",
        default_priority: Priority::Low,
        aliases: &["order_status", "order.status", "OrderStatus"],
    },
    NotificationEventTypeInfo {
        template_name: "newOrder",
        label: "New Order",
        default_priority: Priority::Medium,
        aliases: &["new_order", "order.created", "NewOrder"],
    },
    NotificationEventTypeInfo {
        template_name: "lowStock",
        label: "Low Stock",
        default_priority: Priority::High,
        aliases: &["low_stock", "inventory.low", "LowStock"],
    },
    NotificationEventTypeInfo {
        template_name: "deliveryDelayed",
        label: "Delivery Delayed",
        default_priority: Priority::High,
        aliases: &["delivery_delayed", "delivery.delayed", "DeliveryDelayed"],
    },
    NotificationEventTypeInfo {
        template_name: "paymentReceived",
        label: "Payment Received",
        default_priority: Priority::Low,
        aliases: &["payment_received", "payment.received", "PaymentReceived"],
    },
    NotificationEventTypeInfo {
        template_name: "dailyReport",
        label: "Daily Report",
        default_priority: Priority::Medium,
        aliases: &["daily_report", "report.daily", "DailyReport"],
    },
    NotificationEventTypeInfo {
        template_name: "weeklyReport",
        label: "Weekly Report",
        default_priority: Priority::Medium,
        aliases: &["weekly_report", "report.weekly", "WeeklyReport"],
    },
    NotificationEventTypeInfo {
        template_name: "monthlyReport",
        label: "Monthly Report",
        default_priority: Priority::High,
        aliases: &["monthly_report", "report.monthly", "MonthlyReport"],
    },
    NotificationEventTypeInfo {
        template_name: "systemAlert",
        label: "System Alert",
        default_priority: Priority::High,
        aliases: &["system_alert", "system.alert", "SystemAlert"],
    },
];

pub fn notification_event_types() -> &'static [NotificationEventTypeInfo] {
    NOTIFICATION_EVENT_TYPES
}

/// Resolve a template name or one of its aliases to the canonical name.
pub fn canonicalize_template_name(input: &str) -> Option<&'static str> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let normalized_input = normalize_event_key(trimmed);
    for info in NOTIFICATION_EVENT_TYPES {
        if normalize_event_key(info.template_name) == normalized_input {
            return Some(info.template_name);
        }
        for alias in info.aliases {
            if normalize_event_key(alias) == normalized_input {
                return Some(info.template_name);
            }
        }
    }

    None
}

fn normalize_event_key(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Notification priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Informational, realtime only by default.
    Low,
    /// Standard notifications.
    Medium,
    /// Important events, every channel by default.
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "normal" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::validation(format!("Unknown priority: {other}"))),
        }
    }
}

/// A single value in an event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl TemplateValue {
    /// Whether the value renders to an empty string.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for TemplateValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u64> for TemplateValue {
    fn from(value: u64) -> Self {
        i64::try_from(value)
            .map(Self::Integer)
            .unwrap_or(Self::Float(value as f64))
    }
}

impl From<f64> for TemplateValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for TemplateValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Flat key/value payload carried by an event.
pub type TemplateData = BTreeMap<String, TemplateValue>;

/// An email recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
}

impl Recipient {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
        }
    }
}

/// An event to be delivered through the priority's channel set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    /// Template to render for every channel.
    pub template_name: String,
    /// Values substituted into the template placeholders.
    #[serde(default)]
    pub data: TemplateData,
    /// Email recipients; chat and push use process-wide destinations.
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    #[serde(default)]
    pub priority: Priority,
    /// Optional push subscriber group; broadcast to everyone when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl NotificationEvent {
    pub fn new(template_name: impl Into<String>, priority: Priority) -> Self {
        let template_name = template_name.into();
        let template_name = canonicalize_template_name(&template_name)
            .map(str::to_string)
            .unwrap_or(template_name);
        Self {
            template_name,
            data: TemplateData::new(),
            recipients: Vec::new(),
            priority,
            group: None,
        }
    }

    /// Build an event using the catalogue's default priority for the template.
    pub fn with_default_priority(template_name: impl Into<String>) -> Self {
        let template_name = template_name.into();
        let priority = canonicalize_template_name(&template_name)
            .and_then(|name| {
                NOTIFICATION_EVENT_TYPES
                    .iter()
                    .find(|info| info.template_name == name)
            })
            .map(|info| info.default_priority)
            .unwrap_or_default();
        Self::new(template_name, priority)
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<TemplateValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn recipient(mut self, email: impl Into<String>) -> Self {
        self.recipients.push(Recipient::new(email));
        self
    }

    pub fn recipients<I, S>(mut self, emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recipients
            .extend(emails.into_iter().map(Recipient::new));
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}
