//! Message templates and placeholder rendering.
//!
//! Placeholders use `{{key}}` (whitespace inside the braces is tolerated).
//! Every well-formed placeholder is substituted: with the value's display
//! string when `data` has a non-empty value for the key, with [`FALLBACK_VALUE`]
//! otherwise. Anything that is not a well-formed placeholder is left as-is.
//! Values that would themselves form a placeholder are broken up as
//! `{ {key} }`, so rendered output never contains one.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::channels::ChannelKind;
use super::events::{TemplateData, canonicalize_template_name};

/// Substituted for placeholders whose key is missing or empty.
pub const FALLBACK_VALUE: &str = "N/A";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder pattern is valid")
});

/// Fill every placeholder in `template` from `data`.
pub fn render(template: &str, data: &TemplateData) -> String {
    render_with(template, data, |value| value.to_string())
}

/// Like [`render`], but HTML-escapes substituted values.
pub fn render_html(template: &str, data: &TemplateData) -> String {
    render_with(template, data, escape_html)
}

fn render_with<F>(template: &str, data: &TemplateData, escape: F) -> String
where
    F: Fn(&str) -> String,
{
    let rendered = PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            match data.get(&caps[1]) {
                Some(value) if !value.is_empty() => escape(&value.to_string()),
                _ => FALLBACK_VALUE.to_string(),
            }
        })
        .into_owned();
    defuse_placeholders(rendered)
}

/// Break up any placeholder left in rendered text. Only substituted values
/// can produce one, alone or joined with stray braces around the placeholder.
fn defuse_placeholders(mut text: String) -> String {
    while PLACEHOLDER.is_match(&text) {
        text = PLACEHOLDER
            .replace_all(&text, |caps: &Captures<'_>| {
                let whole = &caps[0];
                let inner = &whole[2..whole.len() - 2];
                format!("{{ {{{inner}}} }}")
            })
            .into_owned();
    }
    text
}

/// Escape the five HTML-significant characters.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Channel-specific bodies for one event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub name: String,
    /// Subject line, used by email and as the push title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Body per channel; a missing channel means "not applicable".
    pub bodies: BTreeMap<ChannelKind, String>,
}

impl MessageTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subject: None,
            bodies: BTreeMap::new(),
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn body(mut self, channel: ChannelKind, body: impl Into<String>) -> Self {
        self.bodies.insert(channel, body.into());
        self
    }

    pub fn body_for(&self, channel: ChannelKind) -> Option<&str> {
        self.bodies.get(&channel).map(String::as_str)
    }
}

/// Templates keyed by name.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, MessageTemplate>,
}

impl TemplateRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the logistics templates.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for template in builtin_templates() {
            registry.insert(template);
        }
        registry
    }

    /// Add or replace a template.
    pub fn insert(&mut self, template: MessageTemplate) {
        if self.templates.contains_key(&template.name) {
            debug!(template = %template.name, "Overriding message template");
        }
        self.templates.insert(template.name.clone(), template);
    }

    /// Look a template up by name, falling back to its canonical alias.
    pub fn get(&self, name: &str) -> Option<&MessageTemplate> {
        self.templates.get(name).or_else(|| {
            canonicalize_template_name(name).and_then(|canonical| self.templates.get(canonical))
        })
    }

    /// Body for `(template, channel)`, if both exist.
    pub fn body(&self, name: &str, channel: ChannelKind) -> Option<&str> {
        self.get(name).and_then(|t| t.body_for(channel))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn builtin_templates() -> Vec<MessageTemplate> {
    use ChannelKind::{Chat, Email, Push};

    vec![
        MessageTemplate::new("orderStatus")
            .subject("Order {{orderId}} is now {{status}}")
            .body(
                Chat,
                "<b>Order update</b>\nOrder: {{orderId}}\nStatus: {{status}}\nCustomer: {{customer}}",
            )
            .body(
                Email,
                "<p>Order <strong>{{orderId}}</strong> changed status to <strong>{{status}}</strong>.</p>\
                 <p>Customer: {{customer}}</p>",
            )
            .body(Push, "Order {{orderId}}: {{status}}"),
        MessageTemplate::new("newOrder")
            .subject("New order {{orderId}}")
            .body(
                Chat,
                "<b>New order</b>\nOrder: {{orderId}}\nCustomer: {{customer}}\nItems: {{items}}\nTotal: {{total}}",
            )
            .body(
                Email,
                "<p>A new order <strong>{{orderId}}</strong> was placed by {{customer}}.</p>\
                 <p>Items: {{items}}<br>Total: {{total}}</p>",
            )
            .body(Push, "New order {{orderId}} from {{customer}}"),
        MessageTemplate::new("lowStock")
            .subject("Low stock: {{product}}")
            .body(
                Chat,
                "<b>Low stock</b>\nProduct: {{product}}\nWarehouse: {{warehouse}}\nRemaining: {{quantity}} (threshold {{threshold}})",
            )
            .body(
                Email,
                "<p>Stock for <strong>{{product}}</strong> in {{warehouse}} dropped to \
                 <strong>{{quantity}}</strong> (threshold {{threshold}}).</p>",
            )
            .body(Push, "Low stock: {{product}} ({{quantity}} left)"),
        MessageTemplate::new("deliveryDelayed")
            .subject("Delivery {{shipmentId}} delayed")
            .body(
                Chat,
                "<b>Delivery delayed</b>\nShipment: {{shipmentId}}\nDriver: {{driver}}\nNew ETA: {{eta}}\nReason: {{reason}}",
            )
            .body(
                Email,
                "<p>Shipment <strong>{{shipmentId}}</strong> is delayed.</p>\
                 <p>Driver: {{driver}}<br>New ETA: {{eta}}<br>Reason: {{reason}}</p>",
            )
            .body(Push, "Shipment {{shipmentId}} delayed, ETA {{eta}}"),
        MessageTemplate::new("paymentReceived")
            .subject("Payment received for {{orderId}}")
            .body(
                Chat,
                "<b>Payment received</b>\nOrder: {{orderId}}\nAmount: {{amount}}\nMethod: {{method}}",
            )
            .body(
                Email,
                "<p>Payment of <strong>{{amount}}</strong> received for order {{orderId}} via {{method}}.</p>",
            )
            .body(Push, "Payment {{amount}} received for {{orderId}}"),
        report_template("dailyReport", "Daily summary for {{date}}"),
        report_template("weeklyReport", "Weekly summary ({{period}})"),
        report_template("monthlyReport", "Monthly summary ({{period}})"),
        MessageTemplate::new("systemAlert")
            .subject("System alert: {{title}}")
            .body(Chat, "<b>System alert</b>\n{{title}}\n{{message}}\nAt: {{timestamp}}")
            .body(
                Email,
                "<p><strong>{{title}}</strong></p><p>{{message}}</p><p>At: {{timestamp}}</p>",
            )
            .body(Push, "{{title}}: {{message}}"),
    ]
}

fn report_template(name: &str, subject: &str) -> MessageTemplate {
    use ChannelKind::{Chat, Email, Push};

    MessageTemplate::new(name)
        .subject(subject)
        .body(
            Chat,
            "<b>{{title}}</b>\nPeriod: {{period}}\nOrders: {{totalOrders}} (delivered {{deliveredOrders}}, pending {{pendingOrders}})\n\
             Shipments in transit: {{shipmentsInTransit}}\nDelayed deliveries: {{delayedDeliveries}}\n\
             Low-stock items: {{lowStockItems}}\nRevenue: {{revenue}}",
        )
        .body(
            Email,
            "<h3>{{title}}</h3><p>Period: {{period}}</p><table>\
             <tr><td>Total orders</td><td>{{totalOrders}}</td></tr>\
             <tr><td>Delivered</td><td>{{deliveredOrders}}</td></tr>\
             <tr><td>Pending</td><td>{{pendingOrders}}</td></tr>\
             <tr><td>Shipments in transit</td><td>{{shipmentsInTransit}}</td></tr>\
             <tr><td>Delayed deliveries</td><td>{{delayedDeliveries}}</td></tr>\
             <tr><td>Low-stock items</td><td>{{lowStockItems}}</td></tr>\
             <tr><td>Revenue</td><td>{{revenue}}</td></tr></table>",
        )
        .body(Push, "{{title}}: {{totalOrders}} orders, {{delayedDeliveries}} delayed")
}
