//! API request and response models (DTOs).
//!
//! Domain types that already serialize the way clients expect
//! ([`NotificationEvent`](crate::notification::NotificationEvent),
//! [`DispatchResult`](crate::notification::DispatchResult),
//! [`JobStatus`](crate::scheduler::JobStatus)) are returned as-is; this module
//! only holds the envelopes around them.

use serde::{Deserialize, Serialize};

use crate::notification::{HistoryEntry, HistorySummary, NotificationEventTypeInfo, Priority};

/// Largest page the history endpoint returns.
pub const MAX_HISTORY_LIMIT: usize = 500;

// ============================================================================
// History
// ============================================================================

/// Query parameters for `GET /api/notifications/history`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    /// Number of entries to return, newest first (default: 50, max: 500)
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    50
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: default_history_limit(),
        }
    }
}

impl HistoryQuery {
    pub fn effective_limit(&self) -> usize {
        self.limit.min(MAX_HISTORY_LIMIT)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<HistoryEntry>,
    pub summary: HistorySummary,
}

// ============================================================================
// Templates
// ============================================================================

/// One entry of `GET /api/notifications/templates`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub name: String,
    /// Catalogue label; `None` for templates added through configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_priority: Option<Priority>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<&'static str>,
}

impl TemplateSummary {
    pub fn new(name: &str, info: Option<&NotificationEventTypeInfo>) -> Self {
        Self {
            name: name.to_string(),
            label: info.map(|i| i.label),
            default_priority: info.map(|i| i.default_priority),
            aliases: info.map(|i| i.aliases.to_vec()).unwrap_or_default(),
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct TriggerResponse {
    pub job: String,
    /// `false` when the previous run was still in flight.
    pub started: bool,
}

// ============================================================================
// Logging
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFilterBody {
    pub filter: String,
}

// ============================================================================
// Health
// ============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub components: Vec<ComponentHealth>,
}

/// Component health status.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_query_defaults_and_cap() {
        let query: HistoryQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.effective_limit(), 50);

        let query = HistoryQuery { limit: 10_000 };
        assert_eq!(query.effective_limit(), MAX_HISTORY_LIMIT);
    }

    #[test]
    fn test_template_summary_serialization() {
        let info = crate::notification::notification_event_types()
            .iter()
            .find(|i| i.template_name == "lowStock");
        let json = serde_json::to_value(TemplateSummary::new("lowStock", info)).unwrap();
        assert_eq!(json["label"], "Low Stock");
        assert_eq!(json["defaultPriority"], "high");
        assert!(json["aliases"].as_array().is_some_and(|a| !a.is_empty()));

        let json = serde_json::to_value(TemplateSummary::new("custom", None)).unwrap();
        assert_eq!(json, serde_json::json!({"name": "custom"}));
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "degraded".to_string(),
            version: "0.1.0".to_string(),
            uptime_secs: 3600,
            components: vec![ComponentHealth {
                name: "email".to_string(),
                status: "unavailable".to_string(),
                message: Some("no provider configured".to_string()),
            }],
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("degraded"));
        assert!(json.contains("no provider configured"));
    }
}
