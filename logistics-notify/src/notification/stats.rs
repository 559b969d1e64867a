//! Domain statistics for the periodic reports and the chat `/stats` command.
//!
//! The figures live in the main application backend; [`HttpStatsProvider`]
//! pulls them from its stats endpoint. A missing figure renders as `N/A`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::events::{TemplateData, TemplateValue};
use crate::utils::http_client;
use crate::{Error, Result};

const DEFAULT_STATS_TIMEOUT_MS: u64 = 5_000;

/// Reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl StatsPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// Report template used for this period.
    pub fn template_name(&self) -> &'static str {
        match self {
            Self::Daily => "dailyReport",
            Self::Weekly => "weeklyReport",
            Self::Monthly => "monthlyReport",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::Daily => "Daily logistics summary",
            Self::Weekly => "Weekly logistics summary",
            Self::Monthly => "Monthly logistics summary",
        }
    }
}

impl fmt::Display for StatsPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate logistics figures for one period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_orders: Option<u64>,
    pub delivered_orders: Option<u64>,
    pub pending_orders: Option<u64>,
    pub shipments_in_transit: Option<u64>,
    pub delayed_deliveries: Option<u64>,
    pub low_stock_items: Option<u64>,
    pub revenue: Option<f64>,
}

impl StatsSnapshot {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Template data for a report; absent figures are left out.
    pub fn to_template_data(&self, period: StatsPeriod, now: DateTime<Tz>) -> TemplateData {
        let mut data = TemplateData::new();
        data.insert("title".into(), period.title().into());
        data.insert("period".into(), period_label(period, now).into());
        data.insert("date".into(), now.format("%Y-%m-%d").to_string().into());

        let counts = [
            ("totalOrders", self.total_orders),
            ("deliveredOrders", self.delivered_orders),
            ("pendingOrders", self.pending_orders),
            ("shipmentsInTransit", self.shipments_in_transit),
            ("delayedDeliveries", self.delayed_deliveries),
            ("lowStockItems", self.low_stock_items),
        ];
        for (key, value) in counts {
            if let Some(value) = value {
                data.insert(key.to_string(), value.into());
            }
        }
        if let Some(revenue) = self.revenue {
            data.insert(
                "revenue".to_string(),
                TemplateValue::Text(format!("{revenue:.2}")),
            );
        }
        data
    }
}

fn period_label(period: StatsPeriod, now: DateTime<Tz>) -> String {
    match period {
        StatsPeriod::Daily => now.format("%Y-%m-%d").to_string(),
        StatsPeriod::Weekly => now.format("%G-W%V").to_string(),
        StatsPeriod::Monthly => now.format("%B %Y").to_string(),
    }
}

/// Source of domain statistics.
#[async_trait]
pub trait StatsProvider: Send + Sync {
    async fn snapshot(&self, period: StatsPeriod) -> Result<StatsSnapshot>;

    /// Like [`snapshot`](Self::snapshot), but degrades to an empty snapshot.
    async fn snapshot_or_empty(&self, period: StatsPeriod) -> StatsSnapshot {
        match self.snapshot(period).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(%period, error = %e, "Failed to collect statistics, reporting without figures");
                StatsSnapshot::default()
            }
        }
    }
}

/// Stats source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Backend stats endpoint; `?period=` is appended. Empty disables fetching.
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_ms: DEFAULT_STATS_TIMEOUT_MS,
        }
    }
}

/// Fetches statistics from the application backend over HTTP.
pub struct HttpStatsProvider {
    client: Client,
    url: String,
}

impl HttpStatsProvider {
    pub fn new(config: &StatsConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(Error::config("stats url is empty"));
        }
        Ok(Self {
            client: http_client::build_client(
                "stats",
                Duration::from_millis(config.timeout_ms.max(1)),
            )?,
            url: config.url.trim().to_string(),
        })
    }
}

#[async_trait]
impl StatsProvider for HttpStatsProvider {
    async fn snapshot(&self, period: StatsPeriod) -> Result<StatsSnapshot> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("period", period.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ApiError(format!(
                "stats endpoint returned {status}"
            )));
        }

        let snapshot: StatsSnapshot = response.json().await?;
        debug!(%period, ?snapshot, "Fetched statistics");
        Ok(snapshot)
    }
}

/// Returns the same snapshot for every period.
#[derive(Debug, Clone, Default)]
pub struct StaticStatsProvider {
    snapshot: StatsSnapshot,
}

impl StaticStatsProvider {
    pub fn new(snapshot: StatsSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl StatsProvider for StaticStatsProvider {
    async fn snapshot(&self, _period: StatsPeriod) -> Result<StatsSnapshot> {
        Ok(self.snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::notification::template::{TemplateRegistry, render};
    use crate::notification::channels::ChannelKind;

    struct FailingStats;

    #[async_trait]
    impl StatsProvider for FailingStats {
        async fn snapshot(&self, _period: StatsPeriod) -> Result<StatsSnapshot> {
            Err(Error::ApiError("backend down".into()))
        }
    }

    fn now() -> DateTime<Tz> {
        chrono_tz::UTC.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_snapshot_to_template_data() {
        let snapshot = StatsSnapshot {
            total_orders: Some(42),
            delayed_deliveries: Some(3),
            revenue: Some(1234.5),
            ..Default::default()
        };
        let data = snapshot.to_template_data(StatsPeriod::Daily, now());

        assert_eq!(data["totalOrders"].to_string(), "42");
        assert_eq!(data["revenue"].to_string(), "1234.50");
        assert_eq!(data["date"].to_string(), "2026-03-02");
        assert!(!data.contains_key("pendingOrders"));
    }

    #[test]
    fn test_period_labels() {
        assert_eq!(period_label(StatsPeriod::Weekly, now()), "2026-W10");
        assert_eq!(period_label(StatsPeriod::Monthly, now()), "March 2026");
    }

    #[test]
    fn test_empty_snapshot_renders_fallbacks() {
        let templates = TemplateRegistry::with_builtins();
        let body = templates
            .body(StatsPeriod::Monthly.template_name(), ChannelKind::Push)
            .unwrap();
        let data = StatsSnapshot::default().to_template_data(StatsPeriod::Monthly, now());
        assert_eq!(
            render(body, &data),
            "Monthly logistics summary: N/A orders, N/A delayed"
        );
    }

    #[test]
    fn test_snapshot_deserializes_partial_json() {
        let snapshot: StatsSnapshot =
            serde_json::from_str(r#"{"totalOrders": 10, "lowStockItems": 2}"#).unwrap();
        assert_eq!(snapshot.total_orders, Some(10));
        assert_eq!(snapshot.low_stock_items, Some(2));
        assert!(snapshot.revenue.is_none());
    }

    #[tokio::test]
    async fn test_failure_degrades_to_empty_snapshot() {
        let snapshot = FailingStats.snapshot_or_empty(StatsPeriod::Daily).await;
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_http_provider_requires_url() {
        assert!(HttpStatsProvider::new(&StatsConfig::default()).is_err());
        let config = StatsConfig {
            url: "http://localhost:3001/api/stats".into(),
            ..Default::default()
        };
        assert!(HttpStatsProvider::new(&config).is_ok());
    }
}
