//! Built-in recurring jobs: periodic reports and the channel health check.

use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::service::{Scheduler, job_callback};
use crate::notification::{
    NotificationDispatcher, NotificationEvent, Priority, StatsPeriod, StatsProvider,
};
use crate::{Error, Result};

pub const DAILY_REPORT_JOB: &str = "dailyReport";
pub const WEEKLY_REPORT_JOB: &str = "weeklyReport";
pub const MONTHLY_REPORT_JOB: &str = "monthlyReport";
pub const HEALTH_CHECK_JOB: &str = "healthCheck";

/// Cron expression and switch for one built-in job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSchedule {
    pub enabled: bool,
    pub cron: String,
}

impl JobSchedule {
    pub fn new(cron: &str) -> Self {
        Self {
            enabled: true,
            cron: cron.to_string(),
        }
    }
}

impl Default for JobSchedule {
    fn default() -> Self {
        Self {
            enabled: false,
            cron: String::new(),
        }
    }
}

/// Schedules of the built-in jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulesConfig {
    pub daily_report: JobSchedule,
    pub weekly_report: JobSchedule,
    pub monthly_report: JobSchedule,
    pub health_check: JobSchedule,
}

impl Default for SchedulesConfig {
    fn default() -> Self {
        Self {
            daily_report: JobSchedule::new("0 0 8 * * *"),
            weekly_report: JobSchedule::new("0 0 9 * * MON"),
            monthly_report: JobSchedule::new("0 0 9 1 * *"),
            health_check: JobSchedule::new("0 */30 * * * *"),
        }
    }
}

/// Everything the built-in jobs need.
#[derive(Clone)]
pub struct JobContext {
    pub dispatcher: Arc<NotificationDispatcher>,
    pub stats: Arc<dyn StatsProvider>,
    /// Email recipients of reports and alerts.
    pub recipients: Vec<String>,
    pub timezone: Tz,
}

fn report_priority(period: StatsPeriod) -> Priority {
    match period {
        StatsPeriod::Daily | StatsPeriod::Weekly => Priority::Medium,
        StatsPeriod::Monthly => Priority::High,
    }
}

/// Collect statistics for `period` and dispatch the matching report.
pub async fn send_report(ctx: &JobContext, period: StatsPeriod) -> Result<()> {
    let snapshot = ctx.stats.snapshot_or_empty(period).await;
    let now = Utc::now().with_timezone(&ctx.timezone);

    let mut event = NotificationEvent::new(period.template_name(), report_priority(period))
        .recipients(ctx.recipients.iter().cloned());
    event.data = snapshot.to_template_data(period, now);

    let result = ctx.dispatcher.dispatch(&event).await;
    if result.delivered() {
        info!(%period, channels = ?result.succeeded, "Report sent");
        Ok(())
    } else {
        Err(Error::Other(format!(
            "{period} report was not delivered on any channel"
        )))
    }
}

/// Raise a high-priority alert if any channel is not initialized.
///
/// Returns whether an alert was sent; an alert no channel delivered is an
/// error.
pub async fn check_channel_health(ctx: &JobContext) -> Result<bool> {
    let unavailable: Vec<String> = ctx
        .dispatcher
        .registry()
        .health_report()
        .into_iter()
        .filter(|r| !r.health.initialized)
        .map(|r| match r.health.reason {
            Some(reason) => format!("{} ({reason})", r.channel),
            None => r.channel.to_string(),
        })
        .collect();

    if unavailable.is_empty() {
        debug!("All notification channels healthy");
        return Ok(false);
    }

    warn!(channels = ?unavailable, "Notification channels not initialized");
    let event = NotificationEvent::new("systemAlert", Priority::High)
        .field("title", "Notification channels unavailable")
        .field(
            "message",
            format!("Not initialized: {}", unavailable.join(", ")),
        )
        .field(
            "timestamp",
            Utc::now()
                .with_timezone(&ctx.timezone)
                .format("%Y-%m-%d %H:%M:%S %Z")
                .to_string(),
        )
        .recipients(ctx.recipients.iter().cloned());

    let result = ctx.dispatcher.dispatch(&event).await;
    if result.delivered() {
        info!(channels = ?result.succeeded, "Channel health alert sent");
        Ok(true)
    } else {
        Err(Error::Other(
            "channel health alert was not delivered on any channel".to_string(),
        ))
    }
}

/// Register every enabled built-in job.
///
/// A job with an invalid expression is logged and left out; the others are
/// still registered. Returns the names that were scheduled.
pub fn register_builtin_jobs(
    scheduler: &Scheduler,
    config: &SchedulesConfig,
    ctx: JobContext,
) -> Vec<&'static str> {
    let reports = [
        (DAILY_REPORT_JOB, &config.daily_report, StatsPeriod::Daily),
        (WEEKLY_REPORT_JOB, &config.weekly_report, StatsPeriod::Weekly),
        (MONTHLY_REPORT_JOB, &config.monthly_report, StatsPeriod::Monthly),
    ];

    let mut scheduled = Vec::new();
    for (name, schedule, period) in reports {
        if !schedule.enabled {
            debug!(job = name, "Job disabled");
            continue;
        }
        let ctx = ctx.clone();
        let callback = job_callback(move || {
            let ctx = ctx.clone();
            async move { send_report(&ctx, period).await }
        });
        match scheduler.schedule(name, &schedule.cron, callback) {
            Ok(()) => scheduled.push(name),
            Err(e) => warn!(job = name, error = %e, "Failed to schedule job"),
        }
    }

    if config.health_check.enabled {
        let callback = job_callback(move || {
            let ctx = ctx.clone();
            async move { check_channel_health(&ctx).await.map(|_| ()) }
        });
        match scheduler.schedule(HEALTH_CHECK_JOB, &config.health_check.cron, callback) {
            Ok(()) => scheduled.push(HEALTH_CHECK_JOB),
            Err(e) => warn!(job = HEALTH_CHECK_JOB, error = %e, "Failed to schedule job"),
        }
    }

    info!(jobs = ?scheduled, "Built-in jobs registered");
    scheduled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::channels::testing::{Behavior, TestAdapter};
    use crate::notification::{
        ChannelKind, ChannelPolicy, ChannelRegistry, DispatcherConfig, HistoryLog,
        StaticStatsProvider, StatsSnapshot, TemplateRegistry,
    };

    fn context(email: Arc<TestAdapter>, push: Arc<TestAdapter>) -> JobContext {
        context_with_chat(
            TestAdapter::new(ChannelKind::Chat, Behavior::Succeed),
            email,
            push,
        )
    }

    fn context_with_chat(
        chat: Arc<TestAdapter>,
        email: Arc<TestAdapter>,
        push: Arc<TestAdapter>,
    ) -> JobContext {
        let registry = ChannelRegistry::new().with(chat).with(email).with(push);
        let dispatcher = NotificationDispatcher::new(
            ChannelPolicy::default(),
            TemplateRegistry::with_builtins(),
            registry,
            Arc::new(HistoryLog::new()),
            DispatcherConfig::default(),
        )
        .unwrap();
        JobContext {
            dispatcher: Arc::new(dispatcher),
            stats: Arc::new(StaticStatsProvider::new(StatsSnapshot {
                total_orders: Some(120),
                delayed_deliveries: Some(4),
                ..Default::default()
            })),
            recipients: vec!["manager@example.com".to_string()],
            timezone: chrono_tz::UTC,
        }
    }

    #[tokio::test]
    async fn test_monthly_report_is_high_priority_with_email() {
        let email = TestAdapter::new(ChannelKind::Email, Behavior::Succeed);
        let push = TestAdapter::new(ChannelKind::Push, Behavior::Succeed);
        let ctx = context(email.clone(), push.clone());

        send_report(&ctx, StatsPeriod::Monthly).await.unwrap();

        assert_eq!(email.call_count(), 1);
        let sent = push.sent.lock();
        assert_eq!(sent[0].1.priority, Priority::High);
        assert_eq!(
            sent[0].1.body,
            "Monthly logistics summary: 120 orders, 4 delayed"
        );
    }

    #[tokio::test]
    async fn test_daily_report_skips_email() {
        let email = TestAdapter::new(ChannelKind::Email, Behavior::Succeed);
        let push = TestAdapter::new(ChannelKind::Push, Behavior::Succeed);
        let ctx = context(email.clone(), push);

        send_report(&ctx, StatsPeriod::Daily).await.unwrap();
        assert_eq!(email.call_count(), 0);
        assert_eq!(ctx.dispatcher.history().len(), 1);
    }

    #[tokio::test]
    async fn test_undelivered_report_is_an_error() {
        let registry = ChannelRegistry::new()
            .with(TestAdapter::new(ChannelKind::Chat, Behavior::Fail))
            .with(TestAdapter::new(ChannelKind::Email, Behavior::Fail))
            .with(TestAdapter::new(ChannelKind::Push, Behavior::Fail));
        let mut ctx = context(
            TestAdapter::new(ChannelKind::Email, Behavior::Fail),
            TestAdapter::new(ChannelKind::Push, Behavior::Fail),
        );
        ctx.dispatcher = Arc::new(
            NotificationDispatcher::new(
                ChannelPolicy::default(),
                TemplateRegistry::with_builtins(),
                registry,
                Arc::new(HistoryLog::new()),
                DispatcherConfig::default(),
            )
            .unwrap(),
        );
        assert!(send_report(&ctx, StatsPeriod::Weekly).await.is_err());
    }

    #[tokio::test]
    async fn test_health_check_alerts_on_uninitialized_channel() {
        let email = TestAdapter::uninitialized(ChannelKind::Email);
        let push = TestAdapter::new(ChannelKind::Push, Behavior::Succeed);
        let ctx = context(email.clone(), push.clone());

        assert!(check_channel_health(&ctx).await.unwrap());

        assert_eq!(email.call_count(), 0);
        let sent = push.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.event_name, "systemAlert");
        assert_eq!(sent[0].1.priority, Priority::High);
        assert!(sent[0].1.body.contains("email (test adapter disabled)"));
    }

    #[tokio::test]
    async fn test_undelivered_health_alert_is_an_error() {
        let chat = TestAdapter::new(ChannelKind::Chat, Behavior::Fail);
        let push = TestAdapter::new(ChannelKind::Push, Behavior::Fail);
        let ctx = context_with_chat(
            chat.clone(),
            TestAdapter::uninitialized(ChannelKind::Email),
            push.clone(),
        );

        assert!(check_channel_health(&ctx).await.is_err());
        assert_eq!(chat.call_count(), 1);
        assert_eq!(push.call_count(), 1);
        assert_eq!(ctx.dispatcher.history().len(), 1);
    }

    #[tokio::test]
    async fn test_health_check_quiet_when_healthy() {
        let ctx = context(
            TestAdapter::new(ChannelKind::Email, Behavior::Succeed),
            TestAdapter::new(ChannelKind::Push, Behavior::Succeed),
        );
        assert!(!check_channel_health(&ctx).await.unwrap());
        assert!(ctx.dispatcher.history().is_empty());
    }

    #[tokio::test]
    async fn test_register_builtin_jobs_survives_invalid_cron() {
        let scheduler = Scheduler::new(chrono_tz::UTC);
        let ctx = context(
            TestAdapter::new(ChannelKind::Email, Behavior::Succeed),
            TestAdapter::new(ChannelKind::Push, Behavior::Succeed),
        );
        let config = SchedulesConfig {
            daily_report: JobSchedule::new("not a cron"),
            monthly_report: JobSchedule {
                enabled: false,
                ..JobSchedule::new("0 0 9 1 * *")
            },
            ..Default::default()
        };

        let scheduled = register_builtin_jobs(&scheduler, &config, ctx);

        assert_eq!(scheduled, vec![WEEKLY_REPORT_JOB, HEALTH_CHECK_JOB]);
        let status = scheduler.status();
        assert_eq!(status.len(), 2);
        assert!(status.iter().all(|s| s.is_running()));
    }
}
