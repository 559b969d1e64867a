//! End-to-end dispatch, scheduling and history behavior.

mod common;

use std::sync::Arc;

use logistics_notify::notification::{
    ChannelKind, ChannelPolicy, ChannelRegistry, DispatcherConfig, HistoryEntry, HistoryLog,
    NotificationDispatcher, NotificationEvent, Priority, TemplateRegistry,
};
use logistics_notify::scheduler::{Scheduler, job_callback};

use common::StubAdapter;

fn dispatcher(registry: ChannelRegistry) -> NotificationDispatcher {
    NotificationDispatcher::new(
        ChannelPolicy::default(),
        TemplateRegistry::with_builtins(),
        registry,
        Arc::new(HistoryLog::new()),
        DispatcherConfig::default(),
    )
    .expect("default policy is valid")
}

#[tokio::test]
async fn low_priority_order_status_goes_to_push_only() {
    let chat = StubAdapter::succeeding(ChannelKind::Chat);
    let email = StubAdapter::succeeding(ChannelKind::Email);
    let push = StubAdapter::succeeding(ChannelKind::Push);
    let dispatcher = dispatcher(
        ChannelRegistry::new()
            .with(chat.clone())
            .with(email.clone())
            .with(push.clone()),
    );

    let event: NotificationEvent = serde_json::from_str(
        r#"{"templateName":"orderStatus","data":{"orderId":"X1","status":"Shipped"},"recipients":[],"priority":"low"}"#,
    )
    .unwrap();
    let result = dispatcher.dispatch(&event).await;

    assert_eq!(result.succeeded, [ChannelKind::Push].into());
    assert!(result.failed.is_empty());
    assert_eq!(chat.call_count(), 0);
    assert_eq!(email.call_count(), 0);
    assert_eq!(push.sent.lock()[0].body, "Order X1: Shipped");
}

#[tokio::test]
async fn high_priority_skips_uninitialized_email() {
    let email = StubAdapter::uninitialized(ChannelKind::Email);
    let dispatcher = dispatcher(
        ChannelRegistry::new()
            .with(StubAdapter::succeeding(ChannelKind::Chat))
            .with(email.clone())
            .with(StubAdapter::failing(ChannelKind::Push)),
    );

    let event = NotificationEvent::new("lowStock", Priority::High)
        .field("product", "Pallet wrap")
        .field("quantity", 3_i64)
        .recipient("warehouse@example.com");

    let result = dispatcher.dispatch(&event).await;
    assert_eq!(result.succeeded, [ChannelKind::Chat].into());
    assert_eq!(result.failed, [ChannelKind::Push].into());
    assert_eq!(email.call_count(), 0);

    assert!(dispatcher.notify(event).await);
    assert_eq!(dispatcher.history().len(), 2);
}

#[tokio::test]
async fn invalid_cron_leaves_other_jobs_running() {
    let scheduler = Scheduler::new(chrono_tz::UTC);
    let noop = job_callback(|| async { Ok(()) });

    scheduler
        .schedule("weeklyReport", "0 0 9 * * MON", noop.clone())
        .unwrap();
    scheduler.schedule("healthCheck", "*/30 * * * *", noop.clone()).unwrap();
    assert!(scheduler.schedule("dailyReport", "every morning", noop).is_err());

    let status = scheduler.status();
    assert_eq!(status.len(), 2);
    assert!(status.iter().all(|s| s.is_running()));
    assert!(!scheduler.is_scheduled("dailyReport"));

    scheduler.shutdown();
}

#[test]
fn history_keeps_the_newest_thousand_entries() {
    let history = HistoryLog::new();
    let result = logistics_notify::notification::DispatchResult::new();

    for i in 0..1001_u64 {
        let event = NotificationEvent::new("newOrder", Priority::Low).field("orderId", i);
        history.append(HistoryEntry::new(&event, result.clone()));
    }

    assert_eq!(history.len(), 1000);
    let recent = history.recent(1000);
    assert_eq!(recent.len(), 1000);
    assert_eq!(
        recent[0].data.get("orderId").map(|v| v.to_string()),
        Some("1000".to_string())
    );
    assert_eq!(
        recent[999].data.get("orderId").map(|v| v.to_string()),
        Some("1".to_string())
    );
    assert_eq!(history.summary().total_appended, 1001);
}
