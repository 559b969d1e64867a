//! Inbound bot commands.
//!
//! Updates posted by the chat provider are parsed into a [`ChatCommand`] and
//! routed to the [`CommandHandler`] registered for it. Replies go back to the
//! originating chat through the chat channel's transport. This path is
//! independent of outbound dispatch.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::ChatTransport;
use crate::notification::channels::ChannelRegistry;
use crate::notification::history::HistoryLog;
use crate::notification::stats::{StatsPeriod, StatsProvider};
use crate::notification::template::{self, escape_html};
use crate::scheduler::{JobState, Scheduler};
use crate::{Error, Result};

const STATS_TEMPLATE: &str = "<b>{{title}}</b>\nPeriod: {{period}}\n\
Orders: {{totalOrders}} (delivered {{deliveredOrders}}, pending {{pendingOrders}})\n\
In transit: {{shipmentsInTransit}}\nDelayed: {{delayedDeliveries}}\n\
Low stock: {{lowStockItems}}\nRevenue: {{revenue}}";

/// Commands the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatCommand {
    Start,
    Help,
    Status,
    Stats,
}

impl ChatCommand {
    pub const ALL: [ChatCommand; 4] = [Self::Start, Self::Help, Self::Status, Self::Stats];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Status => "status",
            Self::Stats => "stats",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Start => "Register this chat and show a welcome message",
            Self::Help => "List available commands",
            Self::Status => "Channel health, recent deliveries and scheduled jobs",
            Self::Stats => "Logistics figures (daily, weekly or monthly)",
        }
    }
}

impl fmt::Display for ChatCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.as_str())
    }
}

impl FromStr for ChatCommand {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "help" => Ok(Self::Help),
            "status" => Ok(Self::Status),
            "stats" | "statistics" => Ok(Self::Stats),
            other => Err(Error::validation(format!("Unknown command: /{other}"))),
        }
    }
}

/// A command token extracted from message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Token without the leading `/` or `@bot` suffix, lowercased.
    pub token: String,
    pub args: Vec<String>,
}

/// Extract `/command[@bot] args...` from message text.
pub fn parse_command(text: &str) -> Option<ParsedCommand> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?.strip_prefix('/')?;
    let token = head.split('@').next().unwrap_or(head);
    if token.is_empty() {
        return None;
    }
    Some(ParsedCommand {
        token: token.to_ascii_lowercase(),
        args: parts.map(str::to_string).collect(),
    })
}

/// Inbound update as posted by the Telegram webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatUpdate {
    #[serde(default)]
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: ChatRef,
    pub from: Option<ChatUser>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRef {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatUser {
    pub username: Option<String>,
    pub first_name: Option<String>,
}

/// A parsed command together with where it came from.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub chat_id: String,
    pub username: Option<String>,
    pub command: ChatCommand,
    pub args: Vec<String>,
}

/// Produces the reply text for one command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, request: &CommandRequest) -> Result<String>;
}

/// Shared state the built-in handlers read from.
#[derive(Clone)]
pub struct CommandContext {
    pub registry: ChannelRegistry,
    pub history: Arc<HistoryLog>,
    pub scheduler: Option<Arc<Scheduler>>,
    pub stats: Arc<dyn StatsProvider>,
    pub timezone: Tz,
}

struct StartHandler;

#[async_trait]
impl CommandHandler for StartHandler {
    async fn handle(&self, request: &CommandRequest) -> Result<String> {
        let name = request.username.as_deref().unwrap_or("there");
        Ok(format!(
            "Hello {}! This chat receives logistics notifications.\n\
             Your chat id is <code>{}</code>. Send /help for commands.",
            escape_html(name),
            escape_html(&request.chat_id)
        ))
    }
}

struct HelpHandler;

#[async_trait]
impl CommandHandler for HelpHandler {
    async fn handle(&self, _request: &CommandRequest) -> Result<String> {
        let mut text = String::from("<b>Available commands</b>");
        for command in ChatCommand::ALL {
            text.push_str(&format!("\n{command} - {}", command.description()));
        }
        Ok(text)
    }
}

struct StatusHandler {
    context: CommandContext,
}

#[async_trait]
impl CommandHandler for StatusHandler {
    async fn handle(&self, _request: &CommandRequest) -> Result<String> {
        let ctx = &self.context;
        let mut text = String::from("<b>System status</b>\n\nChannels:");
        for report in ctx.registry.health_report() {
            match (report.health.initialized, report.health.reason.as_deref()) {
                (true, _) => text.push_str(&format!("\n\u{2705} {}", report.channel)),
                (false, reason) => text.push_str(&format!(
                    "\n\u{274c} {} ({})",
                    report.channel,
                    escape_html(reason.unwrap_or("not initialized"))
                )),
            }
        }

        let summary = ctx.history.summary();
        text.push_str(&format!(
            "\n\nNotifications: {} recorded, {} delivered",
            summary.retained, summary.delivered
        ));
        if let Some(last) = summary.last_dispatch_at {
            text.push_str(&format!(
                "\nLast dispatch: {}",
                last.with_timezone(&ctx.timezone).format("%Y-%m-%d %H:%M %Z")
            ));
        }

        if let Some(scheduler) = &ctx.scheduler {
            text.push_str("\n\nScheduled jobs:");
            let jobs = scheduler.status();
            if jobs.is_empty() {
                text.push_str("\nnone");
            }
            for job in jobs {
                let state = match job.state {
                    JobState::Scheduled => "running",
                    JobState::Stopped => "stopped",
                };
                let next = job
                    .next_run
                    .map(|t| {
                        t.with_timezone(&ctx.timezone)
                            .format(", next %Y-%m-%d %H:%M")
                            .to_string()
                    })
                    .unwrap_or_default();
                text.push_str(&format!("\n{}: {state}{next}", escape_html(&job.name)));
            }
        }
        Ok(text)
    }
}

struct StatsHandler {
    stats: Arc<dyn StatsProvider>,
    timezone: Tz,
}

#[async_trait]
impl CommandHandler for StatsHandler {
    async fn handle(&self, request: &CommandRequest) -> Result<String> {
        let period = match request.args.first().map(|a| a.to_ascii_lowercase()) {
            None => StatsPeriod::Daily,
            Some(arg) => match arg.as_str() {
                "day" | "daily" | "today" => StatsPeriod::Daily,
                "week" | "weekly" => StatsPeriod::Weekly,
                "month" | "monthly" => StatsPeriod::Monthly,
                other => {
                    return Err(Error::validation(format!(
                        "Unknown period '{other}', use daily, weekly or monthly"
                    )));
                }
            },
        };
        let snapshot = self.stats.snapshot_or_empty(period).await;
        let now = chrono::Utc::now().with_timezone(&self.timezone);
        Ok(template::render_html(
            STATS_TEMPLATE,
            &snapshot.to_template_data(period, now),
        ))
    }
}

/// Routes inbound commands to their handlers and sends the replies.
pub struct CommandRouter {
    transport: Option<Arc<dyn ChatTransport>>,
    handlers: HashMap<ChatCommand, Arc<dyn CommandHandler>>,
}

impl CommandRouter {
    /// A router with no handlers.
    pub fn new(transport: Option<Arc<dyn ChatTransport>>) -> Self {
        Self {
            transport,
            handlers: HashMap::new(),
        }
    }

    /// A router with the built-in handlers for every [`ChatCommand`].
    pub fn with_defaults(transport: Option<Arc<dyn ChatTransport>>, context: CommandContext) -> Self {
        let timezone = context.timezone;
        let stats = context.stats.clone();
        Self::new(transport)
            .with_handler(ChatCommand::Start, Arc::new(StartHandler))
            .with_handler(ChatCommand::Help, Arc::new(HelpHandler))
            .with_handler(ChatCommand::Status, Arc::new(StatusHandler { context }))
            .with_handler(ChatCommand::Stats, Arc::new(StatsHandler { stats, timezone }))
    }

    /// Register (or replace) the handler for a command.
    pub fn with_handler(mut self, command: ChatCommand, handler: Arc<dyn CommandHandler>) -> Self {
        self.handlers.insert(command, handler);
        self
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Produce the reply for a command without sending it.
    pub async fn dispatch(&self, request: &CommandRequest) -> String {
        let Some(handler) = self.handlers.get(&request.command) else {
            return format!("{} is not available. Send /help for commands.", request.command);
        };
        match handler.handle(request).await {
            Ok(reply) => reply,
            Err(Error::Validation(msg)) => escape_html(&msg),
            Err(e) => {
                warn!(command = %request.command, error = %e, "Chat command failed");
                format!("{} failed, please try again later.", request.command)
            }
        }
    }

    /// Handle one inbound update; returns the reply, if any.
    ///
    /// Messages that are not commands are ignored. A failed reply send is
    /// logged and does not fail the update.
    pub async fn handle_update(&self, update: &ChatUpdate) -> Option<String> {
        let message = update.message.as_ref()?;
        let text = message.text.as_deref()?;
        let parsed = parse_command(text)?;
        let chat_id = message.chat.id.to_string();

        let reply = match parsed.token.parse::<ChatCommand>() {
            Ok(command) => {
                let request = CommandRequest {
                    chat_id: chat_id.clone(),
                    username: message
                        .from
                        .as_ref()
                        .and_then(|u| u.username.clone().or_else(|| u.first_name.clone())),
                    command,
                    args: parsed.args,
                };
                info!(command = %command, chat_id = %chat_id, "Handling chat command");
                self.dispatch(&request).await
            }
            Err(_) => {
                debug!(token = %parsed.token, chat_id = %chat_id, "Unknown chat command");
                format!(
                    "Unknown command /{}. Send /help for commands.",
                    escape_html(&parsed.token)
                )
            }
        };

        match &self.transport {
            Some(transport) => {
                if let Err(e) = transport.send_message(&chat_id, &reply).await {
                    warn!(
                        channel = "chat",
                        destination = %chat_id,
                        error = %e,
                        "Failed to send command reply"
                    );
                }
            }
            None => debug!("Chat transport not initialized, reply not sent"),
        }
        Some(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::RecordingChatTransport;
    use super::*;
    use crate::notification::channels::ChannelKind;
    use crate::notification::channels::testing::{Behavior, TestAdapter};
    use crate::notification::stats::{StaticStatsProvider, StatsSnapshot};

    fn context() -> CommandContext {
        CommandContext {
            registry: ChannelRegistry::new()
                .with(TestAdapter::new(ChannelKind::Chat, Behavior::Succeed))
                .with(TestAdapter::uninitialized(ChannelKind::Email)),
            history: Arc::new(HistoryLog::new()),
            scheduler: None,
            stats: Arc::new(StaticStatsProvider::new(StatsSnapshot {
                total_orders: Some(17),
                ..Default::default()
            })),
            timezone: chrono_tz::UTC,
        }
    }

    fn update(text: &str) -> ChatUpdate {
        serde_json::from_value(serde_json::json!({
            "update_id": 1,
            "message": {
                "chat": {"id": 4242},
                "from": {"username": "dispatcher_anna"},
                "text": text,
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(
            parse_command("/Stats@LogisticsBot weekly"),
            Some(ParsedCommand {
                token: "stats".into(),
                args: vec!["weekly".into()]
            })
        );
        assert_eq!(parse_command("hello /start"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_command_from_str() {
        assert_eq!("STATUS".parse::<ChatCommand>().unwrap(), ChatCommand::Status);
        assert!("deploy".parse::<ChatCommand>().is_err());
    }

    #[tokio::test]
    async fn test_reply_goes_to_originating_chat() {
        let transport = Arc::new(RecordingChatTransport::default());
        let router = CommandRouter::with_defaults(Some(transport.clone()), context());

        let reply = router.handle_update(&update("/start")).await.unwrap();

        assert!(reply.contains("dispatcher_anna"));
        let sent = transport.messages.lock().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "4242");
    }

    #[tokio::test]
    async fn test_help_lists_every_command() {
        let router = CommandRouter::with_defaults(None, context());
        let reply = router.handle_update(&update("/help")).await.unwrap();
        for command in ChatCommand::ALL {
            assert!(reply.contains(&command.to_string()));
        }
    }

    #[tokio::test]
    async fn test_status_reports_channel_health() {
        let router = CommandRouter::with_defaults(None, context());
        let reply = router.handle_update(&update("/status")).await.unwrap();
        assert!(reply.contains("chat"));
        assert!(reply.contains("email (test adapter disabled)"));
        assert!(reply.contains("0 recorded"));
    }

    #[tokio::test]
    async fn test_stats_renders_snapshot() {
        let router = CommandRouter::with_defaults(None, context());
        let reply = router.handle_update(&update("/stats weekly")).await.unwrap();
        assert!(reply.contains("Weekly logistics summary"));
        assert!(reply.contains("Orders: 17"));
        assert!(reply.contains("Revenue: N/A"));

        let bad = router.handle_update(&update("/stats yearly")).await.unwrap();
        assert!(bad.contains("Unknown period"));
    }

    #[tokio::test]
    async fn test_unknown_command_gets_hint() {
        let transport = Arc::new(RecordingChatTransport::default());
        let router = CommandRouter::with_defaults(Some(transport.clone()), context());
        let reply = router.handle_update(&update("/deploy now")).await.unwrap();
        assert!(reply.contains("/help"));
        assert_eq!(transport.texts().len(), 1);
    }

    #[tokio::test]
    async fn test_plain_text_is_ignored() {
        let transport = Arc::new(RecordingChatTransport::default());
        let router = CommandRouter::with_defaults(Some(transport.clone()), context());
        assert!(router.handle_update(&update("thanks!")).await.is_none());
        assert!(transport.texts().is_empty());
    }

    #[tokio::test]
    async fn test_reply_send_failure_does_not_fail_update() {
        let transport = Arc::new(RecordingChatTransport::failing());
        let router = CommandRouter::with_defaults(Some(transport), context());
        assert!(router.handle_update(&update("/help")).await.is_some());
    }

    #[tokio::test]
    async fn test_unregistered_handler() {
        let router = CommandRouter::new(None).with_handler(ChatCommand::Help, Arc::new(HelpHandler));
        let reply = router.handle_update(&update("/stats")).await.unwrap();
        assert!(reply.contains("/stats is not available"));
    }
}
