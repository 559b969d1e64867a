//! Service container for dependency injection.
//!
//! The ServiceContainer holds references to all application services
//! and manages their lifecycle.

use std::sync::Arc;

use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::Result;
use crate::api::server::AppState;
use crate::config::AppConfig;
use crate::logging::LoggingConfig;
use crate::notification::channels::chat::commands::{CommandContext, CommandRouter};
use crate::notification::channels::{ChatAdapter, ChatTransport, EmailAdapter, PushAdapter, PushHub};
use crate::notification::{
    ChannelRegistry, HistoryLog, HttpStatsProvider, NotificationDispatcher, StaticStatsProvider,
    StatsProvider, StatsSnapshot,
};
use crate::scheduler::{JobContext, Scheduler, register_builtin_jobs};

/// Service container holding all application services.
pub struct ServiceContainer {
    config: AppConfig,
    timezone: Tz,
    /// Realtime hub behind the push channel.
    pub push_hub: Arc<PushHub>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub scheduler: Arc<Scheduler>,
    pub stats: Arc<dyn StatsProvider>,
    /// Inbound chat command router.
    pub command_router: Arc<CommandRouter>,
    /// Cancellation token for graceful shutdown.
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Build every service from configuration, standing up the real channel
    /// adapters. Channels with missing credentials come up uninitialized.
    pub fn new(config: AppConfig) -> Result<Self> {
        let push_hub = Arc::new(PushHub::new(config.push.capacity));

        let chat = ChatAdapter::initialize(config.chat.clone());
        let chat_transport = chat.transport();
        let email = EmailAdapter::initialize(config.email.clone());
        let push = PushAdapter::initialize(config.push.clone(), push_hub.clone());

        let registry = ChannelRegistry::new()
            .with(Arc::new(chat))
            .with(Arc::new(email))
            .with(Arc::new(push));

        Self::with_channels(config, registry, push_hub, chat_transport)
    }

    /// Build the services around an existing channel registry.
    pub fn with_channels(
        config: AppConfig,
        registry: ChannelRegistry,
        push_hub: Arc<PushHub>,
        chat_transport: Option<Arc<dyn ChatTransport>>,
    ) -> Result<Self> {
        let timezone = config.tz()?;
        let history = Arc::new(HistoryLog::with_capacity(config.history_capacity));

        let dispatcher = Arc::new(NotificationDispatcher::new(
            config.policy.clone(),
            config.template_registry(),
            registry.clone(),
            history.clone(),
            config.dispatcher.clone(),
        )?);

        let stats: Arc<dyn StatsProvider> = if config.stats.url.trim().is_empty() {
            debug!("No stats url configured, reports render without figures");
            Arc::new(StaticStatsProvider::new(StatsSnapshot::default()))
        } else {
            Arc::new(HttpStatsProvider::new(&config.stats)?)
        };

        let cancellation_token = CancellationToken::new();
        let scheduler = Arc::new(Scheduler::with_cancellation(
            timezone,
            cancellation_token.clone(),
        ));

        let command_router = Arc::new(CommandRouter::with_defaults(
            chat_transport,
            CommandContext {
                registry,
                history,
                scheduler: Some(scheduler.clone()),
                stats: stats.clone(),
                timezone,
            },
        ));

        Ok(Self {
            config,
            timezone,
            push_hub,
            dispatcher,
            scheduler,
            stats,
            command_router,
            cancellation_token,
        })
    }

    /// Register the built-in jobs. Returns the names that were scheduled.
    pub fn start(&self) -> Vec<&'static str> {
        let ctx = JobContext {
            dispatcher: self.dispatcher.clone(),
            stats: self.stats.clone(),
            recipients: self.config.report_recipients.clone(),
            timezone: self.timezone,
        };
        let scheduled = register_builtin_jobs(&self.scheduler, &self.config.schedules, ctx);

        let uninitialized = self.dispatcher.registry().uninitialized();
        info!(
            timezone = %self.timezone,
            jobs = scheduled.len(),
            uninitialized = ?uninitialized,
            "Services started"
        );
        scheduled
    }

    /// Shared state for the API server.
    pub fn app_state(&self, logging_config: Option<Arc<LoggingConfig>>) -> AppState {
        let mut state = AppState::new(self.dispatcher.clone())
            .with_scheduler(self.scheduler.clone())
            .with_push_hub(self.push_hub.clone())
            .with_command_router(self.command_router.clone(), &self.config.chat.webhook_secret);
        if let Some(logging_config) = logging_config {
            state = state.with_logging_config(logging_config);
        }
        state
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Stop every scheduled job. In-flight sends are not interrupted.
    pub fn shutdown(&self) {
        info!("Shutting down services");
        self.scheduler.shutdown();
        self.cancellation_token.cancel();
        info!("Services shut down");
    }

    /// Get the cancellation token for external use.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Check if shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
