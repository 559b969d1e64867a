//! Notification dispatch core.
//!
//! An event (template name, data, recipients, priority) is resolved to a
//! channel set through the [`ChannelPolicy`], rendered per channel from the
//! shared [`TemplateRegistry`] and delivered concurrently by the
//! [`NotificationDispatcher`]. Every outcome lands in the [`HistoryLog`].
//!
//! # Example
//!
//! ```ignore
//! use logistics_notify::notification::{NotificationDispatcher, NotificationEvent, Priority};
//!
//! let event = NotificationEvent::new("orderStatus", Priority::Low)
//!     .field("orderId", "X1")
//!     .field("status", "Shipped");
//! let delivered = dispatcher.notify(event).await;
//! ```

pub mod channels;
pub mod dispatcher;
pub mod events;
pub mod history;
pub mod policy;
pub mod stats;
pub mod template;

pub use channels::{
    ChannelAdapter, ChannelHealth, ChannelHealthReport, ChannelKind, ChannelRegistry,
    OutboundMessage,
};
pub use dispatcher::{DispatchResult, DispatcherConfig, NotificationDispatcher, UninitializedPolicy};
pub use events::{
    NotificationEvent, NotificationEventTypeInfo, Priority, Recipient, TemplateData, TemplateValue,
    notification_event_types,
};
pub use history::{HistoryEntry, HistoryLog, HistorySummary};
pub use policy::ChannelPolicy;
pub use stats::{
    HttpStatsProvider, StaticStatsProvider, StatsConfig, StatsPeriod, StatsProvider, StatsSnapshot,
};
pub use template::{MessageTemplate, TemplateRegistry};
