//! Priority to channel-set policy.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::channels::{ChannelKind, ChannelRegistry};
use super::events::Priority;
use crate::{Error, Result};

/// Maps each priority to the ordered set of channels it is delivered on.
///
/// Priorities without an entry use the `medium` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelPolicy {
    table: HashMap<Priority, Vec<ChannelKind>>,
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self::new()
            .with(
                Priority::High,
                [ChannelKind::Chat, ChannelKind::Email, ChannelKind::Push],
            )
            .with(Priority::Medium, [ChannelKind::Chat, ChannelKind::Push])
            .with(Priority::Low, [ChannelKind::Push])
    }
}

impl ChannelPolicy {
    /// An empty policy.
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Set the channels for a priority; duplicates are dropped, order kept.
    pub fn with<I>(mut self, priority: Priority, channels: I) -> Self
    where
        I: IntoIterator<Item = ChannelKind>,
    {
        let mut ordered: Vec<ChannelKind> = Vec::new();
        for channel in channels {
            if !ordered.contains(&channel) {
                ordered.push(channel);
            }
        }
        self.table.insert(priority, ordered);
        self
    }

    /// Remove a priority's entry so it falls back to `medium`.
    pub fn without(mut self, priority: Priority) -> Self {
        self.table.remove(&priority);
        self
    }

    /// Channels for `priority`, falling back to the `medium` entry.
    pub fn resolve(&self, priority: Priority) -> &[ChannelKind] {
        if let Some(channels) = self.table.get(&priority) {
            return channels;
        }
        match self.table.get(&Priority::Medium) {
            Some(channels) => channels,
            None => {
                warn!(%priority, "No channel policy for priority and no medium fallback");
                &[]
            }
        }
    }

    pub fn has_entry(&self, priority: Priority) -> bool {
        self.table.contains_key(&priority)
    }

    /// Every channel referenced by any priority.
    pub fn referenced_channels(&self) -> Vec<ChannelKind> {
        let mut channels: Vec<ChannelKind> = self.table.values().flatten().copied().collect();
        channels.sort();
        channels.dedup();
        channels
    }

    /// Check the policy can be served by `registry`.
    pub fn validate(&self, registry: &ChannelRegistry) -> Result<()> {
        if !self.has_entry(Priority::Medium) {
            return Err(Error::config(
                "channel policy must define the medium priority fallback",
            ));
        }
        let missing: Vec<String> = self
            .referenced_channels()
            .into_iter()
            .filter(|c| !registry.contains(*c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::config(format!(
                "channel policy references unregistered channels: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}
