//! In-process pub/sub. Delivers synchronously on the publisher's task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use livesync_common::PubSubConfig;
use serde_json::Value;
use tracing::{debug, trace};

use crate::bus::{EventHandler, PubSub};
use crate::channel::channel_name;
use crate::types::{PubSubEvent, SubscriptionId, Topic};

#[derive(Default)]
struct Registry {
    channels: HashMap<String, Vec<(SubscriptionId, EventHandler)>>,
    by_id: HashMap<SubscriptionId, String>,
}

/// In-memory bus. Thread-safe; handlers are invoked outside the registry lock
/// so a handler may itself subscribe, unsubscribe or publish.
pub struct MemoryPubSub {
    config: PubSubConfig,
    next_id: AtomicU64,
    registry: Mutex<Registry>,
}

impl MemoryPubSub {
    pub fn new() -> Self {
        Self::with_config(PubSubConfig::default())
    }

    pub fn with_config(config: PubSubConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Number of live subscriptions on a topic.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        let channel = self.channel(topic);
        self.registry()
            .channels
            .get(&channel)
            .map_or(0, |handlers| handlers.len())
    }

    fn channel(&self, topic: &Topic) -> String {
        channel_name(topic, self.config.max_channel_name_length)
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSub for MemoryPubSub {
    async fn subscribe(&self, topic: &Topic, handler: EventHandler) -> Result<SubscriptionId> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let channel = self.channel(topic);

        let mut registry = self.registry();
        registry
            .channels
            .entry(channel.clone())
            .or_default()
            .push((id, handler));
        registry.by_id.insert(id, channel);

        debug!(%id, %topic, "Subscribed");
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut registry = self.registry();
        let Some(channel) = registry.by_id.remove(&id) else {
            return;
        };
        if let Some(handlers) = registry.channels.get_mut(&channel) {
            handlers.retain(|(sub, _)| *sub != id);
            if handlers.is_empty() {
                registry.channels.remove(&channel);
            }
        }
        debug!(%id, "Unsubscribed");
    }

    async fn publish(&self, topic: &Topic, payload: Value) -> Result<()> {
        let handlers: Vec<EventHandler> = self
            .registry()
            .channels
            .get(&self.channel(topic))
            .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        trace!(%topic, subscribers = handlers.len(), "Publishing");

        let event = PubSubEvent::new(topic, payload);
        for handler in handlers {
            handler(event.clone());
        }
        Ok(())
    }
}
