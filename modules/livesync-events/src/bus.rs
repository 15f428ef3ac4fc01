use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::types::{PubSubEvent, SubscriptionId, Topic};

/// Callback invoked once per delivered event, in bus order.
pub type EventHandler = Arc<dyn Fn(PubSubEvent) + Send + Sync>;

/// Publish/subscribe transport.
///
/// Implementations must deliver events for a single topic to each handler in
/// publish order. `unsubscribe` is synchronous so that cancellation never has
/// to await the transport; after it returns the handler is not invoked again.
#[async_trait]
pub trait PubSub: Send + Sync {
    async fn subscribe(&self, topic: &Topic, handler: EventHandler) -> Result<SubscriptionId>;

    fn unsubscribe(&self, id: SubscriptionId);

    async fn publish(&self, topic: &Topic, payload: Value) -> Result<()>;
}

#[async_trait]
impl<P: PubSub + ?Sized> PubSub for Arc<P> {
    async fn subscribe(&self, topic: &Topic, handler: EventHandler) -> Result<SubscriptionId> {
        (**self).subscribe(topic, handler).await
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        (**self).unsubscribe(id)
    }

    async fn publish(&self, topic: &Topic, payload: Value) -> Result<()> {
        (**self).publish(topic, payload).await
    }
}
