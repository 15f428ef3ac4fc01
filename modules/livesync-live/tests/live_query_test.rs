//! Ordering, cancellation and failure behaviour of live queries.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use livesync_events::{
    EventHandler, MemoryPubSub, PubSub, PubSubEvent, SubscriptionId, Topic, TopicName,
};
use livesync_live::LiveQuery;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Test bus: memory bus that counts unsubscribes and can refuse a topic
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CountingBus {
    inner: MemoryPubSub,
    unsubscribes: AtomicUsize,
    refuse: Option<TopicName>,
}

impl CountingBus {
    fn refusing(name: TopicName) -> Self {
        Self {
            refuse: Some(name),
            ..Default::default()
        }
    }

    fn unsubscribes(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PubSub for CountingBus {
    async fn subscribe(&self, topic: &Topic, handler: EventHandler) -> Result<SubscriptionId> {
        if self.refuse == Some(topic.name) {
            return Err(anyhow!("transport refused {}", topic.name));
        }
        self.inner.subscribe(topic, handler).await
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        self.inner.unsubscribe(id);
    }

    async fn publish(&self, topic: &Topic, payload: Value) -> Result<()> {
        self.inner.publish(topic, payload).await
    }
}

fn added() -> Topic {
    Topic::thread(TopicName::ThreadMessageAdded, "t1")
}

fn removed() -> Topic {
    Topic::thread(TopicName::ThreadMessageRemoved, "t1")
}

async fn snapshot(value: i64) -> Result<Option<i64>> {
    Ok(Some(value))
}

async fn payload_n(event: PubSubEvent) -> Result<Option<i64>> {
    Ok(event.payload["n"].as_i64())
}

async fn next_within(query: &mut LiveQuery<i64>, ms: u64) -> Option<Result<i64>> {
    tokio::time::timeout(Duration::from_millis(ms), query.next())
        .await
        .unwrap_or(None)
}

// =========================================================================
// Ordering
// =========================================================================

#[tokio::test(start_paused = true)]
async fn snapshot_only_then_blocks() {
    let bus = Arc::new(MemoryPubSub::new());
    let mut query = LiveQuery::subscribe(bus.clone(), vec![added()], || snapshot(7), payload_n)
        .await
        .unwrap();

    assert_eq!(query.next().await.unwrap().unwrap(), 7);

    let pending = tokio::time::timeout(Duration::from_millis(100), query.next()).await;
    assert!(pending.is_err(), "no events published, so the query must block");
}

#[tokio::test]
async fn events_follow_snapshot_in_publish_order() {
    let bus = Arc::new(MemoryPubSub::new());
    let mut query = LiveQuery::subscribe(bus.clone(), vec![added()], || snapshot(0), payload_n)
        .await
        .unwrap();

    for n in 1..=3 {
        bus.publish(&added(), json!({ "n": n })).await.unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(query.next().await.unwrap().unwrap());
    }
    assert_eq!(seen, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn update_between_subscribe_and_snapshot_is_not_lost() {
    let bus = Arc::new(MemoryPubSub::new());
    let counter = Arc::new(AtomicI64::new(0));

    let read = counter.clone();
    let mut query = LiveQuery::subscribe(
        bus.clone(),
        vec![added()],
        move || async move { anyhow::Ok(Some(read.load(Ordering::SeqCst))) },
        payload_n,
    )
    .await
    .unwrap();

    // A write lands after subscribing but before the snapshot is read.
    counter.store(1, Ordering::SeqCst);
    bus.publish(&added(), json!({ "n": 1 })).await.unwrap();

    assert_eq!(query.next().await.unwrap().unwrap(), 1);
    assert_eq!(query.next().await.unwrap().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn filtered_events_are_skipped() {
    let bus = Arc::new(MemoryPubSub::new());
    let mut query = LiveQuery::subscribe(
        bus.clone(),
        vec![added(), removed()],
        || async { anyhow::Ok(None) },
        |event: PubSubEvent| async move {
            anyhow::Ok(match event.name {
                TopicName::ThreadMessageAdded => event.payload["n"].as_i64(),
                _ => None,
            })
        },
    )
    .await
    .unwrap();

    bus.publish(&removed(), json!({ "n": 100 })).await.unwrap();
    bus.publish(&added(), json!({ "n": 1 })).await.unwrap();
    bus.publish(&removed(), json!({ "n": 200 })).await.unwrap();
    bus.publish(&added(), json!({ "n": 2 })).await.unwrap();

    assert_eq!(next_within(&mut query, 50).await.unwrap().unwrap(), 1);
    assert_eq!(next_within(&mut query, 50).await.unwrap().unwrap(), 2);
    assert!(next_within(&mut query, 50).await.is_none());
}

// =========================================================================
// Cancellation
// =========================================================================

#[tokio::test]
async fn stop_unsubscribes_exactly_once() {
    let bus = Arc::new(CountingBus::default());
    let mut query = LiveQuery::subscribe(
        bus.clone(),
        vec![added(), removed()],
        || snapshot(0),
        payload_n,
    )
    .await
    .unwrap();

    bus.publish(&added(), json!({ "n": 1 })).await.unwrap();
    assert_eq!(query.next().await.unwrap().unwrap(), 0);

    query.stop();
    query.stop();
    assert!(query.is_stopped());
    assert_eq!(bus.unsubscribes(), 2);

    bus.publish(&added(), json!({ "n": 2 })).await.unwrap();
    assert!(query.next().await.is_none(), "buffered and later events are discarded");
    assert_eq!(bus.inner.subscriber_count(&added()), 0);

    drop(query);
    assert_eq!(bus.unsubscribes(), 2, "drop after stop is a no-op");
}

#[tokio::test]
async fn dropping_the_query_unsubscribes() {
    let bus = Arc::new(CountingBus::default());
    let query = LiveQuery::subscribe(bus.clone(), vec![added()], || snapshot(0), payload_n)
        .await
        .unwrap();
    assert_eq!(bus.inner.subscriber_count(&added()), 1);

    drop(query);

    assert_eq!(bus.unsubscribes(), 1);
    assert_eq!(bus.inner.subscriber_count(&added()), 0);
}

// =========================================================================
// Failure
// =========================================================================

#[tokio::test]
async fn snapshot_error_propagates_and_tears_down() {
    let bus = Arc::new(CountingBus::default());
    let mut query = LiveQuery::subscribe(
        bus.clone(),
        vec![added()],
        || async { Err::<Option<i64>, _>(anyhow!("database unavailable")) },
        payload_n,
    )
    .await
    .unwrap();

    let err = query.next().await.unwrap().unwrap_err();
    assert!(format!("{err:#}").contains("database unavailable"));
    assert!(query.is_stopped());
    assert_eq!(bus.unsubscribes(), 1);
    assert!(query.next().await.is_none());
}

#[tokio::test]
async fn transform_error_propagates_and_tears_down() {
    let bus = Arc::new(CountingBus::default());
    let mut query = LiveQuery::subscribe(
        bus.clone(),
        vec![added()],
        || snapshot(0),
        |event: PubSubEvent| async move {
            match event.payload["n"].as_i64() {
                Some(n) => Ok(Some(n)),
                None => Err(anyhow!("malformed payload")),
            }
        },
    )
    .await
    .unwrap();

    bus.publish(&added(), json!({ "n": 1 })).await.unwrap();
    bus.publish(&added(), json!({ "bogus": true })).await.unwrap();
    bus.publish(&added(), json!({ "n": 3 })).await.unwrap();

    assert_eq!(query.next().await.unwrap().unwrap(), 0);
    assert_eq!(query.next().await.unwrap().unwrap(), 1);
    assert!(query.next().await.unwrap().is_err());
    assert!(query.next().await.is_none());
    assert_eq!(bus.unsubscribes(), 1);
}

#[tokio::test]
async fn failed_subscribe_releases_earlier_topics() {
    let bus = Arc::new(CountingBus::refusing(TopicName::ThreadMessageRemoved));
    let result = LiveQuery::subscribe(
        bus.clone(),
        vec![added(), removed()],
        || snapshot(0),
        payload_n,
    )
    .await;

    assert!(result.is_err());
    assert_eq!(bus.unsubscribes(), 1);
    assert_eq!(bus.inner.subscriber_count(&added()), 0);
}
