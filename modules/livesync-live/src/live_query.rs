use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use anyhow::{Context as _, Result};
use futures::stream::BoxStream;
use futures::Stream;
use livesync_events::{EventHandler, PubSub, PubSubEvent, SubscriptionId, Topic};
use tokio::sync::mpsc;
use tracing::debug;

/// A cancellable, ordered sequence of values: the initial snapshot (if any),
/// then one value per relevant bus event.
///
/// Pull-based: the snapshot and each transform run only when the consumer
/// polls. The event queue is unbounded.
///
/// Stopping (explicitly via [`LiveQuery::stop`], by dropping the query, or
/// because the snapshot/transform failed) unsubscribes from every topic
/// exactly once.
pub struct LiveQuery<T> {
    values: Option<BoxStream<'static, Result<T>>>,
    subscriptions: Subscriptions,
}

impl<T: Send + 'static> LiveQuery<T> {
    /// Subscribe to `topics`, then lazily compute `initial` and transform
    /// each received event with `transform`. `None` results are skipped.
    pub async fn subscribe<I, IFut, F, FFut>(
        bus: Arc<dyn PubSub>,
        topics: Vec<Topic>,
        initial: I,
        transform: F,
    ) -> Result<Self>
    where
        I: FnOnce() -> IFut + Send + 'static,
        IFut: Future<Output = Result<Option<T>>> + Send + 'static,
        F: FnMut(PubSubEvent) -> FFut + Send + 'static,
        FFut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<PubSubEvent>();

        // Dropped on early return, releasing whatever was subscribed so far.
        let mut subscriptions = Subscriptions {
            bus: bus.clone(),
            ids: Vec::with_capacity(topics.len()),
        };
        for topic in &topics {
            let tx = tx.clone();
            let handler: EventHandler = Arc::new(move |event| {
                // Receiver gone means the query was stopped; nothing to do.
                let _ = tx.send(event);
            });
            let id = bus
                .subscribe(topic, handler)
                .await
                .with_context(|| format!("Failed to subscribe to {topic}"))?;
            subscriptions.ids.push(id);
        }
        drop(tx);

        debug!(topics = topics.len(), "Live query subscribed");

        let values = async_stream::stream! {
            let mut rx = rx;
            let mut transform = transform;

            match initial().await {
                Ok(Some(value)) => {
                    yield Ok(value);
                }
                Ok(None) => {}
                Err(e) => {
                    yield Err(e.context("Live query snapshot failed"));
                    return;
                }
            }

            while let Some(event) = rx.recv().await {
                match transform(event).await {
                    Ok(Some(value)) => {
                        yield Ok(value);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        };

        Ok(Self {
            values: Some(Box::pin(values)),
            subscriptions,
        })
    }
}

impl<T> LiveQuery<T> {
    /// Unsubscribe from every topic and drop buffered events. Idempotent.
    pub fn stop(&mut self) {
        self.values = None;
        self.subscriptions.release();
    }

    pub fn is_stopped(&self) -> bool {
        self.values.is_none()
    }
}

impl<T> Stream for LiveQuery<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let Some(values) = this.values.as_mut() else {
            return Poll::Ready(None);
        };

        match values.as_mut().poll_next(cx) {
            Poll::Ready(Some(Err(e))) => {
                debug!(error = %e, "Live query failed, tearing down");
                this.stop();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.stop();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

/// Owns the bus subscriptions of one live query.
struct Subscriptions {
    bus: Arc<dyn PubSub>,
    ids: Vec<SubscriptionId>,
}

impl Subscriptions {
    fn release(&mut self) {
        if self.ids.is_empty() {
            return;
        }
        for id in self.ids.drain(..) {
            self.bus.unsubscribe(id);
        }
        debug!("Live query unsubscribed");
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.release();
    }
}
