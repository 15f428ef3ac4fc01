//! Rate limiting for value streams.
//!
//! A value is emitted immediately unless another value with the same key was
//! emitted less than `interval` ago. In that case it is stashed, replacing any
//! earlier stashed value for the key, and emitted once the interval elapses.
//! Stashed values are flushed when the source ends.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::time::{sleep_until, Instant};

/// Throttle every value of `source` against a single shared interval.
pub fn throttle<S>(source: S, interval: Duration) -> impl Stream<Item = S::Item>
where
    S: Stream,
{
    throttle_by_key(source, interval, |_| ())
}

/// Throttle `source` independently per key.
pub fn throttle_by_key<S, K, F>(source: S, interval: Duration, key: F) -> impl Stream<Item = S::Item>
where
    S: Stream,
    K: Eq + Hash + Clone,
    F: FnMut(&S::Item) -> K,
{
    async_stream::stream! {
        let mut source = Box::pin(source);
        let mut key = key;
        let mut last_sent: HashMap<K, Instant> = HashMap::new();
        let mut stashed: HashMap<K, (Instant, S::Item)> = HashMap::new();

        loop {
            let next_due = stashed.values().map(|(due, _)| *due).min();
            let step = tokio::select! {
                biased;
                _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => Step::Due,
                item = source.next() => Step::Item(item),
            };

            match step {
                Step::Item(Some(value)) => {
                    let k = key(&value);
                    let now = Instant::now();
                    let throttled_until = last_sent
                        .get(&k)
                        .map(|sent| *sent + interval)
                        .filter(|until| now < *until);
                    match throttled_until {
                        Some(until) => {
                            stashed.insert(k, (until, value));
                        }
                        None => {
                            last_sent.insert(k, now);
                            yield value;
                        }
                    }
                }
                Step::Due => {
                    let now = Instant::now();
                    for (k, value) in take_due(&mut stashed, Some(now)) {
                        last_sent.insert(k, now);
                        yield value;
                    }
                }
                Step::Item(None) => {
                    for (_, value) in take_due(&mut stashed, None) {
                        yield value;
                    }
                    break;
                }
            }
        }
    }
}

enum Step<T> {
    Item(Option<T>),
    Due,
}

/// Remove stashed values due at or before `now` (all of them for `None`),
/// ordered by due time.
fn take_due<K, T>(stashed: &mut HashMap<K, (Instant, T)>, now: Option<Instant>) -> Vec<(K, T)>
where
    K: Eq + Hash + Clone,
{
    let mut due: Vec<(Instant, K)> = stashed
        .iter()
        .filter(|(_, (at, _))| now.map_or(true, |now| *at <= now))
        .map(|(k, (at, _))| (*at, k.clone()))
        .collect();
    due.sort_by_key(|(at, _)| *at);

    due.into_iter()
        .filter_map(|(_, k)| stashed.remove(&k).map(|(_, value)| (k, value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Yields 0, 1, 2, ... sleeping `delays[i]` ms after yielding `i`.
    fn ticking(delays: Vec<u64>) -> impl Stream<Item = usize> {
        async_stream::stream! {
            for (i, delay) in delays.into_iter().enumerate() {
                yield i;
                if delay > 0 {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    async fn collect<S: Stream<Item = usize>>(stream: S) -> Vec<usize> {
        stream.collect().await
    }

    #[tokio::test(start_paused = true)]
    async fn short_interval_passes_everything() {
        let out = collect(throttle(ticking(vec![5, 5, 10]), Duration::from_millis(2))).await;
        assert_eq!(out, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn latest_stashed_value_wins() {
        let out = collect(throttle(ticking(vec![5, 5, 10]), Duration::from_millis(15))).await;
        assert_eq!(out, vec![0, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_throttle_windows() {
        // 0 sent; 2 sent at 55ms; 5 sent at 110ms; 7 sent at 165ms.
        let out = collect(throttle(
            ticking(vec![20, 20, 20, 20, 20, 20, 20, 60]),
            Duration::from_millis(55),
        ))
        .await;
        assert_eq!(out, vec![0, 2, 5, 7]);
    }

    #[tokio::test(start_paused = true)]
    async fn stashed_value_flushed_when_source_ends() {
        let out = collect(throttle(ticking(vec![5, 5, 0]), Duration::from_millis(15))).await;
        assert_eq!(out, vec![0, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_throttle_independently() {
        let out = collect(throttle_by_key(
            ticking(vec![2, 2, 2, 2, 2, 10]),
            Duration::from_millis(15),
            |i| i % 2,
        ))
        .await;
        assert_eq!(out, vec![0, 1, 4, 5]);
    }
}
