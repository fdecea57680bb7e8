//! Test utilities for driving throttled streams in virtual time
//!
//! Timelines are built on [`ReplayProvider`] so tests and benchmarks exercise
//! the same provider path as real subscriptions.

#![cfg(any(test, feature = "benchmark"))]

use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio::time::Instant;

use crate::provider::provider_stream;
use crate::providers::ReplayProvider;

/// Source yielding `0..delays.len()`, pausing `delays[i]` milliseconds after
/// yielding `i`.
pub fn paced(delays: &[u64]) -> impl Stream<Item = usize> + Send + 'static {
    let delays: Vec<_> = delays.iter().copied().map(Duration::from_millis).collect();
    infallible(provider_stream(ReplayProvider::paced(&delays)))
}

/// Source replaying `(gap before event, event)` pairs, then waiting `tail`.
pub fn timeline<T: Send + 'static>(
    events: Vec<(Duration, T)>,
    tail: Duration,
) -> impl Stream<Item = T> + Send + 'static {
    infallible(provider_stream(ReplayProvider::new(events).with_trailing_delay(tail)))
}

/// Key used by the keyed scenarios: even and odd events throttle separately.
pub fn parity(value: &usize) -> usize {
    value % 2
}

/// Collect every item with its offset from the moment collection started.
pub async fn collect_timed<S: Stream>(stream: S) -> Vec<(Duration, S::Item)> {
    let start = Instant::now();
    let mut stream = std::pin::pin!(stream);
    let mut out = Vec::new();
    while let Some(item) = stream.next().await {
        out.push((Instant::now() - start, item));
    }
    out
}

fn infallible<T>(
    stream: impl Stream<Item = Result<T, Infallible>> + Send + 'static,
) -> impl Stream<Item = T> + Send + 'static {
    stream.map(|result| match result {
        Ok(value) => value,
        Err(never) => match never {},
    })
}
