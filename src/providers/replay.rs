//! Replay provider for scripted event timelines

use std::collections::VecDeque;
use std::convert::Infallible;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::provider::Provider;

/// Replays a fixed timeline of events
///
/// Each entry waits its delay before the event is produced. Delays are measured
/// from the moment the event is requested, so a slow consumer shifts the rest
/// of the timeline rather than receiving a burst.
pub struct ReplayProvider<T> {
    /// Remaining `(delay, event)` pairs
    events: VecDeque<(Duration, T)>,

    /// Wait after the last event before reporting exhaustion
    trailing_delay: Duration,

    /// Events produced so far
    produced: usize,
}

impl<T: Send + 'static> ReplayProvider<T> {
    /// Create a replay from `(delay, event)` pairs
    pub fn new<I>(events: I) -> Self
    where
        I: IntoIterator<Item = (Duration, T)>,
    {
        Self { events: events.into_iter().collect(), trailing_delay: Duration::ZERO, produced: 0 }
    }

    /// Wait this long after the last event before ending
    pub fn with_trailing_delay(mut self, delay: Duration) -> Self {
        self.trailing_delay = delay;
        self
    }

    /// Number of events not yet produced
    pub fn remaining(&self) -> usize {
        self.events.len()
    }

    /// Number of events produced so far
    pub fn produced(&self) -> usize {
        self.produced
    }
}

impl ReplayProvider<usize> {
    /// Events `0..delays.len()`, where event `i` is followed by a pause of
    /// `delays[i]` before the next event (or before exhaustion for the last).
    pub fn paced(delays: &[Duration]) -> Self {
        let gaps = std::iter::once(Duration::ZERO).chain(delays.iter().copied());
        let events: Vec<_> = gaps.zip(0..delays.len()).collect();
        let trailing = delays.last().copied().unwrap_or(Duration::ZERO);
        Self::new(events).with_trailing_delay(trailing)
    }
}

#[async_trait::async_trait]
impl<T: Send + 'static> Provider for ReplayProvider<T> {
    type Event = T;
    type Error = Infallible;

    async fn next_event(&mut self) -> Result<Option<T>, Infallible> {
        let Some((delay, event)) = self.events.pop_front() else {
            let trailing = std::mem::take(&mut self.trailing_delay);
            if !trailing.is_zero() {
                sleep(trailing).await;
            }
            debug!("Reached end of replay after {} events", self.produced);
            return Ok(None);
        };

        if !delay.is_zero() {
            sleep(delay).await;
        }
        self.produced += 1;
        trace!("Replayed event {} ({} remaining)", self.produced, self.events.len());
        Ok(Some(event))
    }
}
