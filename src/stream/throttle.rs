//! Stream throttling utilities

use futures::Stream;
use futures::stream::FusedStream;
use pin_project_lite::pin_project;
use std::hash::Hash;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::debug;

use super::key::{KeyOf, Unkeyed};
use super::state::ThrottleCore;

/// Extension trait to add throttling to any Stream
pub trait ThrottleExt: Stream {
    /// Throttle the whole stream to emit at most once per window
    ///
    /// Uses "latest-wins" semantics - the first event is emitted immediately,
    /// and of the events arriving inside a window only the latest is emitted,
    /// once the window has passed.
    fn throttle(self, window: Duration) -> Throttle<Self, Unkeyed>
    where
        Self: Sized,
    {
        Throttle::new(self, window, Unkeyed)
    }

    /// Throttle each key independently
    ///
    /// Events for different keys never delay each other.
    fn throttle_by_key<F, K>(self, window: Duration, key_of: F) -> Throttle<Self, F>
    where
        Self: Sized,
        F: FnMut(&Self::Item) -> K,
        K: Hash + Eq + Clone,
    {
        Throttle::new(self, window, key_of)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// A stream combinator that throttles emission rate per key
    ///
    /// Holds at most one undelivered event per key. When the upstream ends,
    /// the remaining undelivered events are emitted before the stream ends.
    pub struct Throttle<S: Stream, F: KeyOf<S::Item>> {
        #[pin]
        stream: S,
        key_of: F,
        core: ThrottleCore<F::Key, S::Item>,
        upstream_done: bool,
        terminated: bool,
    }
}

impl<S: Stream, F: KeyOf<S::Item>> Throttle<S, F> {
    /// Create a new throttled stream
    pub fn new(stream: S, window: Duration, key_of: F) -> Self {
        Self {
            stream,
            key_of,
            core: ThrottleCore::new(window),
            upstream_done: false,
            terminated: false,
        }
    }

    /// Forget idle keys once more than `limit` keys are tracked
    pub fn with_idle_key_limit(mut self, limit: usize) -> Self {
        self.core.set_idle_key_limit(Some(limit));
        self
    }

    /// Minimum spacing between deliveries for the same key
    pub fn window(&self) -> Duration {
        self.core.window()
    }

    /// Number of keys with live throttle state
    pub fn tracked_keys(&self) -> usize {
        self.core.key_count()
    }

    /// Number of events waiting for their window to pass
    pub fn pending_events(&self) -> usize {
        self.core.pending_count()
    }

    /// Number of scheduled releases
    pub fn outstanding_timers(&self) -> usize {
        self.core.timer_count()
    }

    /// Get a reference to the upstream stream
    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}

impl<S: Stream, F: KeyOf<S::Item>> Stream for Throttle<S, F> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if *this.terminated {
                return Poll::Ready(None);
            }

            if *this.upstream_done {
                if let Some(event) = this.core.flush_next() {
                    return Poll::Ready(Some(event));
                }
                *this.terminated = true;
                this.core.shutdown();
                debug!("Throttled stream ended");
                return Poll::Ready(None);
            }

            // A released event wins over pulling more from upstream
            if let Poll::Ready(event) = this.core.poll_released(cx) {
                return Poll::Ready(Some(event));
            }

            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(event)) => {
                    let key = this.key_of.key_of(&event);
                    if let Some(event) = this.core.offer(key, event) {
                        return Poll::Ready(Some(event));
                    }
                    // Throttled: keep pulling
                }
                Poll::Ready(None) => {
                    debug!(
                        "Upstream exhausted with {} pending events to flush",
                        this.core.pending_count()
                    );
                    *this.upstream_done = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<S: Stream, F: KeyOf<S::Item>> FusedStream for Throttle<S, F> {
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}
