//! Throttling for fallible streams

use futures::stream::FusedStream;
use futures::{Stream, TryStream};
use pin_project_lite::pin_project;
use std::hash::Hash;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::debug;

use super::key::{KeyOf, Unkeyed};
use super::state::ThrottleCore;

/// Extension trait to add throttling to any TryStream
pub trait TryThrottleExt: TryStream {
    /// Throttle the `Ok` values of the whole stream as one
    fn try_throttle(self, window: Duration) -> TryThrottle<Self, Unkeyed>
    where
        Self: Sized,
    {
        TryThrottle::new(self, window, Unkeyed)
    }

    /// Throttle the `Ok` values of each key independently
    fn try_throttle_by_key<F, K>(self, window: Duration, key_of: F) -> TryThrottle<Self, F>
    where
        Self: Sized,
        F: FnMut(&Self::Ok) -> K,
        K: Hash + Eq + Clone,
    {
        TryThrottle::new(self, window, key_of)
    }
}

impl<T: TryStream> TryThrottleExt for T {}

pin_project! {
    /// Throttles the `Ok` values of a fallible stream
    ///
    /// The first upstream error is yielded as-is and ends the stream. Events
    /// still waiting for their window are discarded, not flushed.
    pub struct TryThrottle<S: TryStream, F: KeyOf<S::Ok>> {
        #[pin]
        stream: S,
        key_of: F,
        core: ThrottleCore<F::Key, S::Ok>,
        upstream_done: bool,
        terminated: bool,
    }
}

impl<S: TryStream, F: KeyOf<S::Ok>> TryThrottle<S, F> {
    pub fn new(stream: S, window: Duration, key_of: F) -> Self {
        Self {
            stream,
            key_of,
            core: ThrottleCore::new(window),
            upstream_done: false,
            terminated: false,
        }
    }

    pub fn with_idle_key_limit(mut self, limit: usize) -> Self {
        self.core.set_idle_key_limit(Some(limit));
        self
    }

    pub fn window(&self) -> Duration {
        self.core.window()
    }

    pub fn tracked_keys(&self) -> usize {
        self.core.key_count()
    }

    pub fn pending_events(&self) -> usize {
        self.core.pending_count()
    }

    pub fn outstanding_timers(&self) -> usize {
        self.core.timer_count()
    }
}

impl<S: TryStream, F: KeyOf<S::Ok>> Stream for TryThrottle<S, F> {
    type Item = Result<S::Ok, S::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if *this.terminated {
                return Poll::Ready(None);
            }

            if *this.upstream_done {
                if let Some(event) = this.core.flush_next() {
                    return Poll::Ready(Some(Ok(event)));
                }
                *this.terminated = true;
                this.core.shutdown();
                debug!("Throttled stream ended");
                return Poll::Ready(None);
            }

            if let Poll::Ready(event) = this.core.poll_released(cx) {
                return Poll::Ready(Some(Ok(event)));
            }

            match this.stream.as_mut().try_poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    let key = this.key_of.key_of(&event);
                    if let Some(event) = this.core.offer(key, event) {
                        return Poll::Ready(Some(Ok(event)));
                    }
                }
                Poll::Ready(Some(Err(error))) => {
                    debug!(
                        "Upstream failed, discarding {} pending events",
                        this.core.pending_count()
                    );
                    *this.terminated = true;
                    this.core.shutdown();
                    return Poll::Ready(Some(Err(error)));
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

impl<S: TryStream, F: KeyOf<S::Ok>> FusedStream for TryThrottle<S, F> {
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}
