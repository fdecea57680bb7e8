//! Per-key throttle state shared by the throttle combinators

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::timer::{TimerHandle, TimerQueue};

/// Stand-in deadline for windows too long to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Throttle bookkeeping for one key.
///
/// A key holds a timer exactly when it holds a pending event.
struct KeyState<T> {
    last_delivered: Instant,
    pending: Option<T>,
    timer: Option<TimerHandle>,
}

impl<T> KeyState<T> {
    fn delivered_at(now: Instant) -> Self {
        Self { last_delivered: now, pending: None, timer: None }
    }

    fn window_elapsed(&self, now: Instant, window: Duration) -> bool {
        now.duration_since(self.last_delivered) >= window
    }
}

/// The throttle state machine, independent of where events come from.
///
/// Owned by exactly one stream; every method runs inside that stream's
/// `poll_next`, so state changes never interleave.
pub(crate) struct ThrottleCore<K, T> {
    window: Duration,
    keys: HashMap<K, KeyState<T>>,
    timers: TimerQueue<K>,
    idle_key_limit: Option<usize>,
    /// Key count that triggers the next idle sweep
    sweep_at: usize,
}

impl<K, T> ThrottleCore<K, T>
where
    K: Hash + Eq + Clone,
{
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            keys: HashMap::new(),
            timers: TimerQueue::new(),
            idle_key_limit: None,
            sweep_at: 0,
        }
    }

    pub(crate) fn set_idle_key_limit(&mut self, limit: Option<usize>) {
        self.idle_key_limit = limit;
        self.sweep_at = limit.unwrap_or(0);
    }

    pub(crate) fn window(&self) -> Duration {
        self.window
    }

    /// Release the pending event of the first key whose timer has fired.
    ///
    /// `Pending` means nothing is due; the waker is registered on the earliest
    /// deadline if any timer is outstanding.
    pub(crate) fn poll_released(&mut self, cx: &mut Context<'_>) -> Poll<T> {
        loop {
            let key = match self.timers.poll_expired(cx) {
                Poll::Ready(Some(key)) => key,
                Poll::Ready(None) | Poll::Pending => return Poll::Pending,
            };

            let Some(state) = self.keys.get_mut(&key) else {
                continue;
            };
            state.timer = None;

            if let Some(event) = state.pending.take() {
                state.last_delivered = Instant::now();
                trace!("Released pending event after window");
                return Poll::Ready(event);
            }
            // A fired timer with nothing pending is a no-op
        }
    }

    /// Offer a freshly pulled upstream event.
    ///
    /// Returns the event when it may be delivered now. Otherwise it replaces the
    /// key's pending event and `None` is returned.
    pub(crate) fn offer(&mut self, key: K, event: T) -> Option<T> {
        let now = Instant::now();
        let window = self.window;

        match self.keys.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(KeyState::delivered_at(now));
                trace!("First event for key, delivering immediately");
                self.evict_idle(now);
                Some(event)
            }
            Entry::Occupied(mut slot) => {
                let state = slot.get_mut();
                if state.window_elapsed(now, window) {
                    if let Some(handle) = state.timer.take() {
                        self.timers.cancel(handle);
                    }
                    if state.pending.take().is_some() {
                        trace!("Newer event superseded an unreleased pending event");
                    }
                    state.last_delivered = now;
                    trace!("Window elapsed, delivering immediately");
                    return Some(event);
                }

                if state.pending.replace(event).is_some() {
                    trace!("Dropped superseded pending event");
                }
                if state.timer.is_none() {
                    let deadline = state
                        .last_delivered
                        .checked_add(window)
                        .unwrap_or_else(|| now + FAR_FUTURE);
                    let handle = self.timers.schedule(deadline, slot.key().clone());
                    slot.get_mut().timer = Some(handle);
                    trace!("Throttled event, release scheduled in {:?}", deadline - now);
                }
                None
            }
        }
    }

    /// Take the next pending event in deadline order, ignoring the window.
    pub(crate) fn flush_next(&mut self) -> Option<T> {
        while let Some(key) = self.timers.pop_first() {
            let Some(state) = self.keys.get_mut(&key) else {
                continue;
            };
            state.timer = None;
            if let Some(event) = state.pending.take() {
                state.last_delivered = Instant::now();
                debug!("Flushing pending event at end of upstream");
                return Some(event);
            }
        }
        None
    }

    /// Cancel every timer and forget every key.
    pub(crate) fn shutdown(&mut self) {
        let outstanding = self.timers.len();
        if outstanding > 0 {
            debug!("Cancelling {} outstanding throttle timers", outstanding);
        }
        self.timers.clear();
        self.keys.clear();
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.keys.values().filter(|state| state.pending.is_some()).count()
    }

    pub(crate) fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Drop keys that are indistinguishable from unseen ones.
    ///
    /// A key with nothing pending and an elapsed window would deliver its next
    /// event immediately, exactly as a new key does.
    ///
    /// Keys that survive a sweep must double before the next one, so sweeps
    /// cost amortized O(1) per new key.
    fn evict_idle(&mut self, now: Instant) {
        let Some(limit) = self.idle_key_limit else {
            return;
        };
        if self.keys.len() <= self.sweep_at.max(limit) {
            return;
        }

        let window = self.window;
        let before = self.keys.len();
        self.keys.retain(|_, state| state.pending.is_some() || !state.window_elapsed(now, window));

        self.sweep_at = limit.max(2 * self.keys.len());

        debug!("Evicted {} idle keys ({} tracked)", before - self.keys.len(), self.keys.len());
    }
}
