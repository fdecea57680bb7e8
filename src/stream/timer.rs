//! Per-key wake-ups backed by a single sleep

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::time::{Instant, Sleep, sleep_until};

/// Identifies one scheduled wake-up.
///
/// Handles order by deadline, then by scheduling order, so two keys due at
/// the same instant fire in the order they were scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct TimerHandle {
    deadline: Instant,
    seq: u64,
}

#[cfg(test)]
impl TimerHandle {
    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Cancellable deadlines, each carrying the key it wakes.
///
/// Only the earliest deadline has a live [`Sleep`]; it is re-armed whenever the
/// head of the queue changes.
pub(crate) struct TimerQueue<K> {
    entries: BTreeMap<TimerHandle, K>,
    next_seq: u64,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl<K> TimerQueue<K> {
    pub(crate) fn new() -> Self {
        Self { entries: BTreeMap::new(), next_seq: 0, sleep: None }
    }

    pub(crate) fn schedule(&mut self, deadline: Instant, key: K) -> TimerHandle {
        let handle = TimerHandle { deadline, seq: self.next_seq };
        self.next_seq += 1;
        self.entries.insert(handle, key);
        handle
    }

    pub(crate) fn cancel(&mut self, handle: TimerHandle) -> Option<K> {
        self.entries.remove(&handle)
    }

    /// Remove the earliest timer regardless of whether it is due.
    pub(crate) fn pop_first(&mut self) -> Option<K> {
        self.entries.pop_first().map(|(_, key)| key)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.sleep = None;
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Poll for the next due timer.
    ///
    /// Returns `Ready(Some(key))` for a due timer, `Ready(None)` when nothing is
    /// scheduled, and `Pending` with the waker registered on the earliest
    /// deadline otherwise.
    pub(crate) fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<Option<K>> {
        let Some(&head) = self.entries.keys().next() else {
            self.sleep = None;
            return Poll::Ready(None);
        };

        if head.deadline <= Instant::now() {
            return Poll::Ready(self.entries.remove(&head));
        }

        let sleep = self.sleep.get_or_insert_with(|| Box::pin(sleep_until(head.deadline)));
        if sleep.deadline() != head.deadline {
            sleep.as_mut().reset(head.deadline);
        }

        match sleep.as_mut().poll(cx) {
            Poll::Ready(()) => Poll::Ready(self.entries.remove(&head)),
            Poll::Pending => Poll::Pending,
        }
    }
}
