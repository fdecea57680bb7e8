//! Driver spawns and manages subscription forwarding tasks

use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Handle to a stream being driven on its own task
///
/// Yields the driven stream's items. Dropping the handle (or calling
/// [`Subscription::cancel`]) stops the task, which drops the stream and with it
/// every outstanding throttle timer.
pub struct Subscription<T> {
    /// Items forwarded by the task
    events: ReceiverStream<T>,

    /// Cancellation token for stopping the task
    cancel: CancellationToken,
}

impl<T> Subscription<T> {
    /// Stop the forwarding task
    ///
    /// Items already buffered can still be read.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the subscription has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that cancels this subscription, for tying it to an outer shutdown
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        debug!("Dropping subscription");
        // Cancel task on drop for clean shutdown
        self.cancel.cancel();
    }
}

/// Driver spawns and manages subscription forwarding tasks
///
/// The task owns the stream and pushes each item into a bounded channel, so a
/// transport can read from the [`Subscription`] while the throttle keeps
/// running between reads.
pub struct Driver;

impl Driver {
    /// Spawn a task that drives `stream` into a channel of `capacity` items
    ///
    /// A capacity of zero is treated as one.
    pub fn spawn<S>(stream: S, capacity: usize) -> Subscription<S::Item>
    where
        S: Stream + Send + 'static,
        S::Item: Send + 'static,
    {
        let (event_tx, event_rx) = mpsc::channel(capacity.max(1));

        // Create cancellation token for coordinated shutdown
        let cancel = CancellationToken::new();
        let cancel_task = cancel.clone();

        tokio::spawn(async move {
            Self::forward_task(stream, event_tx, cancel_task).await;
        });

        Subscription { events: ReceiverStream::new(event_rx), cancel }
    }

    /// Forward task - pulls from the stream and hands items to the subscriber
    async fn forward_task<S>(stream: S, event_tx: mpsc::Sender<S::Item>, cancel: CancellationToken)
    where
        S: Stream + Send + 'static,
        S::Item: Send + 'static,
    {
        info!("Subscription task started");
        let mut stream = std::pin::pin!(stream);
        let mut forwarded = 0u64;

        loop {
            // Use select to allow cancellation while waiting on the stream
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Subscription cancelled");
                    break;
                }
                next = stream.next() => next,
            };

            let Some(event) = next else {
                info!("Stream ended after {} events", forwarded);
                break;
            };

            // A full channel must not keep a cancelled task alive
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Subscription cancelled while delivering");
                    break;
                }
                sent = event_tx.send(event) => {
                    if sent.is_err() {
                        debug!("Subscriber dropped, shutting down");
                        break;
                    }
                }
            }

            forwarded += 1;
            trace!("Forwarded event {}", forwarded);
        }

        info!("Subscription task ended (forwarded {} events)", forwarded);
    }
}
