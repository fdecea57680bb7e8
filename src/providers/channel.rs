//! Channel provider for in-process producers

use std::convert::Infallible;
use tokio::sync::mpsc;

use crate::provider::Provider;

/// Provider fed by an mpsc channel
///
/// Exhausted once every sender has been dropped and the buffer is drained.
pub struct ChannelProvider<T> {
    receiver: mpsc::Receiver<T>,
}

impl<T: Send + 'static> ChannelProvider<T> {
    /// Wrap an existing receiver
    pub fn new(receiver: mpsc::Receiver<T>) -> Self {
        Self { receiver }
    }

    /// Create a bounded channel and the provider reading from it
    pub fn channel(capacity: usize) -> (mpsc::Sender<T>, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (sender, Self::new(receiver))
    }
}

#[async_trait::async_trait]
impl<T: Send + 'static> Provider for ChannelProvider<T> {
    type Event = T;
    type Error = Infallible;

    async fn next_event(&mut self) -> Result<Option<T>, Infallible> {
        Ok(self.receiver.recv().await)
    }
}
