//! Provider trait for upstream event sources

use futures::Stream;
use futures::stream;
use tracing::{debug, warn};

/// Trait for pull-based event sources
///
/// Providers abstract over where events come from (a change-feed cursor, a
/// message-queue consumer, a scripted replay) and handle their own waiting.
/// Each call pulls exactly one event; the throttle never calls it again until
/// the previous call has completed.
#[async_trait::async_trait]
pub trait Provider: Send + 'static {
    /// Event type produced by this source
    type Event: Send + 'static;

    /// Failure type surfaced unchanged to the subscriber
    type Error: Send + 'static;

    /// Get the next event
    ///
    /// Returns:
    /// - `Ok(Some(event))` - New event available
    /// - `Ok(None)` - Source exhausted (normal termination)
    /// - `Err(e)` - Source failed; no further events are requested
    async fn next_event(&mut self) -> Result<Option<Self::Event>, Self::Error>;
}

/// Turn a provider into a fallible stream
///
/// The stream ends after the provider reports exhaustion, or right after the
/// first error it yields.
pub fn provider_stream<P: Provider>(
    provider: P,
) -> impl Stream<Item = Result<P::Event, P::Error>> + Send + 'static {
    stream::unfold(Some(provider), |state| async move {
        let mut provider = state?;
        match provider.next_event().await {
            Ok(Some(event)) => Some((Ok(event), Some(provider))),
            Ok(None) => {
                debug!("Provider exhausted");
                None
            }
            Err(error) => {
                warn!("Provider failed, ending stream");
                Some((Err(error), None))
            }
        }
    })
}
