//! Restartable throttled subscriptions

use futures::{Stream, TryStream};
use std::hash::Hash;
use std::time::Duration;
use tracing::debug;

use crate::config::{DEFAULT_CHANNEL_CAPACITY, ThrottleConfig};
use crate::driver::{Driver, Subscription};
use crate::stream::{KeyOf, Throttle, TryThrottle, Unkeyed};
use crate::Result;

/// Factory for independent throttled streams over a fresh upstream.
///
/// Holds only configuration: the upstream factory, the window, the key function
/// and limits. Every [`subscribe`](Throttled::subscribe) calls the upstream
/// factory once and starts with empty per-key state, so one `Throttled` can
/// serve any number of subscribers.
///
/// ```rust
/// use futures::{StreamExt, stream};
/// use std::time::Duration;
/// use subthrottle::Throttled;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let presence = Throttled::new(|| stream::iter(0..6u32), Duration::from_millis(100))
///     .keyed_by(|event: &u32| event % 2);
///
/// let first: Vec<_> = presence.subscribe().collect().await;
/// let second: Vec<_> = presence.subscribe().collect().await;
/// assert_eq!(first, vec![0, 1, 4, 5]);
/// assert_eq!(first, second);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Throttled<U, F = Unkeyed> {
    upstream: U,
    window: Duration,
    key_of: F,
    idle_key_limit: Option<usize>,
    channel_capacity: usize,
}

impl<U> Throttled<U, Unkeyed> {
    /// Throttle every event of the upstream under one shared window.
    pub fn new(upstream: U, window: Duration) -> Self {
        Self {
            upstream,
            window,
            key_of: Unkeyed,
            idle_key_limit: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Build from validated configuration.
    pub fn from_config(upstream: U, config: &ThrottleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            upstream,
            window: config.window(),
            key_of: Unkeyed,
            idle_key_limit: config.idle_key_limit,
            channel_capacity: config.channel_capacity,
        })
    }
}

impl<U, F> Throttled<U, F> {
    /// Forget idle keys once more than `limit` are tracked by one subscription.
    pub fn idle_key_limit(mut self, limit: usize) -> Self {
        self.idle_key_limit = Some(limit);
        self
    }

    /// Channel size used by [`spawn`](Throttled::spawn).
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn with_key<G>(self, key_of: G) -> Throttled<U, G> {
        Throttled {
            upstream: self.upstream,
            window: self.window,
            key_of,
            idle_key_limit: self.idle_key_limit,
            channel_capacity: self.channel_capacity,
        }
    }
}

impl<U, S, F> Throttled<U, F>
where
    U: Fn() -> S,
    S: Stream,
{
    /// Throttle each key independently.
    pub fn keyed_by<G, K>(self, key_of: G) -> Throttled<U, G>
    where
        G: FnMut(&S::Item) -> K + Clone,
        K: Hash + Eq + Clone,
    {
        self.with_key(key_of)
    }

    /// Start a fresh throttled stream over a new upstream.
    pub fn subscribe(&self) -> Throttle<S, F>
    where
        F: KeyOf<S::Item> + Clone,
    {
        debug!("New throttled subscription (window {:?})", self.window);
        let throttle = Throttle::new((self.upstream)(), self.window, self.key_of.clone());
        match self.idle_key_limit {
            Some(limit) => throttle.with_idle_key_limit(limit),
            None => throttle,
        }
    }

    /// Start a fresh subscription driven on its own task.
    pub fn spawn(&self) -> Subscription<S::Item>
    where
        F: KeyOf<S::Item> + Clone + Send + 'static,
        F::Key: Send,
        S: Send + 'static,
        S::Item: Send + 'static,
    {
        Driver::spawn(self.subscribe(), self.channel_capacity)
    }
}

impl<U, S, F> Throttled<U, F>
where
    U: Fn() -> S,
    S: TryStream,
{
    /// Throttle the `Ok` values of each key independently.
    pub fn try_keyed_by<G, K>(self, key_of: G) -> Throttled<U, G>
    where
        G: FnMut(&S::Ok) -> K + Clone,
        K: Hash + Eq + Clone,
    {
        self.with_key(key_of)
    }

    /// Start a fresh throttled stream over a new fallible upstream.
    pub fn try_subscribe(&self) -> TryThrottle<S, F>
    where
        F: KeyOf<S::Ok> + Clone,
    {
        debug!("New fallible throttled subscription (window {:?})", self.window);
        let throttle = TryThrottle::new((self.upstream)(), self.window, self.key_of.clone());
        match self.idle_key_limit {
            Some(limit) => throttle.with_idle_key_limit(limit),
            None => throttle,
        }
    }

    /// Start a fresh fallible subscription driven on its own task.
    pub fn try_spawn(&self) -> Subscription<std::result::Result<S::Ok, S::Error>>
    where
        F: KeyOf<S::Ok> + Clone + Send + 'static,
        F::Key: Send,
        S: Send + 'static,
        S::Ok: Send + 'static,
        S::Error: Send + 'static,
    {
        Driver::spawn(self.try_subscribe(), self.channel_capacity)
    }
}
