//! Keyed, latest-wins throttling for live-query subscription streams.
//!
//! Subscription transports (presence, typing indicators, thread updates) often
//! sit on top of change feeds that fire far faster than clients need. This crate
//! wraps such a feed and guarantees, per key:
//!
//! - the first event is delivered immediately,
//! - two deliveries are never closer than the throttle window,
//! - of a burst inside one window only the latest event survives,
//! - the latest event is always eventually delivered, including when the
//!   upstream ends while it is still waiting.
//!
//! Keys are throttled independently, and every timer is cancelled when the
//! stream ends or is dropped.
//!
//! # Quick Start
//!
//! ```rust
//! use futures::{StreamExt, stream};
//! use std::time::Duration;
//! use subthrottle::stream::ThrottleExt;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Typing {
//!     user: &'static str,
//!     typing: bool,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let feed = stream::iter([
//!     Typing { user: "ana", typing: true },
//!     Typing { user: "ana", typing: false },
//!     Typing { user: "ana", typing: true },
//!     Typing { user: "bo", typing: true },
//! ]);
//!
//! let updates: Vec<_> = feed
//!     .throttle_by_key(Duration::from_millis(250), |event: &Typing| event.user)
//!     .collect()
//!     .await;
//!
//! assert_eq!(updates, vec![
//!     Typing { user: "ana", typing: true },
//!     Typing { user: "bo", typing: true },
//!     Typing { user: "ana", typing: true },
//! ]);
//! # }
//! ```

// Core types and error handling
mod config;
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Stream-based throttling architecture
pub mod driver;
pub mod provider;
pub mod providers;
pub mod stream;
mod throttled;

// Core exports
pub use config::{DEFAULT_CHANNEL_CAPACITY, ThrottleConfig};
pub use error::*;
pub use types::*;

// Main API exports
pub use driver::{Driver, Subscription};
pub use provider::{Provider, provider_stream};
pub use providers::{ChannelProvider, ReplayProvider};
pub use stream::{KeyOf, Throttle, ThrottleExt, TryThrottle, TryThrottleExt, Unkeyed};
pub use throttled::Throttled;
