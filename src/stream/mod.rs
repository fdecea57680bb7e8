//! Throttling combinators for event streams
//!
//! [`Throttle`] and [`TryThrottle`] wrap an upstream stream and deliver at
//! most one event per key per window. The first event for a key goes out as
//! soon as it arrives; later events inside the window replace each other and
//! only the most recent one is released when the window has passed.
//!
//! ```rust
//! use futures::{StreamExt, stream};
//! use std::time::Duration;
//! use subthrottle::stream::ThrottleExt;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! // Every event arrives at once: the first is delivered, the rest collapse
//! // into the latest, flushed when the upstream ends.
//! let delivered: Vec<u32> = stream::iter([1, 2, 3, 4])
//!     .throttle(Duration::from_millis(100))
//!     .collect()
//!     .await;
//! assert_eq!(delivered, vec![1, 4]);
//! # }
//! ```

mod key;
mod state;
mod throttle;
mod timer;
mod try_throttle;

#[cfg(test)]
mod tests;

pub use key::{KeyOf, Unkeyed};
pub use throttle::{Throttle, ThrottleExt};
pub use try_throttle::{TryThrottle, TryThrottleExt};
