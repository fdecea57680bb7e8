//! Update rate control for throttled streams

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Update rate for a throttled subscription
///
/// Serialized with a `mode` tag, e.g. `{ mode: window, ms: 250 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum UpdateRate {
    /// Every event is delivered as it arrives
    #[default]
    Native,

    /// At most one delivery per key per `ms` milliseconds
    Window { ms: u64 },

    /// At most `hz` deliveries per key per second
    Max { hz: u32 },
}

impl UpdateRate {
    /// Normalize degenerate rates
    /// A zero-length window is the same as no throttling
    pub fn normalize(self) -> Self {
        match self {
            UpdateRate::Window { ms: 0 } => UpdateRate::Native,
            other => other,
        }
    }

    /// Minimum spacing between two deliveries for the same key
    ///
    /// `Max { hz: 0 }` has no meaningful window and maps to zero; config
    /// validation rejects it before it reaches a stream.
    pub fn window(self) -> Duration {
        match self.normalize() {
            UpdateRate::Native => Duration::ZERO,
            UpdateRate::Window { ms } => Duration::from_millis(ms),
            UpdateRate::Max { hz: 0 } => Duration::ZERO,
            UpdateRate::Max { hz } => Duration::from_nanos(1_000_000_000 / u64::from(hz)),
        }
    }

    /// Check if throttling is needed
    pub fn needs_throttle(self) -> bool {
        !self.window().is_zero()
    }

    /// Get throttle interval if needed
    pub fn throttle_interval(self) -> Option<Duration> {
        let window = self.window();
        (!window.is_zero()).then_some(window)
    }
}
