//! Throttle configuration loaded from YAML.
//!
//! ```yaml
//! rate:
//!   mode: window
//!   ms: 250
//! idle_key_limit: 1024
//! channel_capacity: 32
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::{Result, ThrottleError, UpdateRate};

/// Default bound for the channel between a driver task and its subscriber.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Settings for a throttled subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThrottleConfig {
    /// Minimum spacing between deliveries that share a key.
    pub rate: UpdateRate,

    /// Evict idle per-key state once more than this many keys are tracked.
    pub idle_key_limit: Option<usize>,

    /// Buffer size used when a subscription is driven on its own task.
    pub channel_capacity: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            rate: UpdateRate::Native,
            idle_key_limit: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ThrottleConfig {
    /// Config with the given rate and default limits.
    pub fn new(rate: UpdateRate) -> Self {
        Self { rate, ..Self::default() }
    }

    /// Parse and validate YAML config text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(text)?;
        config.validate()?;
        debug!("Loaded throttle config: {:?}", config);
        Ok(config)
    }

    /// Read, parse and validate a YAML config file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ThrottleError::file_error(path.to_path_buf(), source))?;
        Self::from_yaml(&text)
    }

    /// Reject values no stream can honor.
    pub fn validate(&self) -> Result<()> {
        if let UpdateRate::Max { hz: 0 } = self.rate {
            return Err(ThrottleError::invalid_config("rate.hz", "must be greater than zero"));
        }
        if self.idle_key_limit == Some(0) {
            return Err(ThrottleError::invalid_config(
                "idle_key_limit",
                "must be greater than zero",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ThrottleError::invalid_config(
                "channel_capacity",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Minimum spacing between deliveries that share a key.
    pub fn window(&self) -> Duration {
        self.rate.window()
    }
}
