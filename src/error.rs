//! Error types for throttle configuration.
//!
//! Errors raised by an upstream event source are never wrapped: a fallible
//! throttled stream yields the upstream's own error value unchanged. The types
//! here only cover problems the crate itself can detect, which means building a
//! throttle from configuration.
//!
//! ## Error Categories
//!
//! - **Config Errors**: A configuration value is out of range
//! - **Parse Errors**: Configuration text is not valid YAML for [`ThrottleConfig`]
//! - **File Errors**: A configuration file could not be read
//!
//! ```rust
//! use subthrottle::ThrottleError;
//!
//! let error = ThrottleError::invalid_config("rate.hz", "must be greater than zero");
//! assert!(!error.is_retryable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```
//!
//! [`ThrottleConfig`]: crate::ThrottleConfig

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for throttle operations.
pub type Result<T, E = ThrottleError> = std::result::Result<T, E>;

/// Main error type for throttle configuration.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ThrottleError {
    #[error("Invalid throttle configuration for '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Config file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ThrottleError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ThrottleError::InvalidConfig { .. } => false,
            ThrottleError::Parse { .. } => false,
            ThrottleError::File { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ThrottleError::InvalidConfig { .. } => vec![
                "Use a positive rate for max-hz throttling",
                "Use `mode: native` to disable throttling",
                "Check the idle key limit is greater than zero",
            ],
            ThrottleError::Parse { .. } => vec![
                "Check the YAML syntax of the configuration",
                "Verify the rate mode is one of native, window or max",
                "Remove unknown configuration keys",
            ],
            ThrottleError::File { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
        }
    }

    /// Helper constructor for configuration errors.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ThrottleError::InvalidConfig { field: field.into(), reason: reason.into() }
    }

    /// Helper constructor for parse errors.
    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        ThrottleError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        ThrottleError::File { path, source }
    }
}

impl From<serde_yaml_ng::Error> for ThrottleError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        ThrottleError::Parse { context: "throttle config".to_string(), details: err.to_string() }
    }
}
