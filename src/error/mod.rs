//! Error types for the self-tuning core.
//!
//! This module defines a hierarchical error system:
//! - [`AppError`]: Top-level application errors
//! - [`ConfigError`]: Configuration loading and validation errors
//! - [`ObserverError`]: Failures raised by action observers
//! - [`CommandError`]: Host protocol (stdio JSON-lines) errors
//!
//! Non-finite samples, insufficient data and history overflow are *not*
//! errors: they are reported through counters and status values instead.
//!
//! All errors implement `Send + Sync` for async compatibility.

use thiserror::Error;

/// Top-level application error.
///
/// Wraps all subsystem errors for unified handling in the host binary.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Observer error.
    #[error("Observer error: {0}")]
    Observer(#[from] ObserverError),

    /// Host protocol error.
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// I/O failure on the host transport.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O failure.
        message: String,
    },
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Configuration errors.
///
/// Any value outside its valid range is rejected at construction time; the
/// loop refuses to start rather than run with invalid tuning parameters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required configuration is missing.
    #[error("Missing required: {var}")]
    MissingRequired {
        /// The missing variable name.
        var: String,
    },

    /// Configuration value is invalid.
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue {
        /// The variable name.
        var: String,
        /// Why the value is invalid.
        reason: String,
    },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidValue`].
    #[must_use]
    pub fn invalid(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by observers subscribed to feedback actions.
///
/// These never reach the caller of `emit_signal`; the feedback manager logs
/// them per observer and keeps going.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObserverError {
    /// The observer reported a failure.
    #[error("Observer {observer} failed: {message}")]
    Failed {
        /// Observer label.
        observer: String,
        /// Description of the failure.
        message: String,
    },

    /// The observer panicked while handling an action.
    #[error("Observer {observer} panicked: {message}")]
    Panicked {
        /// Observer label.
        observer: String,
        /// Panic payload, if it was a string.
        message: String,
    },
}

/// Host protocol errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The input line was not valid JSON for any known command.
    #[error("Invalid command: {message}")]
    InvalidJson {
        /// Parser message.
        message: String,
    },

    /// A command referenced a loop type that does not exist.
    #[error("Unknown loop type: {loop_type}")]
    UnknownLoopType {
        /// The loop type as given.
        loop_type: String,
    },

    /// A payload did not match the loop type it was sent for.
    #[error("Payload does not match loop type {loop_type}")]
    PayloadMismatch {
        /// The loop type the payload was sent for.
        loop_type: String,
    },

    /// The command line exceeded the configured maximum size.
    #[error("Command too large: {size} bytes (max {max})")]
    TooLarge {
        /// Size of the rejected line.
        size: usize,
        /// Configured maximum.
        max: usize,
    },
}
