//! Trait definitions for mockable dependencies.
//!
//! This module defines traits for:
//! - [`TimeProvider`]: Time abstraction for testing
//! - [`ActionObserver`]: Receiver of feedback actions
//!
//! # Mocking
//!
//! All traits are annotated with `#[cfg_attr(test, mockall::automock)]`
//! which generates mock implementations automatically for testing.
//! Integration tests and replays that need to drive time by hand use
//! [`ManualTimeProvider`].
//!
//! # Example
//!
//! ```
//! use mape_autotune::traits::{ManualTimeProvider, RealTimeProvider, TimeProvider};
//!
//! let time_provider = RealTimeProvider;
//! let now = time_provider.now();
//!
//! let manual = ManualTimeProvider::new(now);
//! manual.advance(chrono::Duration::seconds(30));
//! assert_eq!(manual.now() - now, chrono::Duration::seconds(30));
//! ```

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::error::ObserverError;
use crate::feedback::Action;

/// Time provider trait for deterministic testing.
///
/// Every timestamp the core records (points, recommendations, transitions,
/// signals, actions) comes from one of these.
#[cfg_attr(test, mockall::automock)]
pub trait TimeProvider: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Real time provider using system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Time provider that only moves when told to.
#[derive(Debug)]
pub struct ManualTimeProvider {
    now: Mutex<DateTime<Utc>>,
}

impl ManualTimeProvider {
    /// Create a provider frozen at `start`.
    #[must_use]
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward (or backward, for a negative duration).
    pub fn advance(&self, by: Duration) {
        let mut now = self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *now += by;
    }

    /// Jump the clock to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        let mut now = self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *now = at;
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        *self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Receiver of actions produced by the feedback manager.
///
/// Observers run synchronously on the emitting thread. An `Err` or a panic
/// is caught, logged, and counted against this observer only; it never
/// reaches the emitter or other observers.
#[cfg_attr(test, mockall::automock)]
pub trait ActionObserver: Send + Sync {
    /// Handle one applied action.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError`] when the observer could not process the
    /// action.
    fn on_action(&self, action: &Action) -> Result<(), ObserverError>;
}

impl<F> ActionObserver for F
where
    F: Fn(&Action) -> Result<(), ObserverError> + Send + Sync,
{
    fn on_action(&self, action: &Action) -> Result<(), ObserverError> {
        self(action)
    }
}
