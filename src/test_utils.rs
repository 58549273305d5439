//! Test utilities and fixtures.
//!
//! This module provides shared testing infrastructure:
//! - Time providers frozen at a known instant
//! - Small configurations that reach the data gate quickly
//! - A fully wired [`AutotuneLoop`] on a manual clock
//!
//! Only compiled for tests (`#[cfg(test)]`).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::config::{AutotuneConfig, DynamicConfig, ThresholdConfig};
use crate::control_loop::AutotuneLoop;
use crate::traits::{ManualTimeProvider, MockTimeProvider};

/// Instant every fixture clock starts at.
#[must_use]
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
}

/// Create a mock time provider that always returns `time`.
///
/// # Example
///
/// ```ignore
/// let mock = mock_time(fixed_time());
/// assert_eq!(mock.now(), fixed_time());
/// ```
#[must_use]
pub fn mock_time(time: DateTime<Utc>) -> MockTimeProvider {
    let mut mock = MockTimeProvider::new();
    mock.expect_now().return_const(time);
    mock
}

/// Create a mock time provider from an ISO 8601 timestamp string.
///
/// # Panics
///
/// Panics if the timestamp string is invalid.
#[must_use]
pub fn mock_time_str(timestamp: &str) -> MockTimeProvider {
    let time = timestamp
        .parse::<DateTime<Utc>>()
        .expect("Invalid timestamp format");
    mock_time(time)
}

/// Manual clock starting at [`fixed_time`].
#[must_use]
pub fn manual_clock() -> Arc<ManualTimeProvider> {
    Arc::new(ManualTimeProvider::new(fixed_time()))
}

/// Configuration with a low data gate and short interval.
#[must_use]
pub fn small_config() -> AutotuneConfig {
    AutotuneConfig {
        thresholds: ThresholdConfig {
            buffer_capacity: 200,
            min_data_points: 10,
            optimization_interval_secs: 60,
            ..ThresholdConfig::default()
        },
        dynamic: DynamicConfig::default(),
        ..AutotuneConfig::default()
    }
}

/// Loop built from `config` on a fresh manual clock.
#[must_use]
pub fn autotune_with_clock(config: AutotuneConfig) -> (Arc<ManualTimeProvider>, AutotuneLoop) {
    let clock = manual_clock();
    let autotune = AutotuneLoop::with_time_provider(config, clock.clone()).unwrap();
    (clock, autotune)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::TimeProvider;

    #[test]
    fn test_mock_time() {
        let mock = mock_time(fixed_time());
        assert_eq!(mock.now(), fixed_time());
    }

    #[test]
    fn test_mock_time_str() {
        let mock = mock_time_str("2024-01-15T12:00:00Z");
        assert_eq!(mock.now(), fixed_time());
    }

    #[test]
    fn test_small_config_is_valid() {
        assert!(crate::config::validate_config(&small_config()).is_ok());
    }

    #[test]
    fn test_autotune_with_clock_shares_clock() {
        let (clock, autotune) = autotune_with_clock(small_config());
        clock.advance(chrono::Duration::seconds(5));
        assert_eq!(autotune.config().thresholds.min_data_points, 10);
        assert_eq!(clock.now(), fixed_time() + chrono::Duration::seconds(5));
    }
}
