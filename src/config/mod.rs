//! Configuration management.
//!
//! This module handles:
//! - Environment variable loading
//! - Configuration validation
//! - Default value handling
//!
//! # Example
//!
//! ```
//! use mape_autotune::config::{validate_config, AutotuneConfig};
//!
//! // Defaults are always valid; use AutotuneConfig::from_env() in production
//! let config = AutotuneConfig::default();
//! assert!(validate_config(&config).is_ok());
//! assert_eq!(config.thresholds.buffer_capacity, 10_000);
//! ```

mod tuning;
mod validation;

pub use tuning::{
    DynamicConfig, FeedbackConfig, ThresholdConfig, DEFAULT_ACTION_HISTORY_CAP,
    DEFAULT_ANOMALY_SENSITIVITY, DEFAULT_BUFFER_CAPACITY, DEFAULT_CONFIDENCE_TARGET_POINTS,
    DEFAULT_CRITICAL_CPU_USAGE, DEFAULT_CRITICAL_ERROR_RATE, DEFAULT_CRITICAL_MEMORY_USAGE,
    DEFAULT_CRITICAL_P99_LATENCY_MS, DEFAULT_DECISION_ERROR_TOLERANCE,
    DEFAULT_DEGRADED_CPU_USAGE, DEFAULT_DEGRADED_ERROR_RATE, DEFAULT_DEGRADED_MEMORY_USAGE,
    DEFAULT_DEGRADED_P99_LATENCY_MS, DEFAULT_DISPERSION_RATIO, DEFAULT_HIGH_PRESSURE,
    DEFAULT_HYSTERESIS_CYCLES, DEFAULT_IQR_MULTIPLIER, DEFAULT_LEARNING_RATE_STEP,
    DEFAULT_LOW_PRESSURE, DEFAULT_MAX_LEARNING_RATE, DEFAULT_MAX_PARALLELISM,
    DEFAULT_MAX_SENSITIVITY, DEFAULT_MIN_DATA_POINTS, DEFAULT_MIN_LEARNING_RATE,
    DEFAULT_MIN_SENSITIVITY, DEFAULT_MIN_SIGNAL_CONFIDENCE, DEFAULT_OPTIMIZATION_HISTORY_CAP,
    DEFAULT_OPTIMIZATION_INTERVAL_SECS, DEFAULT_PERFORMANCE_HISTORY_CAP,
    DEFAULT_RECOVERY_QUALITY, DEFAULT_SENSITIVITY_STEP, DEFAULT_SIGMA_K,
    DEFAULT_SIGNAL_HISTORY_CAP, DEFAULT_STATS_CACHE_TTL_SECS, DEFAULT_THRESHOLD_PERCENTILE,
    DEFAULT_TRANSITION_HISTORY_CAP, DEFAULT_TREND_EPSILON,
};
pub use validation::{
    validate_config, validate_dynamic, validate_feedback, validate_thresholds,
    MAX_BUFFER_CAPACITY, MAX_COMMAND_BYTES_LIMIT, MAX_INTERVAL_SECS,
};

use crate::error::ConfigError;
use std::time::Duration;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default seconds between host optimization ticks.
pub const DEFAULT_CYCLE_TICK_SECS: u64 = 60;

/// Default maximum size of one host command line in bytes.
pub const DEFAULT_MAX_COMMAND_BYTES: usize = 64 * 1024;

/// Complete configuration for the self-tuning loop.
///
/// Use [`AutotuneConfig::from_env`] to load it from environment variables,
/// or start from [`AutotuneConfig::default`] and adjust fields directly.
#[derive(Debug, Clone, PartialEq)]
pub struct AutotuneConfig {
    /// Threshold optimizer settings.
    pub thresholds: ThresholdConfig,
    /// Dynamic parameter optimizer settings.
    pub dynamic: DynamicConfig,
    /// Feedback manager settings.
    pub feedback: FeedbackConfig,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: String,
    /// Seconds between host optimization ticks.
    pub cycle_tick_secs: u64,
    /// Maximum size of one host command line in bytes.
    pub max_command_bytes: usize,
}

impl Default for AutotuneConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdConfig::default(),
            dynamic: DynamicConfig::default(),
            feedback: FeedbackConfig::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            cycle_tick_secs: DEFAULT_CYCLE_TICK_SECS,
            max_command_bytes: DEFAULT_MAX_COMMAND_BYTES,
        }
    }
}

impl AutotuneConfig {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional and falls back to its `DEFAULT_*` value:
    /// - `LOG_LEVEL`: Logging level (default: `info`)
    /// - `AUTOTUNE_CYCLE_TICK_SECS`: Host optimization tick (default: `60`)
    /// - `AUTOTUNE_MAX_COMMAND_BYTES`: Host command size limit (default: `65536`)
    /// - `AUTOTUNE_BUFFER_CAPACITY`: Points per metric key (default: `10000`)
    /// - `AUTOTUNE_STATS_TTL_SECS`: Statistics cache TTL (default: `60`)
    /// - `AUTOTUNE_OPTIMIZATION_INTERVAL_SECS`: Per-key interval (default: `3600`)
    /// - `AUTOTUNE_MIN_DATA_POINTS`: Points before optimizing (default: `100`)
    /// - `AUTOTUNE_SIGMA_K`: Sigma multiplier (default: `2.0`)
    /// - `AUTOTUNE_ANOMALY_SENSITIVITY`: Initial sensitivity (default: `2.0`)
    /// - `AUTOTUNE_HYSTERESIS_CYCLES`: Cycles before commit (default: `2`)
    /// - `AUTOTUNE_CRITICAL_ERROR_RATE`: Critical error rate (default: `0.10`)
    /// - `AUTOTUNE_CRITICAL_P99_MS`: Critical p99 latency (default: `1000`)
    /// - `AUTOTUNE_DEGRADED_ERROR_RATE`: Degraded error rate (default: `0.05`)
    /// - `AUTOTUNE_DEGRADED_P99_MS`: Degraded p99 latency (default: `500`)
    /// - `AUTOTUNE_SIGNAL_HISTORY_CAP`: Signal history size (default: `10000`)
    /// - `AUTOTUNE_ACTION_HISTORY_CAP`: Action history size (default: `5000`)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable does not parse or
    /// any value fails validation (see [`validate_config`]).
    #[must_use = "configuration should be used"]
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let defaults = Self::default();

        let thresholds = ThresholdConfig {
            buffer_capacity: parse_env_usize(
                "AUTOTUNE_BUFFER_CAPACITY",
                defaults.thresholds.buffer_capacity,
            )?,
            stats_cache_ttl_secs: parse_env_u64(
                "AUTOTUNE_STATS_TTL_SECS",
                defaults.thresholds.stats_cache_ttl_secs,
            )?,
            optimization_interval_secs: parse_env_u64(
                "AUTOTUNE_OPTIMIZATION_INTERVAL_SECS",
                defaults.thresholds.optimization_interval_secs,
            )?,
            min_data_points: parse_env_usize(
                "AUTOTUNE_MIN_DATA_POINTS",
                defaults.thresholds.min_data_points,
            )?,
            sigma_k: parse_env_f64("AUTOTUNE_SIGMA_K", defaults.thresholds.sigma_k)?,
            anomaly_sensitivity: parse_env_f64(
                "AUTOTUNE_ANOMALY_SENSITIVITY",
                defaults.thresholds.anomaly_sensitivity,
            )?,
            ..defaults.thresholds
        };

        let dynamic = DynamicConfig {
            hysteresis_cycles: parse_env_u32(
                "AUTOTUNE_HYSTERESIS_CYCLES",
                defaults.dynamic.hysteresis_cycles,
            )?,
            critical_error_rate: parse_env_f64(
                "AUTOTUNE_CRITICAL_ERROR_RATE",
                defaults.dynamic.critical_error_rate,
            )?,
            critical_p99_latency_ms: parse_env_f64(
                "AUTOTUNE_CRITICAL_P99_MS",
                defaults.dynamic.critical_p99_latency_ms,
            )?,
            degraded_error_rate: parse_env_f64(
                "AUTOTUNE_DEGRADED_ERROR_RATE",
                defaults.dynamic.degraded_error_rate,
            )?,
            degraded_p99_latency_ms: parse_env_f64(
                "AUTOTUNE_DEGRADED_P99_MS",
                defaults.dynamic.degraded_p99_latency_ms,
            )?,
            ..defaults.dynamic
        };

        let feedback = FeedbackConfig {
            signal_history_cap: parse_env_usize(
                "AUTOTUNE_SIGNAL_HISTORY_CAP",
                defaults.feedback.signal_history_cap,
            )?,
            action_history_cap: parse_env_usize(
                "AUTOTUNE_ACTION_HISTORY_CAP",
                defaults.feedback.action_history_cap,
            )?,
            ..defaults.feedback
        };

        let config = Self {
            thresholds,
            dynamic,
            feedback,
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            cycle_tick_secs: parse_env_u64("AUTOTUNE_CYCLE_TICK_SECS", defaults.cycle_tick_secs)?,
            max_command_bytes: parse_env_usize(
                "AUTOTUNE_MAX_COMMAND_BYTES",
                defaults.max_command_bytes,
            )?,
        };

        validate_config(&config)?;
        Ok(config)
    }

    /// Host optimization tick as a duration.
    #[must_use]
    pub const fn cycle_tick(&self) -> Duration {
        Duration::from_secs(self.cycle_tick_secs)
    }
}

/// Parse an environment variable as u64, using a default if not set.
fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        val.trim()
            .parse()
            .map_err(|_| ConfigError::invalid(name, "must be a non-negative integer"))
    })
}

/// Parse an environment variable as u32, using a default if not set.
fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        val.trim()
            .parse()
            .map_err(|_| ConfigError::invalid(name, "must be a non-negative integer"))
    })
}

/// Parse an environment variable as usize, using a default if not set.
fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        val.trim()
            .parse()
            .map_err(|_| ConfigError::invalid(name, "must be a non-negative integer"))
    })
}

/// Parse an environment variable as a finite f64, using a default if not set.
fn parse_env_f64(name: &str, default: f64) -> Result<f64, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        match val.trim().parse::<f64>() {
            Ok(parsed) if parsed.is_finite() => Ok(parsed),
            _ => Err(ConfigError::invalid(name, "must be a finite number")),
        }
    })
}
