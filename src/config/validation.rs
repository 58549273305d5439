//! Configuration validation.
//!
//! This module provides validation logic for configuration values,
//! ensuring they are within acceptable ranges. Variable names in errors use
//! the environment variable where one exists and a dotted field path
//! otherwise.

use super::{AutotuneConfig, DynamicConfig, FeedbackConfig, ThresholdConfig};
use crate::error::ConfigError;

/// Maximum allowed points per metric key.
pub const MAX_BUFFER_CAPACITY: usize = 1_000_000;

/// Maximum allowed interval or TTL in seconds (30 days).
pub const MAX_INTERVAL_SECS: u64 = 30 * 24 * 3_600;

/// Maximum allowed host command line size in bytes (16 MiB).
pub const MAX_COMMAND_BYTES_LIMIT: usize = 16 * 1024 * 1024;

fn ensure(condition: bool, var: &str, reason: impl FnOnce() -> String) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::invalid(var, reason()))
    }
}

fn ensure_positive(value: f64, var: &str) -> Result<(), ConfigError> {
    ensure(value.is_finite() && value > 0.0, var, || {
        "must be a finite number greater than 0".to_string()
    })
}

fn ensure_unit(value: f64, var: &str) -> Result<(), ConfigError> {
    ensure((0.0..=1.0).contains(&value), var, || {
        "must be between 0 and 1".to_string()
    })
}

fn ensure_percent(value: f64, var: &str) -> Result<(), ConfigError> {
    ensure(value > 0.0 && value <= 100.0, var, || {
        "must be in (0, 100]".to_string()
    })
}

fn ensure_below(lower: f64, upper: f64, var: &str, upper_var: &str) -> Result<(), ConfigError> {
    ensure(lower < upper, var, || format!("must be lower than {upper_var}"))
}

fn ensure_interval(value: u64, var: &str) -> Result<(), ConfigError> {
    ensure(value <= MAX_INTERVAL_SECS, var, || {
        format!("must be at most {MAX_INTERVAL_SECS} seconds")
    })
}

/// Validate threshold optimizer settings.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] naming the first offending value.
#[must_use = "validation result should be checked"]
pub fn validate_thresholds(config: &ThresholdConfig) -> Result<(), ConfigError> {
    ensure(
        config.buffer_capacity > 0 && config.buffer_capacity <= MAX_BUFFER_CAPACITY,
        "AUTOTUNE_BUFFER_CAPACITY",
        || format!("must be between 1 and {MAX_BUFFER_CAPACITY}"),
    )?;
    ensure_interval(config.stats_cache_ttl_secs, "AUTOTUNE_STATS_TTL_SECS")?;
    ensure_interval(
        config.optimization_interval_secs,
        "AUTOTUNE_OPTIMIZATION_INTERVAL_SECS",
    )?;
    ensure(
        config.min_data_points > 0 && config.min_data_points <= config.buffer_capacity,
        "AUTOTUNE_MIN_DATA_POINTS",
        || "must be between 1 and the buffer capacity".to_string(),
    )?;
    ensure(
        config.trend_epsilon > 0.0 && config.trend_epsilon < 1.0,
        "thresholds.trend_epsilon",
        || "must be in (0, 1)".to_string(),
    )?;
    ensure_positive(config.sigma_k, "AUTOTUNE_SIGMA_K")?;
    ensure_positive(config.iqr_multiplier, "thresholds.iqr_multiplier")?;
    ensure_percent(config.threshold_percentile, "thresholds.threshold_percentile")?;
    ensure_positive(config.dispersion_ratio, "thresholds.dispersion_ratio")?;
    ensure(
        config.confidence_target_points > 0,
        "thresholds.confidence_target_points",
        || "must be at least 1".to_string(),
    )?;
    ensure(config.history_cap > 0, "thresholds.history_cap", || {
        "must be at least 1".to_string()
    })?;
    ensure_positive(config.anomaly_sensitivity, "AUTOTUNE_ANOMALY_SENSITIVITY")
}

/// Validate dynamic optimizer settings.
///
/// Degraded cutoffs must sit strictly below their critical counterparts.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] naming the first offending value.
#[must_use = "validation result should be checked"]
pub fn validate_dynamic(config: &DynamicConfig) -> Result<(), ConfigError> {
    ensure(
        config.hysteresis_cycles >= 1,
        "AUTOTUNE_HYSTERESIS_CYCLES",
        || "must be at least 1".to_string(),
    )?;
    ensure_unit(config.critical_error_rate, "AUTOTUNE_CRITICAL_ERROR_RATE")?;
    ensure_unit(config.degraded_error_rate, "AUTOTUNE_DEGRADED_ERROR_RATE")?;
    ensure_positive(config.critical_p99_latency_ms, "AUTOTUNE_CRITICAL_P99_MS")?;
    ensure_positive(config.degraded_p99_latency_ms, "AUTOTUNE_DEGRADED_P99_MS")?;
    ensure_percent(config.critical_cpu_usage, "dynamic.critical_cpu_usage")?;
    ensure_percent(config.degraded_cpu_usage, "dynamic.degraded_cpu_usage")?;
    ensure_percent(config.critical_memory_usage, "dynamic.critical_memory_usage")?;
    ensure_percent(config.degraded_memory_usage, "dynamic.degraded_memory_usage")?;

    ensure_below(
        config.degraded_error_rate,
        config.critical_error_rate,
        "AUTOTUNE_DEGRADED_ERROR_RATE",
        "AUTOTUNE_CRITICAL_ERROR_RATE",
    )?;
    ensure_below(
        config.degraded_p99_latency_ms,
        config.critical_p99_latency_ms,
        "AUTOTUNE_DEGRADED_P99_MS",
        "AUTOTUNE_CRITICAL_P99_MS",
    )?;
    ensure_below(
        config.degraded_cpu_usage,
        config.critical_cpu_usage,
        "dynamic.degraded_cpu_usage",
        "dynamic.critical_cpu_usage",
    )?;
    ensure_below(
        config.degraded_memory_usage,
        config.critical_memory_usage,
        "dynamic.degraded_memory_usage",
        "dynamic.critical_memory_usage",
    )?;

    ensure_unit(config.recovery_quality, "dynamic.recovery_quality")?;
    ensure(
        config.transition_history_cap > 0,
        "dynamic.transition_history_cap",
        || "must be at least 1".to_string(),
    )?;
    ensure(
        config.performance_history_cap > 0,
        "dynamic.performance_history_cap",
        || "must be at least 1".to_string(),
    )
}

/// Validate feedback manager settings.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] naming the first offending value.
#[must_use = "validation result should be checked"]
pub fn validate_feedback(config: &FeedbackConfig) -> Result<(), ConfigError> {
    ensure(
        config.signal_history_cap > 0,
        "AUTOTUNE_SIGNAL_HISTORY_CAP",
        || "must be at least 1".to_string(),
    )?;
    ensure(
        config.action_history_cap > 0,
        "AUTOTUNE_ACTION_HISTORY_CAP",
        || "must be at least 1".to_string(),
    )?;
    ensure_positive(config.sensitivity_step, "feedback.sensitivity_step")?;
    ensure_positive(config.min_sensitivity, "feedback.min_sensitivity")?;
    ensure(
        config.min_sensitivity <= config.max_sensitivity,
        "feedback.min_sensitivity",
        || "must not exceed feedback.max_sensitivity".to_string(),
    )?;
    ensure_positive(config.learning_rate_step, "feedback.learning_rate_step")?;
    ensure_positive(config.min_learning_rate, "feedback.min_learning_rate")?;
    ensure(
        config.min_learning_rate <= config.max_learning_rate && config.max_learning_rate <= 1.0,
        "feedback.max_learning_rate",
        || "must be between feedback.min_learning_rate and 1".to_string(),
    )?;
    ensure_positive(
        config.decision_error_tolerance,
        "feedback.decision_error_tolerance",
    )?;
    ensure_unit(config.min_signal_confidence, "feedback.min_signal_confidence")?;
    ensure_unit(config.low_pressure, "feedback.low_pressure")?;
    ensure_unit(config.high_pressure, "feedback.high_pressure")?;
    ensure_below(
        config.low_pressure,
        config.high_pressure,
        "feedback.low_pressure",
        "feedback.high_pressure",
    )?;
    ensure(config.max_parallelism >= 1, "feedback.max_parallelism", || {
        "must be at least 1".to_string()
    })
}

/// Validate configuration values.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] if any value is out of range,
/// including the cross-component rule that the initial anomaly sensitivity
/// sits inside the feedback sensitivity bounds.
#[must_use = "validation result should be checked"]
pub fn validate_config(config: &AutotuneConfig) -> Result<(), ConfigError> {
    validate_thresholds(&config.thresholds)?;
    validate_dynamic(&config.dynamic)?;
    validate_feedback(&config.feedback)?;

    let sensitivity = config.thresholds.anomaly_sensitivity;
    ensure(
        sensitivity >= config.feedback.min_sensitivity
            && sensitivity <= config.feedback.max_sensitivity,
        "AUTOTUNE_ANOMALY_SENSITIVITY",
        || {
            format!(
                "must be between {} and {}",
                config.feedback.min_sensitivity, config.feedback.max_sensitivity
            )
        },
    )?;

    ensure(
        config.cycle_tick_secs >= 1 && config.cycle_tick_secs <= MAX_INTERVAL_SECS,
        "AUTOTUNE_CYCLE_TICK_SECS",
        || format!("must be between 1 and {MAX_INTERVAL_SECS} seconds"),
    )?;
    ensure(
        config.max_command_bytes > 0 && config.max_command_bytes <= MAX_COMMAND_BYTES_LIMIT,
        "AUTOTUNE_MAX_COMMAND_BYTES",
        || format!("must be between 1 and {MAX_COMMAND_BYTES_LIMIT}"),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn var_of(err: ConfigError) -> String {
        match err {
            ConfigError::InvalidValue { var, .. } | ConfigError::MissingRequired { var } => var,
        }
    }

    #[test]
    fn test_valid_default_config() {
        assert!(validate_config(&AutotuneConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_buffer_capacity() {
        let config = ThresholdConfig {
            buffer_capacity: 0,
            ..ThresholdConfig::default()
        };
        let err = validate_thresholds(&config).unwrap_err();
        assert_eq!(var_of(err), "AUTOTUNE_BUFFER_CAPACITY");
    }

    #[test]
    fn test_min_points_above_capacity() {
        let config = ThresholdConfig {
            buffer_capacity: 50,
            min_data_points: 100,
            ..ThresholdConfig::default()
        };
        let err = validate_thresholds(&config).unwrap_err();
        assert_eq!(var_of(err), "AUTOTUNE_MIN_DATA_POINTS");
    }

    #[test]
    fn test_percentile_out_of_range() {
        let config = ThresholdConfig {
            threshold_percentile: 120.0,
            ..ThresholdConfig::default()
        };
        let err = validate_thresholds(&config).unwrap_err();
        assert_eq!(var_of(err), "thresholds.threshold_percentile");
    }

    #[test]
    fn test_nan_sigma_rejected() {
        let config = ThresholdConfig {
            sigma_k: f64::NAN,
            ..ThresholdConfig::default()
        };
        let err = validate_thresholds(&config).unwrap_err();
        assert_eq!(var_of(err), "AUTOTUNE_SIGMA_K");
    }

    #[test]
    fn test_zero_hysteresis() {
        let config = DynamicConfig {
            hysteresis_cycles: 0,
            ..DynamicConfig::default()
        };
        let err = validate_dynamic(&config).unwrap_err();
        assert_eq!(var_of(err), "AUTOTUNE_HYSTERESIS_CYCLES");
    }

    #[test]
    fn test_inverted_latency_cutoffs() {
        let config = DynamicConfig {
            degraded_p99_latency_ms: 2_000.0,
            ..DynamicConfig::default()
        };
        let err = validate_dynamic(&config).unwrap_err();
        assert_eq!(var_of(err), "AUTOTUNE_DEGRADED_P99_MS");
    }

    #[test]
    fn test_inverted_pressure_bounds() {
        let config = FeedbackConfig {
            low_pressure: 0.9,
            high_pressure: 0.5,
            ..FeedbackConfig::default()
        };
        let err = validate_feedback(&config).unwrap_err();
        assert_eq!(var_of(err), "feedback.low_pressure");
    }

    #[test]
    fn test_sensitivity_outside_feedback_bounds() {
        let mut config = AutotuneConfig::default();
        config.thresholds.anomaly_sensitivity = 10.0;
        let err = validate_config(&config).unwrap_err();
        assert_eq!(var_of(err), "AUTOTUNE_ANOMALY_SENSITIVITY");
    }

    #[test]
    fn test_zero_cycle_tick() {
        let config = AutotuneConfig {
            cycle_tick_secs: 0,
            ..AutotuneConfig::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert_eq!(var_of(err), "AUTOTUNE_CYCLE_TICK_SECS");
    }

    #[test]
    fn test_interval_too_long() {
        let config = ThresholdConfig {
            optimization_interval_secs: MAX_INTERVAL_SECS + 1,
            ..ThresholdConfig::default()
        };
        let err = validate_thresholds(&config).unwrap_err();
        assert_eq!(var_of(err), "AUTOTUNE_OPTIMIZATION_INTERVAL_SECS");
    }
}
