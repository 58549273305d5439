//! Tuning configuration for the three optimizer components.
//!
//! Every numeric cutoff used by the core lives here as deployment
//! configuration. The `DEFAULT_*` constants document the values the loop
//! ships with; none of them are hard requirements.
//!
//! # Example
//!
//! ```
//! use mape_autotune::config::{DynamicConfig, ThresholdConfig};
//!
//! let thresholds = ThresholdConfig::default();
//! assert_eq!(thresholds.min_data_points, 100);
//! assert!((thresholds.anomaly_sensitivity - 2.0).abs() < f64::EPSILON);
//!
//! let dynamic = DynamicConfig::default();
//! assert_eq!(dynamic.hysteresis_cycles, 2);
//! ```

use chrono::Duration;

// ============================================================================
// Threshold optimizer defaults
// ============================================================================

/// Default: points retained per metric key.
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

/// Default: statistics cache time-to-live in seconds.
pub const DEFAULT_STATS_CACHE_TTL_SECS: u64 = 60;

/// Default: relative change separating a trend from "stable" (5%).
pub const DEFAULT_TREND_EPSILON: f64 = 0.05;

/// Default: seconds between optimization passes for one key (1 hour).
pub const DEFAULT_OPTIMIZATION_INTERVAL_SECS: u64 = 3_600;

/// Default: minimum points before a key can be optimized.
pub const DEFAULT_MIN_DATA_POINTS: usize = 100;

/// Default: multiplier `k` in the Sigma strategy (mean + k·stdev).
pub const DEFAULT_SIGMA_K: f64 = 2.0;

/// Default: Tukey fence multiplier for the IQR strategy.
pub const DEFAULT_IQR_MULTIPLIER: f64 = 1.5;

/// Default: percentile used by the Percentile strategy.
pub const DEFAULT_THRESHOLD_PERCENTILE: f64 = 95.0;

/// Default: IQR/|mean| ratio above which data counts as high-dispersion.
pub const DEFAULT_DISPERSION_RATIO: f64 = 0.5;

/// Default: point count at which the volume term of confidence saturates.
pub const DEFAULT_CONFIDENCE_TARGET_POINTS: usize = 500;

/// Default: optimization history capacity.
pub const DEFAULT_OPTIMIZATION_HISTORY_CAP: usize = 1_000;

/// Default: anomaly sensitivity (stdev multiples).
pub const DEFAULT_ANOMALY_SENSITIVITY: f64 = 2.0;

// ============================================================================
// Dynamic optimizer defaults
// ============================================================================

/// Default: consecutive identical classifications needed to commit.
pub const DEFAULT_HYSTERESIS_CYCLES: u32 = 2;

/// Default: error rate at or above which the system is critical.
pub const DEFAULT_CRITICAL_ERROR_RATE: f64 = 0.10;

/// Default: p99 latency (ms) at or above which the system is critical.
pub const DEFAULT_CRITICAL_P99_LATENCY_MS: f64 = 1_000.0;

/// Default: error rate at or above which the system is degraded.
pub const DEFAULT_DEGRADED_ERROR_RATE: f64 = 0.05;

/// Default: p99 latency (ms) at or above which the system is degraded.
pub const DEFAULT_DEGRADED_P99_LATENCY_MS: f64 = 500.0;

/// Default: CPU utilisation (percent) at or above which the system is critical.
pub const DEFAULT_CRITICAL_CPU_USAGE: f64 = 80.0;

/// Default: memory utilisation (percent) at or above which the system is critical.
pub const DEFAULT_CRITICAL_MEMORY_USAGE: f64 = 85.0;

/// Default: CPU utilisation (percent) at or above which the system is degraded.
pub const DEFAULT_DEGRADED_CPU_USAGE: f64 = 60.0;

/// Default: memory utilisation (percent) at or above which the system is degraded.
pub const DEFAULT_DEGRADED_MEMORY_USAGE: f64 = 70.0;

/// Default: decision quality needed to leave the recovering state.
pub const DEFAULT_RECOVERY_QUALITY: f64 = 0.85;

/// Default: transition history capacity.
pub const DEFAULT_TRANSITION_HISTORY_CAP: usize = 500;

/// Default: performance snapshot history capacity.
pub const DEFAULT_PERFORMANCE_HISTORY_CAP: usize = 1_000;

// ============================================================================
// Feedback manager defaults
// ============================================================================

/// Default: signal history capacity.
pub const DEFAULT_SIGNAL_HISTORY_CAP: usize = 10_000;

/// Default: action history capacity.
pub const DEFAULT_ACTION_HISTORY_CAP: usize = 5_000;

/// Default: step applied to anomaly sensitivity per feedback signal.
pub const DEFAULT_SENSITIVITY_STEP: f64 = 0.1;

/// Default: lower bound for anomaly sensitivity.
pub const DEFAULT_MIN_SENSITIVITY: f64 = 0.5;

/// Default: upper bound for anomaly sensitivity.
pub const DEFAULT_MAX_SENSITIVITY: f64 = 5.0;

/// Default: step applied to the active learning rate.
pub const DEFAULT_LEARNING_RATE_STEP: f64 = 0.02;

/// Default: lower bound for learning rates.
pub const DEFAULT_MIN_LEARNING_RATE: f64 = 0.01;

/// Default: upper bound for learning rates.
pub const DEFAULT_MAX_LEARNING_RATE: f64 = 0.5;

/// Default: relative prediction error tolerated before retuning.
pub const DEFAULT_DECISION_ERROR_TOLERANCE: f64 = 0.10;

/// Default: confidence a metrics-learning signal needs to be acted on.
pub const DEFAULT_MIN_SIGNAL_CONFIDENCE: f64 = 0.5;

/// Default: resource pressure at or above which parallelism shrinks.
pub const DEFAULT_HIGH_PRESSURE: f64 = 0.8;

/// Default: resource pressure at or below which parallelism grows.
pub const DEFAULT_LOW_PRESSURE: f64 = 0.3;

/// Default: hard ceiling on execution parallelism.
pub const DEFAULT_MAX_PARALLELISM: u32 = 8;

/// Converts configured seconds into a chrono duration, saturating.
fn secs(value: u64) -> Duration {
    let value = i64::try_from(value).unwrap_or(i64::MAX);
    Duration::try_seconds(value).unwrap_or(Duration::MAX)
}

/// Configuration for the self-learning threshold optimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdConfig {
    /// Points retained per metric key.
    pub buffer_capacity: usize,
    /// Statistics cache time-to-live in seconds.
    pub stats_cache_ttl_secs: u64,
    /// Relative change separating increasing/decreasing from stable.
    pub trend_epsilon: f64,
    /// Seconds between optimization passes for one key.
    pub optimization_interval_secs: u64,
    /// Minimum points before a key is optimized.
    pub min_data_points: usize,
    /// Sigma strategy multiplier.
    pub sigma_k: f64,
    /// IQR strategy fence multiplier.
    pub iqr_multiplier: f64,
    /// Percentile strategy percentile (0-100].
    pub threshold_percentile: f64,
    /// IQR/|mean| ratio that marks data as high-dispersion.
    pub dispersion_ratio: f64,
    /// Point count at which the volume confidence term saturates.
    pub confidence_target_points: usize,
    /// Optimization history capacity.
    pub history_cap: usize,
    /// Initial anomaly sensitivity.
    pub anomaly_sensitivity: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            stats_cache_ttl_secs: DEFAULT_STATS_CACHE_TTL_SECS,
            trend_epsilon: DEFAULT_TREND_EPSILON,
            optimization_interval_secs: DEFAULT_OPTIMIZATION_INTERVAL_SECS,
            min_data_points: DEFAULT_MIN_DATA_POINTS,
            sigma_k: DEFAULT_SIGMA_K,
            iqr_multiplier: DEFAULT_IQR_MULTIPLIER,
            threshold_percentile: DEFAULT_THRESHOLD_PERCENTILE,
            dispersion_ratio: DEFAULT_DISPERSION_RATIO,
            confidence_target_points: DEFAULT_CONFIDENCE_TARGET_POINTS,
            history_cap: DEFAULT_OPTIMIZATION_HISTORY_CAP,
            anomaly_sensitivity: DEFAULT_ANOMALY_SENSITIVITY,
        }
    }
}

impl ThresholdConfig {
    /// Statistics cache TTL as a duration.
    #[must_use]
    pub fn stats_cache_ttl(&self) -> Duration {
        secs(self.stats_cache_ttl_secs)
    }

    /// Optimization interval as a duration.
    #[must_use]
    pub fn optimization_interval(&self) -> Duration {
        secs(self.optimization_interval_secs)
    }
}

/// Configuration for the state-based dynamic parameter optimizer.
///
/// Rules are evaluated in a fixed order (critical, degraded, recovering,
/// optimizing, healthy), so a value sitting exactly on a cutoff always
/// resolves toward the more cautious state.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicConfig {
    /// Consecutive identical classifications needed before committing.
    pub hysteresis_cycles: u32,
    /// Critical error rate cutoff (0-1).
    pub critical_error_rate: f64,
    /// Critical p99 latency cutoff in milliseconds.
    pub critical_p99_latency_ms: f64,
    /// Degraded error rate cutoff (0-1).
    pub degraded_error_rate: f64,
    /// Degraded p99 latency cutoff in milliseconds.
    pub degraded_p99_latency_ms: f64,
    /// Critical CPU cutoff (percent).
    pub critical_cpu_usage: f64,
    /// Critical memory cutoff (percent).
    pub critical_memory_usage: f64,
    /// Degraded CPU cutoff (percent).
    pub degraded_cpu_usage: f64,
    /// Degraded memory cutoff (percent).
    pub degraded_memory_usage: f64,
    /// Decision quality needed to leave recovering.
    pub recovery_quality: f64,
    /// Transition history capacity.
    pub transition_history_cap: usize,
    /// Performance snapshot history capacity.
    pub performance_history_cap: usize,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self {
            hysteresis_cycles: DEFAULT_HYSTERESIS_CYCLES,
            critical_error_rate: DEFAULT_CRITICAL_ERROR_RATE,
            critical_p99_latency_ms: DEFAULT_CRITICAL_P99_LATENCY_MS,
            degraded_error_rate: DEFAULT_DEGRADED_ERROR_RATE,
            degraded_p99_latency_ms: DEFAULT_DEGRADED_P99_LATENCY_MS,
            critical_cpu_usage: DEFAULT_CRITICAL_CPU_USAGE,
            critical_memory_usage: DEFAULT_CRITICAL_MEMORY_USAGE,
            degraded_cpu_usage: DEFAULT_DEGRADED_CPU_USAGE,
            degraded_memory_usage: DEFAULT_DEGRADED_MEMORY_USAGE,
            recovery_quality: DEFAULT_RECOVERY_QUALITY,
            transition_history_cap: DEFAULT_TRANSITION_HISTORY_CAP,
            performance_history_cap: DEFAULT_PERFORMANCE_HISTORY_CAP,
        }
    }
}

/// Configuration for the feedback loop manager.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackConfig {
    /// Signal history capacity.
    pub signal_history_cap: usize,
    /// Action history capacity.
    pub action_history_cap: usize,
    /// Sensitivity step per anomaly feedback signal.
    pub sensitivity_step: f64,
    /// Lower sensitivity bound.
    pub min_sensitivity: f64,
    /// Upper sensitivity bound.
    pub max_sensitivity: f64,
    /// Learning rate step per decision quality signal.
    pub learning_rate_step: f64,
    /// Lower learning rate bound.
    pub min_learning_rate: f64,
    /// Upper learning rate bound.
    pub max_learning_rate: f64,
    /// Relative prediction error tolerated before retuning.
    pub decision_error_tolerance: f64,
    /// Confidence a metrics-learning signal needs to be acted on.
    pub min_signal_confidence: f64,
    /// Pressure at or above which parallelism shrinks.
    pub high_pressure: f64,
    /// Pressure at or below which parallelism grows.
    pub low_pressure: f64,
    /// Hard ceiling on execution parallelism.
    pub max_parallelism: u32,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            signal_history_cap: DEFAULT_SIGNAL_HISTORY_CAP,
            action_history_cap: DEFAULT_ACTION_HISTORY_CAP,
            sensitivity_step: DEFAULT_SENSITIVITY_STEP,
            min_sensitivity: DEFAULT_MIN_SENSITIVITY,
            max_sensitivity: DEFAULT_MAX_SENSITIVITY,
            learning_rate_step: DEFAULT_LEARNING_RATE_STEP,
            min_learning_rate: DEFAULT_MIN_LEARNING_RATE,
            max_learning_rate: DEFAULT_MAX_LEARNING_RATE,
            decision_error_tolerance: DEFAULT_DECISION_ERROR_TOLERANCE,
            min_signal_confidence: DEFAULT_MIN_SIGNAL_CONFIDENCE,
            high_pressure: DEFAULT_HIGH_PRESSURE,
            low_pressure: DEFAULT_LOW_PRESSURE,
            max_parallelism: DEFAULT_MAX_PARALLELISM,
        }
    }
}
