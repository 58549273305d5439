//! Health states, their parameter table, and performance snapshots.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Overall system health, as classified from performance snapshots.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SystemState {
    /// All metrics inside their normal bands.
    Healthy,
    /// Healthy and deliberately exploring.
    Optimizing,
    /// Some metrics past the moderate cutoffs.
    Degraded,
    /// Metrics past the critical cutoffs.
    Critical,
    /// Improving after a degraded or critical period.
    Recovering,
}

impl SystemState {
    /// Every state.
    pub const ALL: [Self; 5] = [
        Self::Healthy,
        Self::Optimizing,
        Self::Degraded,
        Self::Critical,
        Self::Recovering,
    ];

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Optimizing => "optimizing",
            Self::Degraded => "degraded",
            Self::Critical => "critical",
            Self::Recovering => "recovering",
        }
    }

    /// Whether this state counts as impaired (degraded or critical).
    #[must_use]
    pub const fn is_impaired(self) -> bool {
        matches!(self, Self::Degraded | Self::Critical)
    }

    /// Base parameter set for this state.
    ///
    /// Healthy and optimizing favour thoroughness; critical trades depth for
    /// fast, serial reaction.
    #[must_use]
    pub const fn base_parameters(self) -> ParameterSet {
        match self {
            Self::Healthy => ParameterSet {
                monitoring_interval_secs: 60,
                analysis_depth: 100,
                planning_lookahead_secs: 300,
                execution_parallelism: 4,
                learning_rate: 0.1,
            },
            Self::Optimizing => ParameterSet {
                monitoring_interval_secs: 30,
                analysis_depth: 150,
                planning_lookahead_secs: 600,
                execution_parallelism: 6,
                learning_rate: 0.3,
            },
            Self::Degraded => ParameterSet {
                monitoring_interval_secs: 30,
                analysis_depth: 50,
                planning_lookahead_secs: 180,
                execution_parallelism: 2,
                learning_rate: 0.2,
            },
            Self::Critical => ParameterSet {
                monitoring_interval_secs: 10,
                analysis_depth: 20,
                planning_lookahead_secs: 60,
                execution_parallelism: 1,
                learning_rate: 0.05,
            },
            Self::Recovering => ParameterSet {
                monitoring_interval_secs: 20,
                analysis_depth: 80,
                planning_lookahead_secs: 240,
                execution_parallelism: 3,
                learning_rate: 0.15,
            },
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown system state: {s}"))
    }
}

/// Operating parameters for the outer control cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    /// Seconds between monitor passes.
    pub monitoring_interval_secs: u64,
    /// Historical points to analyse.
    pub analysis_depth: u32,
    /// Seconds to plan ahead.
    pub planning_lookahead_secs: u64,
    /// Parallel execution slots.
    pub execution_parallelism: u32,
    /// Adaptation speed in `(0, 1]`.
    pub learning_rate: f64,
}

/// One observation of live performance.
///
/// Every field is optional; classification rules skip missing or non-finite
/// values. Utilisation is in percent, rates and quality in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PerformanceSnapshot {
    /// Fraction of failed operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_rate: Option<f64>,
    /// 99th percentile latency in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p99_latency_ms: Option<f64>,
    /// CPU utilisation in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<f64>,
    /// Memory utilisation in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<f64>,
    /// Quality of recent decisions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_quality: Option<f64>,
    /// Caller is deliberately exploring.
    #[serde(default)]
    pub exploration: bool,
    /// Other metrics carried for context.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, f64>,
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

impl PerformanceSnapshot {
    /// Empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the error rate.
    #[must_use]
    pub fn with_error_rate(mut self, value: f64) -> Self {
        self.error_rate = Some(value);
        self
    }

    /// Set the p99 latency.
    #[must_use]
    pub fn with_p99_latency_ms(mut self, value: f64) -> Self {
        self.p99_latency_ms = Some(value);
        self
    }

    /// Set CPU utilisation.
    #[must_use]
    pub fn with_cpu_usage(mut self, value: f64) -> Self {
        self.cpu_usage = Some(value);
        self
    }

    /// Set memory utilisation.
    #[must_use]
    pub fn with_memory_usage(mut self, value: f64) -> Self {
        self.memory_usage = Some(value);
        self
    }

    /// Set decision quality.
    #[must_use]
    pub fn with_decision_quality(mut self, value: f64) -> Self {
        self.decision_quality = Some(value);
        self
    }

    /// Mark as exploring.
    #[must_use]
    pub fn exploring(mut self) -> Self {
        self.exploration = true;
        self
    }

    /// Add a context metric.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: f64) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Finite error rate, if present.
    #[must_use]
    pub fn error_rate(&self) -> Option<f64> {
        finite(self.error_rate)
    }

    /// Finite p99 latency, if present.
    #[must_use]
    pub fn p99_latency_ms(&self) -> Option<f64> {
        finite(self.p99_latency_ms)
    }

    /// Finite CPU utilisation, if present.
    #[must_use]
    pub fn cpu_usage(&self) -> Option<f64> {
        finite(self.cpu_usage)
    }

    /// Finite memory utilisation, if present.
    #[must_use]
    pub fn memory_usage(&self) -> Option<f64> {
        finite(self.memory_usage)
    }

    /// Finite decision quality, if present.
    #[must_use]
    pub fn decision_quality(&self) -> Option<f64> {
        finite(self.decision_quality)
    }
}

/// A snapshot as stored in the performance history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    /// When it was recorded.
    pub timestamp: DateTime<Utc>,
    /// The snapshot.
    pub snapshot: PerformanceSnapshot,
}

/// A committed state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    /// State before.
    pub from: SystemState,
    /// State after.
    pub to: SystemState,
    /// When the change was committed.
    pub timestamp: DateTime<Utc>,
    /// Snapshot that completed the hysteresis window, if any.
    pub triggering_metrics: Option<PerformanceSnapshot>,
    /// Whether an operator forced this transition.
    pub forced: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_critical_parameters() {
        let p = SystemState::Critical.base_parameters();
        assert_eq!(p.monitoring_interval_secs, 10);
        assert_eq!(p.analysis_depth, 20);
        assert_eq!(p.planning_lookahead_secs, 60);
        assert_eq!(p.execution_parallelism, 1);
        assert_eq!(p.learning_rate, 0.05);
    }

    #[test]
    fn test_table_bounds() {
        for state in SystemState::ALL {
            let p = state.base_parameters();
            assert!((1..=8).contains(&p.execution_parallelism));
            assert!(p.learning_rate > 0.0 && p.learning_rate <= 0.3);
        }
        let healthy = SystemState::Healthy.base_parameters();
        let critical = SystemState::Critical.base_parameters();
        assert!(healthy.analysis_depth > critical.analysis_depth);
    }

    #[test_case("healthy", SystemState::Healthy)]
    #[test_case("CRITICAL", SystemState::Critical)]
    #[test_case(" recovering ", SystemState::Recovering)]
    fn test_parse_state(input: &str, expected: SystemState) {
        assert_eq!(input.parse::<SystemState>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unknown_state() {
        assert!("broken".parse::<SystemState>().is_err());
    }

    #[test]
    fn test_snapshot_ignores_non_finite() {
        let snap = PerformanceSnapshot::new()
            .with_error_rate(f64::NAN)
            .with_p99_latency_ms(120.0);
        assert_eq!(snap.error_rate(), None);
        assert_eq!(snap.p99_latency_ms(), Some(120.0));
    }

    #[test]
    fn test_snapshot_deserializes_sparse_json() {
        let snap: PerformanceSnapshot =
            serde_json::from_str(r#"{"error_rate":0.15,"p99_latency_ms":2000}"#).unwrap();
        assert_eq!(snap.error_rate(), Some(0.15));
        assert!(!snap.exploration);
        assert!(snap.extra.is_empty());
    }

    #[test]
    fn test_state_serde_name() {
        assert_eq!(
            serde_json::to_string(&SystemState::Optimizing).unwrap(),
            "\"optimizing\""
        );
    }
}
