//! Threshold strategies and the policy that picks one.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::ThresholdConfig;
use crate::metrics::{MetricStatistics, Trend};

/// How a threshold value is derived from statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdStrategy {
    /// Configured percentile (p95 by default).
    Percentile,
    /// `mean + k · stdev`.
    Sigma,
    /// Upper Tukey fence, `Q3 + m · IQR`.
    Iqr,
}

impl ThresholdStrategy {
    /// All strategies, in declaration order.
    pub const ALL: [Self; 3] = [Self::Percentile, Self::Sigma, Self::Iqr];

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Percentile => "percentile",
            Self::Sigma => "sigma",
            Self::Iqr => "iqr",
        }
    }
}

impl fmt::Display for ThresholdStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThresholdStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "percentile" => Ok(Self::Percentile),
            "sigma" | "statistical" => Ok(Self::Sigma),
            "iqr" => Ok(Self::Iqr),
            other => Err(format!("unknown threshold strategy: {other}")),
        }
    }
}

/// Pick a strategy for one key.
///
/// A preference set through feedback wins. Otherwise high dispersion
/// (`iqr / |mean|` above the configured ratio) selects IQR, a stable trend
/// selects Sigma, and a moving trend selects Percentile.
#[must_use]
pub fn select_strategy(
    stats: &MetricStatistics,
    config: &ThresholdConfig,
    preferred: Option<ThresholdStrategy>,
) -> ThresholdStrategy {
    if let Some(strategy) = preferred {
        return strategy;
    }
    if stats.dispersion() > config.dispersion_ratio {
        return ThresholdStrategy::Iqr;
    }
    match stats.trend {
        Trend::Stable => ThresholdStrategy::Sigma,
        Trend::Increasing | Trend::Decreasing => ThresholdStrategy::Percentile,
    }
}

/// Threshold value for `strategy`.
#[must_use]
pub fn threshold_value(
    strategy: ThresholdStrategy,
    stats: &MetricStatistics,
    config: &ThresholdConfig,
) -> f64 {
    match strategy {
        ThresholdStrategy::Percentile => percentile_value(stats, config.threshold_percentile),
        ThresholdStrategy::Sigma => config.sigma_k.mul_add(stats.stdev, stats.mean),
        ThresholdStrategy::Iqr => config.iqr_multiplier.mul_add(stats.iqr, stats.p75),
    }
}

/// Nearest precomputed percentile at or above `p`; p99 beyond 95.
fn percentile_value(stats: &MetricStatistics, p: f64) -> f64 {
    match p {
        p if p <= 25.0 => stats.p25,
        p if p <= 50.0 => stats.p50,
        p if p <= 75.0 => stats.p75,
        p if p <= 90.0 => stats.p90,
        p if p <= 95.0 => stats.p95,
        _ => stats.p99,
    }
}

/// Human-readable explanation attached to a recommendation.
#[must_use]
pub fn reasoning(
    strategy: ThresholdStrategy,
    stats: &MetricStatistics,
    config: &ThresholdConfig,
    preferred: bool,
) -> String {
    let basis = match strategy {
        ThresholdStrategy::Percentile => format!(
            "p{} of {} points (trend {})",
            config.threshold_percentile, stats.count, stats.trend
        ),
        ThresholdStrategy::Sigma => format!(
            "mean {:.3} + {} x stdev {:.3} over {} points",
            stats.mean, config.sigma_k, stats.stdev, stats.count
        ),
        ThresholdStrategy::Iqr => format!(
            "Q3 {:.3} + {} x IQR {:.3} (dispersion {:.2})",
            stats.p75,
            config.iqr_multiplier,
            stats.iqr,
            stats.dispersion()
        ),
    };
    if preferred {
        format!("{strategy} preferred by feedback: {basis}")
    } else {
        format!("{strategy}: {basis}")
    }
}
