//! Descriptive statistics over a metric buffer.
//!
//! Percentiles use linear interpolation between closest ranks
//! (`rank = p / 100 · (n − 1)`), so they are exact on the sample and stable
//! for small buffers. Standard deviation is the population form.

// Sample counts are far below 2^52, so usize -> f64 is exact here.
#![allow(clippy::cast_precision_loss)]

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Direction of a metric over the buffer window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// Recent mean is above the earliest mean by more than epsilon.
    Increasing,
    /// Recent mean is below the earliest mean by more than epsilon.
    Decreasing,
    /// Within epsilon, or too few points to tell.
    Stable,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Stable => "stable",
        };
        write!(f, "{s}")
    }
}

/// Summary statistics for one metric key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStatistics {
    /// Number of points summarised.
    pub count: usize,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation.
    pub stdev: f64,
    /// 25th percentile.
    pub p25: f64,
    /// Median.
    pub p50: f64,
    /// 75th percentile.
    pub p75: f64,
    /// 90th percentile.
    pub p90: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
    /// Interquartile range (`p75 − p25`).
    pub iqr: f64,
    /// Windowed trend.
    pub trend: Trend,
    /// When these statistics were computed.
    pub computed_at: DateTime<Utc>,
}

impl MetricStatistics {
    /// Compute statistics over `values` (oldest first).
    ///
    /// Returns `None` for an empty slice. Non-finite values are never stored
    /// in a buffer, so they are not filtered here.
    #[must_use]
    pub fn compute(
        values: &[f64],
        trend_epsilon: f64,
        computed_at: DateTime<Utc>,
    ) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let n = count as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let p25 = percentile(&sorted, 25.0);
        let p75 = percentile(&sorted, 75.0);

        Some(Self {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            mean,
            stdev: variance.sqrt(),
            p25,
            p50: percentile(&sorted, 50.0),
            p75,
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
            iqr: p75 - p25,
            trend: trend(values, trend_epsilon),
            computed_at,
        })
    }

    /// Coefficient of variation (`stdev / |mean|`).
    ///
    /// Zero for constant data. A zero mean with non-zero spread gives
    /// infinity, which downstream scoring treats as maximally unstable.
    #[must_use]
    pub fn coefficient_of_variation(&self) -> f64 {
        if self.stdev == 0.0 {
            0.0
        } else if self.mean == 0.0 {
            f64::INFINITY
        } else {
            self.stdev / self.mean.abs()
        }
    }

    /// Dispersion ratio (`iqr / |mean|`), infinite on a zero mean with spread.
    #[must_use]
    pub fn dispersion(&self) -> f64 {
        if self.iqr == 0.0 {
            0.0
        } else if self.mean == 0.0 {
            f64::INFINITY
        } else {
            self.iqr / self.mean.abs()
        }
    }
}

/// Linear-interpolation percentile over an ascending slice.
///
/// `p` is clamped to `[0, 100]`. Returns `0.0` for an empty slice.
#[must_use]
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let rank = p.clamp(0.0, 100.0) / 100.0 * (len - 1) as f64;
            let lower = rank.floor();
            // rank is within [0, len - 1], so the casts cannot truncate.
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let (lo, hi) = (lower as usize, rank.ceil() as usize);
            let weight = rank - lower;
            sorted[lo] + (sorted[hi] - sorted[lo]) * weight
        }
    }
}

/// Compare the mean of the most recent third with the earliest third.
///
/// Fewer than three points is always [`Trend::Stable`]. The relative change
/// is taken against `|earliest mean|`; when that is zero the absolute change
/// is compared against epsilon instead.
#[must_use]
pub fn trend(values: &[f64], epsilon: f64) -> Trend {
    let third = values.len() / 3;
    if third == 0 {
        return Trend::Stable;
    }

    let mean = |window: &[f64]| window.iter().sum::<f64>() / window.len() as f64;
    let early = mean(&values[..third]);
    let recent = mean(&values[values.len() - third..]);

    let change = if early == 0.0 {
        recent
    } else {
        (recent - early) / early.abs()
    };

    if change > epsilon {
        Trend::Increasing
    } else if change < -epsilon {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}
