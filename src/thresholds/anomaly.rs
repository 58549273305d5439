//! Sigma-distance anomaly checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::{MetricPoint, MetricStatistics};

/// A point flagged as anomalous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Metric key.
    pub key: String,
    /// Offending value.
    pub value: f64,
    /// When the value was recorded.
    pub timestamp: DateTime<Utc>,
    /// Distance from the mean in standard deviations (infinite when the
    /// baseline has no spread).
    pub z_score: f64,
    /// Sensitivity the check ran with.
    pub sensitivity: f64,
}

/// `|value − mean| > sensitivity × stdev`.
#[must_use]
pub fn is_anomaly(value: f64, stats: &MetricStatistics, sensitivity: f64) -> bool {
    (value - stats.mean).abs() > sensitivity * stats.stdev
}

/// Signed distance from the mean in standard deviations.
#[must_use]
pub fn z_score(value: f64, stats: &MetricStatistics) -> f64 {
    let distance = value - stats.mean;
    if stats.stdev > 0.0 {
        distance / stats.stdev
    } else if distance == 0.0 {
        0.0
    } else {
        f64::INFINITY.copysign(distance)
    }
}

/// Points in `points` that are anomalous against `stats`.
#[must_use]
pub fn scan(
    key: &str,
    points: &[MetricPoint],
    stats: &MetricStatistics,
    sensitivity: f64,
) -> Vec<Anomaly> {
    points
        .iter()
        .filter(|p| is_anomaly(p.value, stats, sensitivity))
        .map(|p| Anomaly {
            key: key.to_string(),
            value: p.value,
            timestamp: p.timestamp,
            z_score: z_score(p.value, stats),
            sensitivity,
        })
        .collect()
}
