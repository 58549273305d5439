//! Confidence scoring for threshold recommendations.

// Point counts are far below 2^52, and millisecond ages far below 2^52.
#![allow(clippy::cast_precision_loss)]

use chrono::{DateTime, Duration, Utc};

use crate::metrics::MetricStatistics;

/// Weight of the data-volume term.
pub const VOLUME_WEIGHT: f64 = 0.3;

/// Weight of the stability term.
pub const STABILITY_WEIGHT: f64 = 0.5;

/// Weight of the recency term.
pub const RECENCY_WEIGHT: f64 = 0.2;

/// Individual terms of a confidence score, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceBreakdown {
    /// `count / target`, saturating at 1.
    pub volume: f64,
    /// `1 / (1 + cv)`.
    pub stability: f64,
    /// 1 within the interval, `interval / age` after.
    pub recency: f64,
}

impl ConfidenceBreakdown {
    /// Score the terms for one key.
    #[must_use]
    pub fn compute(
        stats: &MetricStatistics,
        target_points: usize,
        last_update: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        interval: Duration,
    ) -> Self {
        let volume = if target_points == 0 {
            1.0
        } else {
            (stats.count as f64 / target_points as f64).min(1.0)
        };

        let stability = 1.0 / (1.0 + stats.coefficient_of_variation());

        let recency = last_update.map_or(0.0, |updated| {
            let age = now - updated;
            if age <= interval {
                1.0
            } else {
                interval.num_milliseconds() as f64 / age.num_milliseconds() as f64
            }
        });

        Self {
            volume,
            stability,
            recency,
        }
    }

    /// Weighted sum clamped to `[0, 1]`.
    #[must_use]
    pub fn score(&self) -> f64 {
        let total = VOLUME_WEIGHT.mul_add(
            self.volume,
            STABILITY_WEIGHT.mul_add(self.stability, RECENCY_WEIGHT * self.recency),
        );
        if total.is_finite() {
            total.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}
