//! Per-key metric storage.
//!
//! This module provides:
//! - [`MetricPoint`]: one timestamped sample
//! - [`MetricsBuffer`]: a fixed-capacity ring of points with cached
//!   [`MetricStatistics`]
//!
//! The buffer never holds a non-finite value: `add` rejects them and bumps a
//! counter instead.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use mape_autotune::metrics::MetricsBuffer;
//!
//! let mut buffer = MetricsBuffer::with_capacity("latency_ms", 5);
//! let now = Utc::now();
//! for v in 1..=6 {
//!     buffer.add(f64::from(v), now);
//! }
//! assert_eq!(buffer.values(), vec![2.0, 3.0, 4.0, 5.0, 6.0]);
//!
//! assert!(!buffer.add(f64::NAN, now));
//! assert_eq!(buffer.rejected(), 1);
//!
//! let stats = buffer.statistics(now).unwrap();
//! assert_eq!(stats.mean, 4.0);
//! ```

mod statistics;

pub use statistics::{percentile, trend, MetricStatistics, Trend};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ThresholdConfig;

/// A single timestamped sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
    /// Sample value (always finite once stored).
    pub value: f64,
}

impl MetricPoint {
    /// Create a new point.
    #[must_use]
    pub const fn new(value: f64, timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, value }
    }
}

/// Copy of a buffer's contents taken under its lock.
///
/// Statistics are computed from a snapshot outside the lock and written back
/// with [`MetricsBuffer::store_statistics`], which discards them if newer
/// points arrived in the meantime.
#[derive(Debug, Clone)]
pub struct BufferSnapshot {
    /// Values, oldest first.
    pub values: Vec<f64>,
    /// Buffer version the copy was taken at.
    pub version: u64,
    /// Timestamp of the newest point.
    pub last_update: Option<DateTime<Utc>>,
}

/// Fixed-capacity time series for one metric key.
///
/// Storage is an index ring: once full, each `add` overwrites the oldest
/// slot in O(1).
#[derive(Debug, Clone)]
pub struct MetricsBuffer {
    key: String,
    capacity: usize,
    points: Vec<MetricPoint>,
    head: usize,
    rejected: u64,
    version: u64,
    last_update: Option<DateTime<Utc>>,
    cached: Option<(u64, MetricStatistics)>,
    cache_ttl: Duration,
    trend_epsilon: f64,
}

impl MetricsBuffer {
    /// Create a buffer sized and tuned from threshold configuration.
    #[must_use]
    pub fn new(key: impl Into<String>, config: &ThresholdConfig) -> Self {
        Self::build(
            key.into(),
            config.buffer_capacity,
            config.stats_cache_ttl(),
            config.trend_epsilon,
        )
    }

    /// Create a buffer with the given capacity and default tuning.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn with_capacity(key: impl Into<String>, capacity: usize) -> Self {
        let defaults = ThresholdConfig::default();
        Self::build(
            key.into(),
            capacity,
            defaults.stats_cache_ttl(),
            defaults.trend_epsilon,
        )
    }

    fn build(key: String, capacity: usize, cache_ttl: Duration, trend_epsilon: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            key,
            capacity,
            points: Vec::with_capacity(capacity.min(1_024)),
            head: 0,
            rejected: 0,
            version: 0,
            last_update: None,
            cached: None,
            cache_ttl,
            trend_epsilon,
        }
    }

    /// Append a sample, evicting the oldest when full.
    ///
    /// Returns `false` (and counts a rejection) for NaN or infinite values.
    pub fn add(&mut self, value: f64, timestamp: DateTime<Utc>) -> bool {
        if !value.is_finite() {
            self.rejected += 1;
            tracing::debug!(key = %self.key, value, "Rejected non-finite metric value");
            return false;
        }

        let point = MetricPoint::new(value, timestamp);
        if self.points.len() < self.capacity {
            self.points.push(point);
        } else {
            self.points[self.head] = point;
            self.head = (self.head + 1) % self.capacity;
        }

        self.version += 1;
        self.last_update = Some(self.last_update.map_or(timestamp, |t| t.max(timestamp)));
        self.cached = None;
        true
    }

    /// Metric key this buffer belongs to.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Maximum number of points.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of points held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no points are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Non-finite samples rejected so far.
    #[must_use]
    pub const fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Count of accepted samples since creation; changes on every `add`.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Timestamp of the newest point.
    #[must_use]
    pub const fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// Iterate points from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &MetricPoint> + '_ {
        let (newer, older) = self.points.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    /// Copy of all points, oldest first.
    #[must_use]
    pub fn points(&self) -> Vec<MetricPoint> {
        self.iter().copied().collect()
    }

    /// Copy of all values, oldest first.
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        self.iter().map(|p| p.value).collect()
    }

    /// Copy the contents for computation outside the lock.
    #[must_use]
    pub fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            values: self.values(),
            version: self.version,
            last_update: self.last_update,
        }
    }

    /// Cached statistics, if no point arrived since and the TTL has not
    /// expired at `now`.
    #[must_use]
    pub fn cached_statistics(&self, now: DateTime<Utc>) -> Option<MetricStatistics> {
        self.cached
            .as_ref()
            .filter(|(version, stats)| {
                *version == self.version && now - stats.computed_at < self.cache_ttl
            })
            .map(|(_, stats)| stats.clone())
    }

    /// Store statistics computed from a snapshot taken at `version`.
    ///
    /// Returns `false` and discards them if the buffer changed since.
    pub fn store_statistics(&mut self, version: u64, stats: MetricStatistics) -> bool {
        if version != self.version {
            return false;
        }
        self.cached = Some((version, stats));
        true
    }

    /// Statistics over the full contents, served from cache when valid.
    ///
    /// Returns `None` for an empty buffer.
    pub fn statistics(&mut self, now: DateTime<Utc>) -> Option<MetricStatistics> {
        if let Some(stats) = self.cached_statistics(now) {
            return Some(stats);
        }
        let stats = MetricStatistics::compute(&self.values(), self.trend_epsilon, now)?;
        self.cached = Some((self.version, stats.clone()));
        Some(stats)
    }

    /// Trend over the full contents.
    #[must_use]
    pub fn trend(&self) -> Trend {
        trend(&self.values(), self.trend_epsilon)
    }

    /// Trend over points no older than `window` before `now`.
    #[must_use]
    pub fn trend_within(&self, window: Duration, now: DateTime<Utc>) -> Trend {
        let since = now - window;
        let recent: Vec<f64> = self
            .iter()
            .filter(|p| p.timestamp >= since)
            .map(|p| p.value)
            .collect();
        trend(&recent, self.trend_epsilon)
    }

    /// Trend epsilon this buffer was created with.
    #[must_use]
    pub const fn trend_epsilon(&self) -> f64 {
        self.trend_epsilon
    }
}
