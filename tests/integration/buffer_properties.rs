//! Metric buffer property tests.
//!
//! Exercises the public buffer API the way a monitor would: arbitrary
//! streams, bounded memory, oldest-first eviction.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{Duration, TimeZone, Utc};
use mape_autotune::metrics::{MetricStatistics, MetricsBuffer, Trend};
use proptest::prelude::*;

fn start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
}

// ============================================================================
// Eviction
// ============================================================================

#[test]
fn test_buffer_keeps_newest_window() {
    let mut buffer = MetricsBuffer::with_capacity("queue_depth", 5);
    for v in 1..=6 {
        buffer.add(f64::from(v), start());
    }
    assert_eq!(buffer.values(), vec![2.0, 3.0, 4.0, 5.0, 6.0]);
}

#[test]
fn test_non_finite_values_leave_buffer_untouched() {
    let mut buffer = MetricsBuffer::with_capacity("queue_depth", 3);
    buffer.add(1.0, start());
    assert!(!buffer.add(f64::NAN, start()));
    assert!(!buffer.add(f64::NEG_INFINITY, start()));
    assert_eq!(buffer.values(), vec![1.0]);
}

#[test]
fn test_statistics_follow_new_points() {
    let mut buffer = MetricsBuffer::with_capacity("latency", 100);
    for v in [10.0, 20.0, 30.0] {
        buffer.add(v, start());
    }
    let first = buffer.statistics(start()).unwrap();
    assert!((first.mean - 20.0).abs() < 1e-9);

    // a new point invalidates the cached summary immediately
    buffer.add(40.0, start() + Duration::seconds(1));
    let second = buffer.statistics(start() + Duration::seconds(1)).unwrap();
    assert_eq!(second.count, 4);
    assert!((second.mean - 25.0).abs() < 1e-9);
}

#[test]
fn test_trend_within_window_ignores_old_points() {
    let mut buffer = MetricsBuffer::with_capacity("latency", 100);
    let old = start() - Duration::hours(2);
    for v in [100.0, 90.0, 80.0, 70.0, 60.0] {
        buffer.add(v, old);
    }
    for v in [10.0, 10.0, 10.0, 10.0, 10.0] {
        buffer.add(v, start());
    }
    assert_eq!(buffer.trend(), Trend::Decreasing);
    assert_eq!(
        buffer.trend_within(Duration::hours(1), start()),
        Trend::Stable
    );
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_buffer_holds_last_capacity_values(
        values in prop::collection::vec(-1.0e6..1.0e6f64, 0..200),
        capacity in 1usize..64,
    ) {
        let mut buffer = MetricsBuffer::with_capacity("m", capacity);
        for v in &values {
            buffer.add(*v, start());
        }
        let expected: Vec<f64> = values
            .iter()
            .skip(values.len().saturating_sub(capacity))
            .copied()
            .collect();
        prop_assert_eq!(buffer.len(), values.len().min(capacity));
        prop_assert_eq!(buffer.values(), expected);
    }

    #[test]
    fn prop_statistics_are_ordered(values in prop::collection::vec(-1.0e6..1.0e6f64, 1..300)) {
        let stats = MetricStatistics::compute(&values, 0.05, start()).unwrap();
        prop_assert!(stats.min <= stats.p25 + 1e-9);
        prop_assert!(stats.p25 <= stats.p50 + 1e-9);
        prop_assert!(stats.p50 <= stats.p75 + 1e-9);
        prop_assert!(stats.p75 <= stats.p90 + 1e-9);
        prop_assert!(stats.p90 <= stats.p95 + 1e-9);
        prop_assert!(stats.p95 <= stats.p99 + 1e-9);
        prop_assert!(stats.p99 <= stats.max + 1e-9);
        prop_assert!(stats.stdev >= 0.0);
        prop_assert!(stats.mean >= stats.min - 1e-9 && stats.mean <= stats.max + 1e-9);
    }
}
