//! Threshold learning workflow tests.
//!
//! Tests the ingest → gate → recommend → export cycle of the threshold
//! optimizer against a controllable clock.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use mape_autotune::config::ThresholdConfig;
use mape_autotune::thresholds::{
    OptimizationOutcome, PendingReason, SelfLearningThresholdOptimizer, ThresholdStrategy,
};
use mape_autotune::traits::ManualTimeProvider;

fn optimizer_with_clock(
    config: ThresholdConfig,
) -> (Arc<ManualTimeProvider>, SelfLearningThresholdOptimizer) {
    let clock = Arc::new(ManualTimeProvider::new(
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
    ));
    let optimizer = SelfLearningThresholdOptimizer::with_time_provider(config, clock.clone())
        .expect("valid config");
    (clock, optimizer)
}

// ============================================================================
// Gating
// ============================================================================

#[test]
fn test_below_minimum_stays_pending() {
    let (_clock, optimizer) = optimizer_with_clock(ThresholdConfig::default());
    for i in 0..99 {
        optimizer.add_metric("cpu", f64::from(i));
    }

    let outcomes = optimizer.maybe_optimize();
    match &outcomes["cpu"] {
        OptimizationOutcome::Pending(PendingReason::InsufficientData { have, need }) => {
            assert_eq!(*have, 99);
            assert_eq!(*need, 100);
        }
        other => panic!("Expected insufficient data, got: {other:?}"),
    }
    assert!(optimizer.export_thresholds().is_empty());
    assert!(optimizer.history().is_empty());
}

#[test]
fn test_interval_gate_until_due() {
    let (clock, optimizer) = optimizer_with_clock(ThresholdConfig {
        min_data_points: 10,
        optimization_interval_secs: 600,
        ..ThresholdConfig::default()
    });
    for i in 0..20 {
        optimizer.add_metric("cpu", f64::from(i));
    }

    assert!(optimizer.maybe_optimize()["cpu"].recommendation().is_some());

    clock.advance(Duration::seconds(300));
    match &optimizer.maybe_optimize()["cpu"] {
        OptimizationOutcome::Pending(PendingReason::NotDue { remaining_secs }) => {
            assert_eq!(*remaining_secs, 300);
        }
        other => panic!("Expected not due, got: {other:?}"),
    }

    clock.advance(Duration::seconds(300));
    assert!(optimizer.maybe_optimize()["cpu"].recommendation().is_some());
    assert_eq!(optimizer.history().len(), 2);
}

// ============================================================================
// Recommendations
// ============================================================================

#[test]
fn test_constant_series_learns_sigma_threshold() {
    let (_clock, optimizer) = optimizer_with_clock(ThresholdConfig::default());
    for _ in 0..500 {
        optimizer.add_metric("memory", 10.0);
    }

    let outcomes = optimizer.maybe_optimize();
    let rec = outcomes["memory"].recommendation().unwrap();
    assert_eq!(rec.strategy, ThresholdStrategy::Sigma);
    assert!((rec.value - 10.0).abs() < 1e-9);
    assert!(rec.confidence > 0.95, "confidence was {}", rec.confidence);
    assert_eq!(rec.data_points, 500);
}

#[test]
fn test_export_matches_latest_history_entry() {
    let (clock, optimizer) = optimizer_with_clock(ThresholdConfig {
        min_data_points: 10,
        ..ThresholdConfig::default()
    });
    for key in ["cpu", "latency"] {
        for i in 0..30 {
            optimizer.add_metric(key, f64::from(i % 7));
        }
    }
    optimizer.force_optimize();
    clock.advance(Duration::seconds(5));
    optimizer.add_metric("cpu", 50.0);
    optimizer.force_optimize();

    let exported = optimizer.export_thresholds();
    let history = optimizer.history();
    assert_eq!(exported.len(), 2);
    for (key, rec) in &exported {
        let last = history
            .iter()
            .rev()
            .find(|entry| &entry.parameter_key == key)
            .unwrap();
        assert_eq!(last, rec);
    }
    assert_eq!(exported["cpu"].data_points, 31);
}

#[test]
fn test_history_is_capped() {
    let (_clock, optimizer) = optimizer_with_clock(ThresholdConfig {
        min_data_points: 1,
        history_cap: 3,
        ..ThresholdConfig::default()
    });
    optimizer.add_metric("cpu", 1.0);
    for _ in 0..5 {
        optimizer.force_optimize();
    }

    assert_eq!(optimizer.history().len(), 3);
    let stats = optimizer.learning_stats();
    assert_eq!(stats.optimizations_run, 5);
    assert_eq!(stats.recommendations_recorded, 3);
}

#[test]
fn test_preferred_strategy_overrides_selection() {
    let (_clock, optimizer) = optimizer_with_clock(ThresholdConfig {
        min_data_points: 10,
        ..ThresholdConfig::default()
    });
    for i in 0..40 {
        optimizer.add_metric("latency", f64::from(i % 10));
    }
    optimizer.set_preferred_strategy("latency", Some(ThresholdStrategy::Iqr));

    let rec = optimizer.force_optimize()["latency"]
        .recommendation()
        .cloned()
        .unwrap();
    assert_eq!(rec.strategy, ThresholdStrategy::Iqr);
    let stats = optimizer.statistics("latency").unwrap();
    assert!((rec.value - 1.5f64.mul_add(stats.iqr, stats.p75)).abs() < 1e-9);
}

// ============================================================================
// Anomalies
// ============================================================================

#[test]
fn test_detects_spike_against_learned_baseline() {
    let (_clock, optimizer) = optimizer_with_clock(ThresholdConfig::default());
    for i in 0..200 {
        optimizer.add_metric("latency", 100.0 + f64::from(i % 3));
    }
    optimizer.add_metric("latency", 400.0);

    let anomalies = optimizer.detect_anomalies("latency");
    assert_eq!(anomalies.len(), 1);
    assert!((anomalies[0].value - 400.0).abs() < f64::EPSILON);
    assert_eq!(optimizer.is_anomalous("latency", 101.0), Some(false));
    assert_eq!(optimizer.is_anomalous("unknown", 1.0), None);
}
