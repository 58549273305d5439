//! Health state machine workflow tests.
//!
//! Tests snapshot → classify → hysteresis → commit, and the parameters each
//! committed state hands to the outer control cycle.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use mape_autotune::config::DynamicConfig;
use mape_autotune::dynamic::{DynamicParameterOptimizer, PerformanceSnapshot, SystemState};

fn critical() -> PerformanceSnapshot {
    PerformanceSnapshot::new()
        .with_error_rate(0.15)
        .with_p99_latency_ms(2_000.0)
}

fn healthy() -> PerformanceSnapshot {
    PerformanceSnapshot::new()
        .with_error_rate(0.001)
        .with_p99_latency_ms(80.0)
        .with_cpu_usage(30.0)
        .with_memory_usage(40.0)
        .with_decision_quality(0.95)
}

// ============================================================================
// Classification
// ============================================================================

#[test]
fn test_classify_does_not_change_state() {
    let optimizer = DynamicParameterOptimizer::with_defaults();
    for _ in 0..5 {
        assert_eq!(optimizer.classify(&critical()), SystemState::Critical);
    }
    assert_eq!(optimizer.current_state(), SystemState::Healthy);
    assert!(optimizer.transitions().is_empty());
    assert_eq!(optimizer.optimization_stats().total_evaluations, 0);
}

#[test]
fn test_empty_snapshot_stays_healthy() {
    let optimizer = DynamicParameterOptimizer::with_defaults();
    let evaluation = optimizer.record_performance(PerformanceSnapshot::new());
    assert_eq!(evaluation.candidate, SystemState::Healthy);
    assert!(evaluation.transition.is_none());
}

// ============================================================================
// Hysteresis
// ============================================================================

#[test]
fn test_critical_commits_after_hysteresis() {
    let optimizer = DynamicParameterOptimizer::with_defaults();

    let first = optimizer.record_performance(critical());
    assert_eq!(first.candidate, SystemState::Critical);
    assert!(first.transition.is_none());
    assert_eq!(optimizer.current_state(), SystemState::Healthy);

    let second = optimizer.record_performance(critical());
    let transition = second.transition.unwrap();
    assert_eq!(transition.from, SystemState::Healthy);
    assert_eq!(transition.to, SystemState::Critical);
    assert!(!transition.forced);
    assert_eq!(transition.triggering_metrics, Some(critical()));

    let params = optimizer.current_parameters();
    assert_eq!(params.execution_parallelism, 1);
    assert_eq!(params.monitoring_interval_secs, 10);
}

#[test]
fn test_single_spike_is_absorbed() {
    let optimizer = DynamicParameterOptimizer::with_defaults();
    optimizer.record_performance(critical());
    optimizer.record_performance(healthy());
    optimizer.record_performance(critical());

    assert_eq!(optimizer.current_state(), SystemState::Healthy);
    assert_eq!(optimizer.optimization_stats().total_transitions, 0);
}

#[test]
fn test_critical_to_recovering_to_healthy() {
    let optimizer = DynamicParameterOptimizer::with_defaults();
    optimizer.force_state(SystemState::Critical);

    let improving = PerformanceSnapshot::new()
        .with_error_rate(0.02)
        .with_p99_latency_ms(200.0);
    optimizer.record_performance(improving.clone());
    optimizer.record_performance(improving);
    assert_eq!(optimizer.current_state(), SystemState::Recovering);

    for _ in 0..2 {
        optimizer.record_performance(healthy());
    }
    assert_eq!(optimizer.current_state(), SystemState::Healthy);

    let path: Vec<SystemState> = optimizer.transitions().iter().map(|t| t.to).collect();
    assert_eq!(
        path,
        vec![
            SystemState::Critical,
            SystemState::Recovering,
            SystemState::Healthy
        ]
    );
}

#[test]
fn test_longer_hysteresis_needs_more_cycles() {
    let optimizer = DynamicParameterOptimizer::new(DynamicConfig {
        hysteresis_cycles: 4,
        ..DynamicConfig::default()
    })
    .unwrap();
    for cycle in 1..=3 {
        let evaluation = optimizer.record_performance(critical());
        assert_eq!(evaluation.streak, cycle);
        assert!(evaluation.transition.is_none());
    }
    assert!(optimizer.record_performance(critical()).transition.is_some());
}

// ============================================================================
// Bounded history
// ============================================================================

#[test]
fn test_transition_history_is_capped() {
    let optimizer = DynamicParameterOptimizer::new(DynamicConfig {
        transition_history_cap: 4,
        ..DynamicConfig::default()
    })
    .unwrap();
    for _ in 0..5 {
        optimizer.force_state(SystemState::Critical);
        optimizer.force_state(SystemState::Healthy);
    }

    let stats = optimizer.optimization_stats();
    assert_eq!(stats.total_transitions, 10);
    assert_eq!(stats.transition_history_size, 4);
    assert_eq!(optimizer.transitions().last().unwrap().to, SystemState::Healthy);
}
