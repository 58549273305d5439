//! Feedback loop workflow tests.
//!
//! Tests signal → action → observers through the assembled loop, so every
//! action lands on the same optimizers the monitor side reads.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mape_autotune::config::AutotuneConfig;
use mape_autotune::dynamic::{PerformanceSnapshot, SystemState};
use mape_autotune::error::ObserverError;
use mape_autotune::feedback::{Action, ActionChange, FeedbackSignal, LoopType, SignalPayload};
use mape_autotune::traits::ActionObserver;
use mape_autotune::AutotuneLoop;

fn autotune() -> AutotuneLoop {
    AutotuneLoop::new(AutotuneConfig::default()).unwrap()
}

fn false_positive() -> SignalPayload {
    SignalPayload::AnomalyFeedback {
        true_positives: 0,
        false_positives: 1,
        false_negatives: 0,
    }
}

// ============================================================================
// Loop handlers
// ============================================================================

#[test]
fn test_false_positive_lowers_sensitivity() {
    let autotune = autotune();

    let action = autotune.emit_signal("analyzer", false_positive()).unwrap();
    assert_eq!(action.loop_type, LoopType::AnomalyFeedback);
    assert_eq!(action.parameter_changed, "anomaly_sensitivity");
    match action.change {
        ActionChange::Delta { before, after } => {
            assert!((before - 2.0).abs() < 1e-9);
            assert!((after - 1.9).abs() < 1e-9);
        }
        other => panic!("Expected delta, got: {other:?}"),
    }
    assert!((autotune.thresholds().sensitivity() - 1.9).abs() < 1e-9);

    let history = autotune.feedback().action_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, action.id);
}

#[test]
fn test_balanced_anomaly_feedback_is_a_noop() {
    let autotune = autotune();
    let action = autotune.emit_signal(
        "analyzer",
        SignalPayload::AnomalyFeedback {
            true_positives: 4,
            false_positives: 2,
            false_negatives: 2,
        },
    );
    assert!(action.is_none());
    assert_eq!(autotune.feedback().signal_history().len(), 1);
    assert!(autotune.feedback().action_history().is_empty());
}

#[test]
fn test_performance_signal_moves_state_machine() {
    let autotune = autotune();
    let critical = PerformanceSnapshot::new().with_error_rate(0.2);

    let held = autotune.emit_signal(
        "executor",
        SignalPayload::PerformanceAdaptation {
            snapshot: critical.clone(),
        },
    );
    assert!(held.is_none());

    let action = autotune
        .emit_signal(
            "executor",
            SignalPayload::PerformanceAdaptation { snapshot: critical },
        )
        .unwrap();
    assert_eq!(
        action.change,
        ActionChange::Reclassified {
            from: SystemState::Healthy,
            to: SystemState::Critical,
        }
    );
    assert_eq!(autotune.current_state(), SystemState::Critical);
}

#[test]
fn test_resource_pressure_tightens_then_relaxes() {
    let autotune = autotune();
    let pressure = |value: f64| SignalPayload::ResourceOptimization { pressure: value };

    autotune.emit_signal("executor", pressure(0.95)).unwrap();
    autotune.emit_signal("executor", pressure(0.95)).unwrap();
    assert_eq!(autotune.get_parameters().execution_parallelism, 2);

    assert!(autotune.emit_signal("executor", pressure(0.5)).is_none());

    autotune.emit_signal("executor", pressure(0.1)).unwrap();
    assert_eq!(autotune.get_parameters().execution_parallelism, 3);
}

#[test]
fn test_low_confidence_learning_signal_is_discarded() {
    let autotune = autotune();
    let action = autotune.emit_signal(
        "analyzer",
        SignalPayload::MetricsLearning {
            key: "cpu".into(),
            value: 42.0,
            confidence: 0.1,
            preferred_strategy: None,
        },
    );
    assert!(action.is_none());
    assert_eq!(autotune.thresholds().data_points("cpu"), 0);
    assert_eq!(autotune.feedback().signal_history().len(), 1);
}

#[test]
fn test_prebuilt_signal_keeps_its_id() {
    let autotune = autotune();
    let signal = FeedbackSignal::new("analyzer", false_positive(), chrono::Utc::now());
    let id = signal.id;

    let action = autotune.emit(signal).unwrap();
    assert_eq!(action.signal_id, Some(id));
    assert_eq!(autotune.feedback().signal_history()[0].id, id);
}

// ============================================================================
// Observers
// ============================================================================

#[test]
fn test_observers_only_see_their_loop() {
    let autotune = autotune();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    autotune.subscribe(
        LoopType::AnomalyFeedback,
        Arc::new(move |action: &Action| -> Result<(), ObserverError> {
            sink.lock().unwrap().push(action.parameter_changed.clone());
            Ok(())
        }),
    );

    autotune.emit_signal("analyzer", false_positive());
    autotune.emit_signal(
        "planner",
        SignalPayload::DecisionQuality {
            predicted: 10.0,
            actual: 20.0,
        },
    );

    assert_eq!(*seen.lock().unwrap(), vec!["anomaly_sensitivity".to_string()]);
}

#[test]
fn test_failing_observers_are_isolated() {
    let autotune = autotune();
    let delivered = Arc::new(AtomicUsize::new(0));

    autotune.subscribe(
        LoopType::AnomalyFeedback,
        Arc::new(|_: &Action| -> Result<(), ObserverError> { panic!("observer bug") }),
    );
    autotune.subscribe(
        LoopType::AnomalyFeedback,
        Arc::new(|_: &Action| -> Result<(), ObserverError> {
            Err(ObserverError::Failed {
                observer: "audit".into(),
                message: "sink offline".into(),
            })
        }),
    );
    let counter = Arc::clone(&delivered);
    autotune.subscribe(
        LoopType::AnomalyFeedback,
        Arc::new(move |_: &Action| -> Result<(), ObserverError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );

    let action = autotune.emit_signal("analyzer", false_positive());
    assert!(action.is_some());
    assert_eq!(delivered.load(Ordering::SeqCst), 1);

    let feedback = autotune.stats().feedback;
    let loop_stats = &feedback.loops[&LoopType::AnomalyFeedback];
    assert_eq!(loop_stats.observer_failures, 2);
    assert_eq!(loop_stats.observers, 3);
}

#[test]
fn test_unsubscribed_observer_stops_receiving() {
    let autotune = autotune();
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let observer: Arc<dyn ActionObserver> =
        Arc::new(move |_: &Action| -> Result<(), ObserverError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

    let id = autotune.subscribe(LoopType::AnomalyFeedback, observer);
    autotune.emit_signal("analyzer", false_positive());
    assert!(autotune.unsubscribe(id));
    assert!(!autotune.unsubscribe(id));
    autotune.emit_signal("analyzer", false_positive());

    assert_eq!(delivered.load(Ordering::SeqCst), 1);
}
