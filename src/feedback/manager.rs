//! Routes feedback signals to tuning actions and observers.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::{Action, ActionChange};
use super::signal::{FeedbackSignal, LoopType, SignalPayload};
use crate::config::{validate_feedback, FeedbackConfig};
use crate::dynamic::{DynamicParameterOptimizer, PerformanceSnapshot};
use crate::error::{ConfigError, ObserverError};
use crate::history::BoundedHistory;
use crate::sync::{lock, read, write};
use crate::thresholds::{SelfLearningThresholdOptimizer, ThresholdStrategy};
use crate::traits::{ActionObserver, RealTimeProvider, TimeProvider};

/// Handle returned by [`FeedbackLoopManager::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Counters for one loop type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopStats {
    /// Signals received.
    pub signals: u64,
    /// Actions applied.
    pub actions: u64,
    /// Observer calls that returned an error or panicked.
    pub observer_failures: u64,
    /// Registered observers.
    pub observers: usize,
    /// Fraction of signals that produced an action.
    pub effectiveness: f64,
}

/// Counters across all loop types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackStats {
    /// Per-loop counters.
    pub loops: BTreeMap<LoopType, LoopStats>,
    /// Signals received across all loops.
    pub total_signals: u64,
    /// Actions applied across all loops.
    pub total_actions: u64,
    /// Signals currently held in history.
    pub signal_history_size: usize,
    /// Actions currently held in history.
    pub action_history_size: usize,
}

#[derive(Debug, Default)]
struct LaneCounters {
    signals: u64,
    actions: u64,
    observer_failures: u64,
}

struct Subscriber {
    id: SubscriptionId,
    label: String,
    observer: Arc<dyn ActionObserver>,
}

/// One loop type's serialization point and observer list.
///
/// `counters` is held for the whole of handling and dispatch, so signals of
/// one type are processed in arrival order.
#[derive(Default)]
struct Lane {
    counters: Mutex<LaneCounters>,
    observers: RwLock<Vec<Subscriber>>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Turns outcome signals into tuning actions on the two optimizers and fans
/// the actions out to subscribed observers.
///
/// Each loop type is processed sequentially; different loop types run
/// independently. Observers are called synchronously on the emitting thread
/// and must not emit signals of their own loop type from inside
/// [`ActionObserver::on_action`].
pub struct FeedbackLoopManager {
    config: FeedbackConfig,
    thresholds: Arc<SelfLearningThresholdOptimizer>,
    dynamic: Arc<DynamicParameterOptimizer>,
    time: Arc<dyn TimeProvider>,
    lanes: [Lane; 5],
    signals: Mutex<BoundedHistory<FeedbackSignal>>,
    actions: Mutex<BoundedHistory<Action>>,
    next_subscription: AtomicU64,
}

impl std::fmt::Debug for FeedbackLoopManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackLoopManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FeedbackLoopManager {
    /// Create a manager acting on the given optimizers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn new(
        config: FeedbackConfig,
        thresholds: Arc<SelfLearningThresholdOptimizer>,
        dynamic: Arc<DynamicParameterOptimizer>,
    ) -> Result<Self, ConfigError> {
        Self::with_time_provider(config, thresholds, dynamic, Arc::new(RealTimeProvider))
    }

    /// Create a manager reading time from `time`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn with_time_provider(
        config: FeedbackConfig,
        thresholds: Arc<SelfLearningThresholdOptimizer>,
        dynamic: Arc<DynamicParameterOptimizer>,
        time: Arc<dyn TimeProvider>,
    ) -> Result<Self, ConfigError> {
        validate_feedback(&config)?;
        Ok(Self {
            signals: Mutex::new(BoundedHistory::new(config.signal_history_cap)),
            actions: Mutex::new(BoundedHistory::new(config.action_history_cap)),
            config,
            thresholds,
            dynamic,
            time,
            lanes: Default::default(),
            next_subscription: AtomicU64::new(1),
        })
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &FeedbackConfig {
        &self.config
    }

    const fn lane(&self, loop_type: LoopType) -> &Lane {
        &self.lanes[loop_type.index()]
    }

    // ========================================================================
    // Signals
    // ========================================================================

    /// Build a signal stamped with the current time and emit it.
    pub fn emit(&self, source: impl Into<String>, payload: SignalPayload) -> Option<Action> {
        let signal = FeedbackSignal::new(source, payload, self.time.now());
        self.emit_signal(signal)
    }

    /// Record `signal`, apply its handler, and notify observers of the
    /// resulting action.
    ///
    /// Returns the applied action, or `None` if the signal changed nothing.
    pub fn emit_signal(&self, signal: FeedbackSignal) -> Option<Action> {
        let loop_type = signal.loop_type();
        lock(&self.signals, "signal history").push(signal.clone());

        let lane = self.lane(loop_type);
        let mut counters = lock(&lane.counters, "feedback lane");
        counters.signals += 1;

        let Some(action) = self.handle(&signal) else {
            tracing::debug!(
                loop_type = %loop_type,
                source = %signal.source,
                "Feedback signal produced no action"
            );
            return None;
        };
        let action = action.caused_by(signal.id);
        counters.actions += 1;

        tracing::info!(
            loop_type = %loop_type,
            parameter = %action.parameter_changed,
            reason = %action.reason,
            "Feedback action applied"
        );
        lock(&self.actions, "action history").push(action.clone());

        counters.observer_failures += self.dispatch(lane, &action);
        Some(action)
    }

    fn handle(&self, signal: &FeedbackSignal) -> Option<Action> {
        let now = self.time.now();
        match &signal.payload {
            SignalPayload::MetricsLearning {
                key,
                value,
                confidence,
                preferred_strategy,
            } => self.handle_metrics_learning(key, *value, *confidence, *preferred_strategy, now),
            SignalPayload::PerformanceAdaptation { snapshot } => {
                self.handle_performance(snapshot.clone(), now)
            }
            SignalPayload::DecisionQuality { predicted, actual } => {
                self.handle_decision_quality(*predicted, *actual, now)
            }
            SignalPayload::AnomalyFeedback {
                true_positives,
                false_positives,
                false_negatives,
            } => self.handle_anomaly(*true_positives, *false_positives, *false_negatives, now),
            SignalPayload::ResourceOptimization { pressure } => {
                self.handle_resource(*pressure, now)
            }
        }
    }

    fn handle_metrics_learning(
        &self,
        key: &str,
        value: f64,
        confidence: f64,
        preferred: Option<ThresholdStrategy>,
        now: DateTime<Utc>,
    ) -> Option<Action> {
        if !confidence.is_finite() || confidence < self.config.min_signal_confidence {
            tracing::debug!(key = %key, confidence, "Discarding low-confidence observation");
            return None;
        }
        self.thresholds.add_metric_at(key, value, now);

        let strategy = preferred?;
        let before = self.thresholds.set_preferred_strategy(key, Some(strategy));
        let change = ActionChange::Strategy {
            before,
            after: strategy,
        };
        (!change.is_noop()).then(|| {
            Action::new(
                LoopType::MetricsLearning,
                format!("{key}.preferred_strategy"),
                change,
                format!("reporter prefers {strategy} for {key}"),
                now,
            )
        })
    }

    fn handle_performance(
        &self,
        snapshot: PerformanceSnapshot,
        now: DateTime<Utc>,
    ) -> Option<Action> {
        let evaluation = self.dynamic.record_performance(snapshot);
        let transition = evaluation.transition?;
        Some(Action::new(
            LoopType::PerformanceAdaptation,
            "system_state",
            ActionChange::Reclassified {
                from: transition.from,
                to: transition.to,
            },
            format!("out-of-cycle reclassification to {}", transition.to),
            now,
        ))
    }

    fn handle_decision_quality(
        &self,
        predicted: f64,
        actual: f64,
        now: DateTime<Utc>,
    ) -> Option<Action> {
        if !predicted.is_finite() || !actual.is_finite() {
            return None;
        }
        let error = (predicted - actual).abs() / actual.abs().max(f64::EPSILON);
        let tolerance = self.config.decision_error_tolerance;
        let delta = if error > tolerance {
            self.config.learning_rate_step
        } else if error <= tolerance / 2.0 {
            -self.config.learning_rate_step
        } else {
            return None;
        };

        let (state, before, after) = self.dynamic.adjust_learning_rate(
            delta,
            self.config.min_learning_rate,
            self.config.max_learning_rate,
        );
        let change = ActionChange::Delta { before, after };
        (!change.is_noop()).then(|| {
            Action::new(
                LoopType::DecisionQuality,
                format!("{state}.learning_rate"),
                change,
                format!("relative prediction error {:.1}%", error * 100.0),
                now,
            )
        })
    }

    fn handle_anomaly(
        &self,
        true_positives: u32,
        false_positives: u32,
        false_negatives: u32,
        now: DateTime<Utc>,
    ) -> Option<Action> {
        let step = self.config.sensitivity_step;
        let (delta, reason) = match false_positives.cmp(&false_negatives) {
            std::cmp::Ordering::Greater => (
                -step,
                format!("{false_positives} false positives vs {false_negatives} false negatives"),
            ),
            std::cmp::Ordering::Less => (
                step,
                format!("{false_negatives} false negatives vs {false_positives} false positives"),
            ),
            std::cmp::Ordering::Equal => {
                tracing::debug!(
                    true_positives,
                    false_positives,
                    false_negatives,
                    "Anomaly verdicts balanced; sensitivity unchanged"
                );
                return None;
            }
        };

        let (before, after) = self.thresholds.adjust_sensitivity(
            delta,
            self.config.min_sensitivity,
            self.config.max_sensitivity,
        );
        let change = ActionChange::Delta { before, after };
        (!change.is_noop())
            .then(|| Action::new(LoopType::AnomalyFeedback, "anomaly_sensitivity", change, reason, now))
    }

    fn handle_resource(&self, pressure: f64, now: DateTime<Utc>) -> Option<Action> {
        if !pressure.is_finite() {
            return None;
        }
        let (before, after) = if pressure >= self.config.high_pressure {
            self.dynamic.tighten_parallelism()
        } else if pressure <= self.config.low_pressure {
            self.dynamic.relax_parallelism(self.config.max_parallelism)
        } else {
            return None;
        };
        let change = ActionChange::Limit { before, after };
        (!change.is_noop()).then(|| {
            Action::new(
                LoopType::ResourceOptimization,
                "execution_parallelism_limit",
                change,
                format!("resource pressure {pressure:.2}"),
                now,
            )
        })
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Register `observer` for actions of `loop_type`.
    pub fn subscribe(
        &self,
        loop_type: LoopType,
        observer: Arc<dyn ActionObserver>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let label = format!("{loop_type}#{}", id.get());
        tracing::debug!(observer = %label, "Observer subscribed");
        write(&self.lane(loop_type).observers, "feedback observers").push(Subscriber {
            id,
            label,
            observer,
        });
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lanes.iter().any(|lane| {
            let mut observers = write(&lane.observers, "feedback observers");
            let before = observers.len();
            observers.retain(|subscriber| subscriber.id != id);
            observers.len() != before
        })
    }

    /// Call every observer of `lane`; returns how many failed.
    fn dispatch(&self, lane: &Lane, action: &Action) -> u64 {
        let subscribers: Vec<(String, Arc<dyn ActionObserver>)> =
            read(&lane.observers, "feedback observers")
                .iter()
                .map(|s| (s.label.clone(), Arc::clone(&s.observer)))
                .collect();

        let mut failures = 0;
        for (label, observer) in subscribers {
            let result = panic::catch_unwind(AssertUnwindSafe(|| observer.on_action(action)));
            let error = match result {
                Ok(Ok(())) => continue,
                Ok(Err(error)) => error,
                Err(payload) => ObserverError::Panicked {
                    observer: label.clone(),
                    message: panic_message(payload.as_ref()),
                },
            };
            failures += 1;
            tracing::error!(
                observer = %label,
                action = %action.id,
                error = %error,
                "Observer failed"
            );
        }
        failures
    }

    // ========================================================================
    // History & statistics
    // ========================================================================

    /// Signals received, oldest first.
    #[must_use]
    pub fn signal_history(&self) -> Vec<FeedbackSignal> {
        lock(&self.signals, "signal history").to_vec()
    }

    /// Actions applied, oldest first.
    #[must_use]
    pub fn action_history(&self) -> Vec<Action> {
        lock(&self.actions, "action history").to_vec()
    }

    /// Per-loop counts and effectiveness.
    #[must_use]
    pub fn statistics(&self) -> FeedbackStats {
        let mut loops = BTreeMap::new();
        let mut total_signals = 0;
        let mut total_actions = 0;
        for loop_type in LoopType::ALL {
            let lane = self.lane(loop_type);
            let observers = read(&lane.observers, "feedback observers").len();
            let counters = lock(&lane.counters, "feedback lane");
            #[allow(clippy::cast_precision_loss)]
            let effectiveness = if counters.signals == 0 {
                0.0
            } else {
                counters.actions as f64 / counters.signals as f64
            };
            total_signals += counters.signals;
            total_actions += counters.actions;
            loops.insert(
                loop_type,
                LoopStats {
                    signals: counters.signals,
                    actions: counters.actions,
                    observer_failures: counters.observer_failures,
                    observers,
                    effectiveness,
                },
            );
        }
        FeedbackStats {
            loops,
            total_signals,
            total_actions,
            signal_history_size: lock(&self.signals, "signal history").len(),
            action_history_size: lock(&self.actions, "action history").len(),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::float_cmp
)]
mod tests {
    use super::*;
    use crate::config::{DynamicConfig, ThresholdConfig};
    use crate::dynamic::SystemState;
    use crate::test_utils::{fixed_time, mock_time_str};
    use crate::traits::MockActionObserver;
    use pretty_assertions::assert_eq;
    use static_assertions::assert_impl_all;
    use std::sync::atomic::AtomicUsize;

    assert_impl_all!(FeedbackLoopManager: Send, Sync);

    struct Fixture {
        thresholds: Arc<SelfLearningThresholdOptimizer>,
        dynamic: Arc<DynamicParameterOptimizer>,
        manager: FeedbackLoopManager,
    }

    fn fixture(config: FeedbackConfig) -> Fixture {
        let thresholds = Arc::new(SelfLearningThresholdOptimizer::with_defaults());
        let dynamic = Arc::new(DynamicParameterOptimizer::with_defaults());
        let manager =
            FeedbackLoopManager::new(config, Arc::clone(&thresholds), Arc::clone(&dynamic))
                .unwrap();
        Fixture {
            thresholds,
            dynamic,
            manager,
        }
    }

    fn false_positives(n: u32) -> SignalPayload {
        SignalPayload::AnomalyFeedback {
            true_positives: 0,
            false_positives: n,
            false_negatives: 0,
        }
    }

    #[test]
    fn test_false_positive_decreases_sensitivity() {
        let f = fixture(FeedbackConfig::default());
        assert_eq!(f.thresholds.sensitivity(), 2.0);

        let action = f.manager.emit("analyzer", false_positives(3)).unwrap();
        assert!((f.thresholds.sensitivity() - 1.9).abs() < 1e-12);
        assert_eq!(action.loop_type, LoopType::AnomalyFeedback);
        assert_eq!(action.parameter_changed, "anomaly_sensitivity");
        assert!((action.change.delta().unwrap() + 0.1).abs() < 1e-12);

        let history = f.manager.action_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0], action);
        assert_eq!(action.signal_id, Some(f.manager.signal_history()[0].id));
    }

    #[test]
    fn test_false_negative_increases_sensitivity() {
        let f = fixture(FeedbackConfig::default());
        f.manager.emit(
            "analyzer",
            SignalPayload::AnomalyFeedback {
                true_positives: 1,
                false_positives: 0,
                false_negatives: 2,
            },
        );
        assert!((f.thresholds.sensitivity() - 2.1).abs() < 1e-12);
    }

    #[test]
    fn test_true_positives_only_is_no_action() {
        let f = fixture(FeedbackConfig::default());
        let action = f.manager.emit(
            "analyzer",
            SignalPayload::AnomalyFeedback {
                true_positives: 5,
                false_positives: 0,
                false_negatives: 0,
            },
        );
        assert!(action.is_none());
        assert_eq!(f.thresholds.sensitivity(), 2.0);
        assert_eq!(f.manager.signal_history().len(), 1);
        assert!(f.manager.action_history().is_empty());
    }

    #[test]
    fn test_sensitivity_stops_at_bound() {
        let f = fixture(FeedbackConfig {
            min_sensitivity: 1.85,
            ..FeedbackConfig::default()
        });
        assert!(f.manager.emit("a", false_positives(1)).is_some());
        assert!(f.manager.emit("a", false_positives(1)).is_some());
        assert_eq!(f.thresholds.sensitivity(), 1.85);
        assert!(f.manager.emit("a", false_positives(1)).is_none());
        assert_eq!(f.manager.action_history().len(), 2);
    }

    #[test]
    fn test_decision_quality_adjusts_active_learning_rate() {
        let f = fixture(FeedbackConfig::default());

        // 50% error speeds learning up
        let action = f
            .manager
            .emit(
                "planner",
                SignalPayload::DecisionQuality {
                    predicted: 150.0,
                    actual: 100.0,
                },
            )
            .unwrap();
        assert_eq!(action.parameter_changed, "healthy.learning_rate");
        assert!((f.dynamic.current_parameters().learning_rate - 0.12).abs() < 1e-12);

        // within half the tolerance slows it down again
        f.manager.emit(
            "planner",
            SignalPayload::DecisionQuality {
                predicted: 101.0,
                actual: 100.0,
            },
        );
        assert!((f.dynamic.current_parameters().learning_rate - 0.1).abs() < 1e-12);

        // between half and full tolerance leaves it alone
        let none = f.manager.emit(
            "planner",
            SignalPayload::DecisionQuality {
                predicted: 108.0,
                actual: 100.0,
            },
        );
        assert!(none.is_none());
    }

    #[test]
    fn test_resource_pressure_moves_parallelism_limit() {
        let f = fixture(FeedbackConfig::default());
        let action = f
            .manager
            .emit(
                "executor",
                SignalPayload::ResourceOptimization { pressure: 0.95 },
            )
            .unwrap();
        assert_eq!(
            action.change,
            ActionChange::Limit {
                before: 8,
                after: 3
            }
        );
        assert_eq!(f.dynamic.current_parameters().execution_parallelism, 3);

        assert!(f
            .manager
            .emit("executor", SignalPayload::ResourceOptimization { pressure: 0.5 })
            .is_none());

        f.manager.emit(
            "executor",
            SignalPayload::ResourceOptimization { pressure: 0.1 },
        );
        assert_eq!(f.dynamic.parallelism_limit(), 4);
    }

    #[test]
    fn test_metrics_learning_feeds_and_prefers() {
        let f = fixture(FeedbackConfig::default());
        let payload = SignalPayload::MetricsLearning {
            key: "latency".into(),
            value: 120.0,
            confidence: 0.9,
            preferred_strategy: Some(ThresholdStrategy::Iqr),
        };
        let action = f.manager.emit("monitor", payload.clone()).unwrap();
        assert_eq!(f.thresholds.data_points("latency"), 1);
        assert_eq!(
            f.thresholds.preferred_strategy("latency"),
            Some(ThresholdStrategy::Iqr)
        );
        assert_eq!(action.parameter_changed, "latency.preferred_strategy");

        // same preference again is not an action, but the value still lands
        assert!(f.manager.emit("monitor", payload).is_none());
        assert_eq!(f.thresholds.data_points("latency"), 2);
    }

    #[test]
    fn test_low_confidence_observation_discarded() {
        let f = fixture(FeedbackConfig::default());
        let action = f.manager.emit(
            "monitor",
            SignalPayload::MetricsLearning {
                key: "latency".into(),
                value: 120.0,
                confidence: 0.2,
                preferred_strategy: Some(ThresholdStrategy::Sigma),
            },
        );
        assert!(action.is_none());
        assert_eq!(f.thresholds.data_points("latency"), 0);
        assert_eq!(f.thresholds.preferred_strategy("latency"), None);
    }

    #[test]
    fn test_performance_adaptation_reports_committed_transition() {
        let f = fixture(FeedbackConfig::default());
        let payload = SignalPayload::PerformanceAdaptation {
            snapshot: PerformanceSnapshot::new()
                .with_error_rate(0.15)
                .with_p99_latency_ms(2_000.0),
        };
        assert!(f.manager.emit("executor", payload.clone()).is_none());
        let action = f.manager.emit("executor", payload).unwrap();
        assert_eq!(
            action.change,
            ActionChange::Reclassified {
                from: SystemState::Healthy,
                to: SystemState::Critical,
            }
        );
        assert_eq!(f.dynamic.current_state(), SystemState::Critical);
    }

    #[test]
    fn test_failing_observer_is_isolated() {
        let f = fixture(FeedbackConfig::default());

        let mut failing = MockActionObserver::new();
        failing.expect_on_action().times(1).returning(|_| {
            Err(ObserverError::Failed {
                observer: "failing".into(),
                message: "downstream unavailable".into(),
            })
        });
        f.manager
            .subscribe(LoopType::AnomalyFeedback, Arc::new(failing));

        let panicking = |_: &Action| -> Result<(), ObserverError> { panic!("observer bug") };
        f.manager
            .subscribe(LoopType::AnomalyFeedback, Arc::new(panicking));

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        f.manager.subscribe(
            LoopType::AnomalyFeedback,
            Arc::new(move |_: &Action| -> Result<(), ObserverError> {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let action = f.manager.emit("analyzer", false_positives(1));
        assert!(action.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!((f.thresholds.sensitivity() - 1.9).abs() < 1e-12);

        let stats = f.manager.statistics();
        let anomaly = &stats.loops[&LoopType::AnomalyFeedback];
        assert_eq!(anomaly.observer_failures, 2);
        assert_eq!(anomaly.observers, 3);
    }

    #[test]
    fn test_observers_only_see_their_loop_type() {
        let f = fixture(FeedbackConfig::default());
        let mut observer = MockActionObserver::new();
        observer.expect_on_action().times(0);
        f.manager
            .subscribe(LoopType::DecisionQuality, Arc::new(observer));

        f.manager.emit("analyzer", false_positives(1));
    }

    #[test]
    fn test_unsubscribe() {
        let f = fixture(FeedbackConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let id = f.manager.subscribe(
            LoopType::AnomalyFeedback,
            Arc::new(move |_: &Action| -> Result<(), ObserverError> {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        f.manager.emit("a", false_positives(1));
        assert!(f.manager.unsubscribe(id));
        assert!(!f.manager.unsubscribe(id));
        f.manager.emit("a", false_positives(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_statistics_effectiveness() {
        let f = fixture(FeedbackConfig::default());
        f.manager.emit("a", false_positives(1));
        f.manager.emit(
            "a",
            SignalPayload::AnomalyFeedback {
                true_positives: 3,
                false_positives: 0,
                false_negatives: 0,
            },
        );
        let stats = f.manager.statistics();
        let anomaly = &stats.loops[&LoopType::AnomalyFeedback];
        assert_eq!(anomaly.signals, 2);
        assert_eq!(anomaly.actions, 1);
        assert_eq!(anomaly.effectiveness, 0.5);
        assert_eq!(stats.loops[&LoopType::MetricsLearning].effectiveness, 0.0);
        assert_eq!(stats.total_signals, 2);
        assert_eq!(stats.total_actions, 1);
    }

    #[test]
    fn test_histories_capped() {
        let f = fixture(FeedbackConfig {
            signal_history_cap: 5,
            action_history_cap: 3,
            min_sensitivity: 0.5,
            ..FeedbackConfig::default()
        });
        for _ in 0..10 {
            f.manager.emit("a", false_positives(1));
        }
        let stats = f.manager.statistics();
        assert_eq!(stats.signal_history_size, 5);
        assert_eq!(stats.action_history_size, 3);
        assert_eq!(stats.total_signals, 10);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = FeedbackLoopManager::new(
            FeedbackConfig {
                min_sensitivity: 3.0,
                max_sensitivity: 1.0,
                ..FeedbackConfig::default()
            },
            Arc::new(SelfLearningThresholdOptimizer::new(ThresholdConfig::default()).unwrap()),
            Arc::new(DynamicParameterOptimizer::new(DynamicConfig::default()).unwrap()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_signal_and_action_stamped_from_time_provider() {
        let manager = FeedbackLoopManager::with_time_provider(
            FeedbackConfig::default(),
            Arc::new(SelfLearningThresholdOptimizer::with_defaults()),
            Arc::new(DynamicParameterOptimizer::with_defaults()),
            Arc::new(mock_time_str("2024-01-15T12:00:00Z")),
        )
        .unwrap();

        let action = manager.emit("analyzer", false_positives(1)).unwrap();
        assert_eq!(action.timestamp, fixed_time());
        assert_eq!(manager.signal_history()[0].timestamp, fixed_time());
    }
}
