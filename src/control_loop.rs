//! The self-tuning loop as one context object.
//!
//! [`AutotuneLoop`] owns the threshold optimizer, the dynamic parameter
//! optimizer and the feedback manager wired to both. Create one per control
//! cycle and share it behind an `Arc`; every method takes `&self`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{validate_config, AutotuneConfig};
use crate::dynamic::{
    DynamicParameterOptimizer, DynamicStats, Evaluation, ParameterSet, PerformanceSnapshot,
    StateTransition, SystemState,
};
use crate::error::ConfigError;
use crate::feedback::{
    Action, FeedbackLoopManager, FeedbackSignal, FeedbackStats, LoopType, SignalPayload,
    SubscriptionId,
};
use crate::thresholds::{
    Anomaly, LearningStats, OptimizationOutcome, SelfLearningThresholdOptimizer,
    ThresholdRecommendation,
};
use crate::traits::{ActionObserver, RealTimeProvider, TimeProvider};

/// Combined counters from all three components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutotuneStats {
    /// Threshold learning counters.
    pub learning: LearningStats,
    /// State machine counters.
    pub dynamic: DynamicStats,
    /// Feedback counters.
    pub feedback: FeedbackStats,
}

/// Self-tuning loop context.
#[derive(Debug)]
pub struct AutotuneLoop {
    config: AutotuneConfig,
    thresholds: Arc<SelfLearningThresholdOptimizer>,
    dynamic: Arc<DynamicParameterOptimizer>,
    feedback: FeedbackLoopManager,
}

impl AutotuneLoop {
    /// Build a loop from `config` using the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn new(config: AutotuneConfig) -> Result<Self, ConfigError> {
        Self::with_time_provider(config, Arc::new(RealTimeProvider))
    }

    /// Build a loop whose components all read time from `time`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn with_time_provider(
        config: AutotuneConfig,
        time: Arc<dyn TimeProvider>,
    ) -> Result<Self, ConfigError> {
        validate_config(&config)?;

        let thresholds = Arc::new(SelfLearningThresholdOptimizer::with_time_provider(
            config.thresholds.clone(),
            Arc::clone(&time),
        )?);
        let dynamic = Arc::new(DynamicParameterOptimizer::build(
            config.dynamic.clone(),
            Arc::clone(&time),
            config.feedback.max_parallelism,
        ));
        let feedback = FeedbackLoopManager::with_time_provider(
            config.feedback.clone(),
            Arc::clone(&thresholds),
            Arc::clone(&dynamic),
            time,
        )?;

        tracing::info!(
            buffer_capacity = config.thresholds.buffer_capacity,
            min_data_points = config.thresholds.min_data_points,
            hysteresis_cycles = config.dynamic.hysteresis_cycles,
            "Autotune loop initialized"
        );

        Ok(Self {
            config,
            thresholds,
            dynamic,
            feedback,
        })
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &AutotuneConfig {
        &self.config
    }

    /// The threshold optimizer.
    #[must_use]
    pub fn thresholds(&self) -> &SelfLearningThresholdOptimizer {
        &self.thresholds
    }

    /// The dynamic parameter optimizer.
    #[must_use]
    pub fn dynamic(&self) -> &DynamicParameterOptimizer {
        &self.dynamic
    }

    /// The feedback manager.
    #[must_use]
    pub const fn feedback(&self) -> &FeedbackLoopManager {
        &self.feedback
    }

    // ========================================================================
    // Monitor side
    // ========================================================================

    /// Buffer one metric sample. Returns `false` if it was rejected as
    /// non-finite.
    pub fn push_metric(&self, key: &str, value: f64) -> bool {
        self.thresholds.add_metric(key, value)
    }

    /// Record a performance snapshot and run one classification cycle.
    pub fn record_performance(&self, snapshot: PerformanceSnapshot) -> Evaluation {
        self.dynamic.record_performance(snapshot)
    }

    /// Run a gated optimization pass over every key.
    pub fn maybe_optimize(&self) -> BTreeMap<String, OptimizationOutcome> {
        self.thresholds.maybe_optimize()
    }

    /// Run an optimization pass ignoring the interval gate.
    pub fn force_optimize(&self) -> BTreeMap<String, OptimizationOutcome> {
        self.thresholds.force_optimize()
    }

    /// Buffered points of `key` that are currently anomalous.
    #[must_use]
    pub fn detect_anomalies(&self, key: &str) -> Vec<Anomaly> {
        self.thresholds.detect_anomalies(key)
    }

    // ========================================================================
    // Feedback side
    // ========================================================================

    /// Report an outcome.
    pub fn emit_signal(&self, source: impl Into<String>, payload: SignalPayload) -> Option<Action> {
        self.feedback.emit(source, payload)
    }

    /// Report a prebuilt signal.
    pub fn emit(&self, signal: FeedbackSignal) -> Option<Action> {
        self.feedback.emit_signal(signal)
    }

    /// Register an observer for actions of `loop_type`.
    pub fn subscribe(
        &self,
        loop_type: LoopType,
        observer: Arc<dyn ActionObserver>,
    ) -> SubscriptionId {
        self.feedback.subscribe(loop_type, observer)
    }

    /// Remove a subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.feedback.unsubscribe(id)
    }

    // ========================================================================
    // Readers
    // ========================================================================

    /// Latest recommendation per key.
    #[must_use]
    pub fn get_thresholds(&self) -> BTreeMap<String, ThresholdRecommendation> {
        self.thresholds.export_thresholds()
    }

    /// Effective parameters for the committed state.
    #[must_use]
    pub fn get_parameters(&self) -> ParameterSet {
        self.dynamic.current_parameters()
    }

    /// Committed state.
    #[must_use]
    pub fn current_state(&self) -> SystemState {
        self.dynamic.current_state()
    }

    /// Commit `state` immediately.
    pub fn force_state(&self, state: SystemState) -> Option<StateTransition> {
        self.dynamic.force_state(state)
    }

    /// Counters from every component.
    #[must_use]
    pub fn stats(&self) -> AutotuneStats {
        AutotuneStats {
            learning: self.thresholds.learning_stats(),
            dynamic: self.dynamic.optimization_stats(),
            feedback: self.feedback.statistics(),
        }
    }
}
