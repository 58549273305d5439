//! State-based dynamic parameter optimizer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classifier::{classify, ClassificationContext};
use super::state::{
    ParameterSet, PerformanceRecord, PerformanceSnapshot, StateTransition, SystemState,
};
use crate::config::{validate_dynamic, DynamicConfig, DEFAULT_MAX_PARALLELISM};
use crate::error::ConfigError;
use crate::history::BoundedHistory;
use crate::sync::lock;
use crate::traits::{RealTimeProvider, TimeProvider};

/// Result of one evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// What the snapshot classified as.
    pub candidate: SystemState,
    /// Committed state after the cycle.
    pub state: SystemState,
    /// Consecutive cycles the candidate has been seen, when it differs from
    /// the committed state.
    pub streak: u32,
    /// Transition committed by this cycle, if any.
    pub transition: Option<StateTransition>,
}

/// Counters and current parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicStats {
    /// Committed state.
    pub current_state: SystemState,
    /// Transitions committed since creation.
    pub total_transitions: u64,
    /// Evaluation cycles run since creation.
    pub total_evaluations: u64,
    /// Snapshots held in the performance history.
    pub performance_history_size: usize,
    /// Transitions held in the transition history.
    pub transition_history_size: usize,
    /// Effective parameters for the committed state.
    pub current_parameters: ParameterSet,
    /// Current parallelism limit.
    pub parallelism_limit: u32,
    /// Exploration flag.
    pub exploration: bool,
}

/// Runtime adjustments layered over the read-only base table.
#[derive(Debug, Clone)]
struct Overlays {
    learning_rate: HashMap<SystemState, f64>,
    parallelism_limit: u32,
}

#[derive(Debug)]
struct Inner {
    current: SystemState,
    pending: Option<(SystemState, u32)>,
    last_snapshot: Option<PerformanceSnapshot>,
    exploration: bool,
    transitions: BoundedHistory<StateTransition>,
    performance: BoundedHistory<PerformanceRecord>,
    total_transitions: u64,
    total_evaluations: u64,
    overlays: Overlays,
}

impl Inner {
    fn commit(
        &mut self,
        to: SystemState,
        at: DateTime<Utc>,
        triggering_metrics: Option<PerformanceSnapshot>,
        forced: bool,
    ) -> StateTransition {
        let transition = StateTransition {
            from: self.current,
            to,
            timestamp: at,
            triggering_metrics,
            forced,
        };
        tracing::info!(
            from = %transition.from,
            to = %transition.to,
            forced,
            "System state transition"
        );
        self.current = to;
        self.pending = None;
        self.total_transitions += 1;
        self.transitions.push(transition.clone());
        transition
    }
}

/// Classifies health from performance snapshots and maps the committed
/// state to a parameter set.
///
/// A new classification only commits after it has been seen on
/// `hysteresis_cycles` consecutive evaluations.
pub struct DynamicParameterOptimizer {
    config: DynamicConfig,
    time: Arc<dyn TimeProvider>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for DynamicParameterOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicParameterOptimizer")
            .field("config", &self.config)
            .field("state", &self.current_state())
            .finish_non_exhaustive()
    }
}

impl DynamicParameterOptimizer {
    /// Create an optimizer using the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn new(config: DynamicConfig) -> Result<Self, ConfigError> {
        Self::with_time_provider(config, Arc::new(RealTimeProvider))
    }

    /// Create an optimizer with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::build(
            DynamicConfig::default(),
            Arc::new(RealTimeProvider),
            DEFAULT_MAX_PARALLELISM,
        )
    }

    /// Create an optimizer reading time from `time`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn with_time_provider(
        config: DynamicConfig,
        time: Arc<dyn TimeProvider>,
    ) -> Result<Self, ConfigError> {
        validate_dynamic(&config)?;
        Ok(Self::build(config, time, DEFAULT_MAX_PARALLELISM))
    }

    pub(crate) fn build(
        config: DynamicConfig,
        time: Arc<dyn TimeProvider>,
        parallelism_limit: u32,
    ) -> Self {
        let inner = Inner {
            current: SystemState::Healthy,
            pending: None,
            last_snapshot: None,
            exploration: false,
            transitions: BoundedHistory::new(config.transition_history_cap),
            performance: BoundedHistory::new(config.performance_history_cap),
            total_transitions: 0,
            total_evaluations: 0,
            overlays: Overlays {
                learning_rate: HashMap::new(),
                parallelism_limit: parallelism_limit.max(1),
            },
        };
        Self {
            config,
            time,
            inner: Mutex::new(inner),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &DynamicConfig {
        &self.config
    }

    // ========================================================================
    // Classification
    // ========================================================================

    /// Classify `snapshot` against the current context without changing
    /// anything.
    #[must_use]
    pub fn classify(&self, snapshot: &PerformanceSnapshot) -> SystemState {
        let inner = lock(&self.inner, "dynamic optimizer");
        let context = ClassificationContext {
            previous_state: inner.current,
            previous_snapshot: inner.last_snapshot.as_ref(),
            exploration: inner.exploration,
        };
        classify(snapshot, &context, &self.config)
    }

    /// Record a snapshot in the performance history and run one evaluation
    /// cycle on it.
    pub fn record_performance(&self, snapshot: PerformanceSnapshot) -> Evaluation {
        let now = self.time.now();
        let mut inner = lock(&self.inner, "dynamic optimizer");
        inner.performance.push(PerformanceRecord {
            timestamp: now,
            snapshot: snapshot.clone(),
        });
        self.evaluate_locked(&mut inner, snapshot, now)
    }

    fn evaluate_locked(
        &self,
        inner: &mut Inner,
        snapshot: PerformanceSnapshot,
        now: DateTime<Utc>,
    ) -> Evaluation {
        let candidate = {
            let context = ClassificationContext {
                previous_state: inner.current,
                previous_snapshot: inner.last_snapshot.as_ref(),
                exploration: inner.exploration,
            };
            classify(&snapshot, &context, &self.config)
        };
        inner.total_evaluations += 1;

        let mut streak = 0;
        let mut transition = None;
        if candidate == inner.current {
            inner.pending = None;
        } else {
            streak = match inner.pending {
                Some((state, count)) if state == candidate => count.saturating_add(1),
                _ => 1,
            };
            if streak >= self.config.hysteresis_cycles {
                transition = Some(inner.commit(candidate, now, Some(snapshot.clone()), false));
            } else {
                tracing::debug!(
                    current = %inner.current,
                    candidate = %candidate,
                    streak,
                    "Holding state change for hysteresis"
                );
                inner.pending = Some((candidate, streak));
            }
        }

        inner.last_snapshot = Some(snapshot);
        Evaluation {
            candidate,
            state: inner.current,
            streak,
            transition,
        }
    }

    /// Commit `state` immediately, bypassing classification and hysteresis.
    ///
    /// Returns the transition, or `None` if already in `state`.
    pub fn force_state(&self, state: SystemState) -> Option<StateTransition> {
        let now = self.time.now();
        let mut inner = lock(&self.inner, "dynamic optimizer");
        if inner.current == state {
            return None;
        }
        Some(inner.commit(state, now, None, true))
    }

    /// Set the exploration flag.
    pub fn set_exploration(&self, exploration: bool) {
        lock(&self.inner, "dynamic optimizer").exploration = exploration;
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Committed state.
    #[must_use]
    pub fn current_state(&self) -> SystemState {
        lock(&self.inner, "dynamic optimizer").current
    }

    /// Effective parameters for `state`, with feedback overlays applied.
    #[must_use]
    pub fn parameters_for(&self, state: SystemState) -> ParameterSet {
        let inner = lock(&self.inner, "dynamic optimizer");
        Self::effective(&inner.overlays, state)
    }

    /// Effective parameters for the committed state.
    #[must_use]
    pub fn current_parameters(&self) -> ParameterSet {
        let inner = lock(&self.inner, "dynamic optimizer");
        Self::effective(&inner.overlays, inner.current)
    }

    fn effective(overlays: &Overlays, state: SystemState) -> ParameterSet {
        let mut params = state.base_parameters();
        if let Some(rate) = overlays.learning_rate.get(&state) {
            params.learning_rate = *rate;
        }
        params.execution_parallelism = params
            .execution_parallelism
            .min(overlays.parallelism_limit)
            .max(1);
        params
    }

    /// Add `delta` to the learning rate of the committed state, clamped to
    /// `[min, max]`.
    ///
    /// Returns the state adjusted and the rate before and after.
    pub fn adjust_learning_rate(&self, delta: f64, min: f64, max: f64) -> (SystemState, f64, f64) {
        let mut inner = lock(&self.inner, "dynamic optimizer");
        let state = inner.current;
        let before = Self::effective(&inner.overlays, state).learning_rate;
        let after = (before + delta).clamp(min, max);
        inner.overlays.learning_rate.insert(state, after);
        (state, before, after)
    }

    /// Current parallelism limit.
    #[must_use]
    pub fn parallelism_limit(&self) -> u32 {
        lock(&self.inner, "dynamic optimizer").overlays.parallelism_limit
    }

    /// Tighten the parallelism limit to one below the committed state's
    /// effective parallelism (never below 1).
    ///
    /// Returns the limit before and after.
    pub fn tighten_parallelism(&self) -> (u32, u32) {
        let mut inner = lock(&self.inner, "dynamic optimizer");
        let before = inner.overlays.parallelism_limit;
        let effective = Self::effective(&inner.overlays, inner.current).execution_parallelism;
        let after = effective.saturating_sub(1).max(1).min(before);
        inner.overlays.parallelism_limit = after;
        (before, after)
    }

    /// Relax the parallelism limit by one, up to `ceiling`.
    ///
    /// Returns the limit before and after.
    pub fn relax_parallelism(&self, ceiling: u32) -> (u32, u32) {
        let mut inner = lock(&self.inner, "dynamic optimizer");
        let before = inner.overlays.parallelism_limit;
        let after = if before < ceiling { before + 1 } else { before };
        inner.overlays.parallelism_limit = after;
        (before, after)
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Committed transitions, oldest first.
    #[must_use]
    pub fn transitions(&self) -> Vec<StateTransition> {
        lock(&self.inner, "dynamic optimizer").transitions.to_vec()
    }

    /// Recorded snapshots, oldest first.
    #[must_use]
    pub fn performance_history(&self) -> Vec<PerformanceRecord> {
        lock(&self.inner, "dynamic optimizer").performance.to_vec()
    }

    /// Counters and current parameters.
    #[must_use]
    pub fn optimization_stats(&self) -> DynamicStats {
        let inner = lock(&self.inner, "dynamic optimizer");
        DynamicStats {
            current_state: inner.current,
            total_transitions: inner.total_transitions,
            total_evaluations: inner.total_evaluations,
            performance_history_size: inner.performance.len(),
            transition_history_size: inner.transitions.len(),
            current_parameters: Self::effective(&inner.overlays, inner.current),
            parallelism_limit: inner.overlays.parallelism_limit,
            exploration: inner.exploration,
        }
    }
}
