//! The self-learning threshold optimizer.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};

use super::anomaly::{self, Anomaly};
use super::confidence::ConfidenceBreakdown;
use super::strategy::{self, ThresholdStrategy};
use super::{LearningStats, OptimizationOutcome, PendingReason, ThresholdRecommendation};
use crate::config::{validate_thresholds, ThresholdConfig};
use crate::error::ConfigError;
use crate::history::BoundedHistory;
use crate::metrics::{MetricStatistics, MetricsBuffer};
use crate::sync::{lock, read, write};
use crate::traits::{RealTimeProvider, TimeProvider};

/// Mutable state for one metric key.
#[derive(Debug)]
struct KeyState {
    buffer: Mutex<MetricsBuffer>,
    busy: AtomicBool,
    last_optimized: Mutex<Option<DateTime<Utc>>>,
    preferred: Mutex<Option<ThresholdStrategy>>,
}

impl KeyState {
    fn new(key: &str, config: &ThresholdConfig) -> Self {
        Self {
            buffer: Mutex::new(MetricsBuffer::new(key, config)),
            busy: AtomicBool::new(false),
            last_optimized: Mutex::new(None),
            preferred: Mutex::new(None),
        }
    }
}

/// Clears a key's busy flag when the pass ends, including on unwind.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// History plus the latest recommendation per key, updated together.
#[derive(Debug)]
struct RecommendationLog {
    history: BoundedHistory<ThresholdRecommendation>,
    latest: HashMap<String, ThresholdRecommendation>,
}

/// Learns thresholds from buffered metrics.
///
/// Each key has its own lock and busy flag; the key map is only
/// write-locked when a new key appears. Statistics are computed from a copy
/// of the samples, outside the key's lock.
pub struct SelfLearningThresholdOptimizer {
    config: ThresholdConfig,
    time: Arc<dyn TimeProvider>,
    keys: RwLock<HashMap<String, Arc<KeyState>>>,
    log: Mutex<RecommendationLog>,
    sensitivity: Mutex<f64>,
    optimizations_run: AtomicU64,
}

impl std::fmt::Debug for SelfLearningThresholdOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfLearningThresholdOptimizer")
            .field("config", &self.config)
            .field("keys", &read(&self.keys, "threshold keys").len())
            .field("sensitivity", &self.sensitivity())
            .finish_non_exhaustive()
    }
}

impl SelfLearningThresholdOptimizer {
    /// Create an optimizer using the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn new(config: ThresholdConfig) -> Result<Self, ConfigError> {
        Self::with_time_provider(config, Arc::new(RealTimeProvider))
    }

    /// Create an optimizer with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::build(ThresholdConfig::default(), Arc::new(RealTimeProvider))
    }

    /// Create an optimizer reading time from `time`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn with_time_provider(
        config: ThresholdConfig,
        time: Arc<dyn TimeProvider>,
    ) -> Result<Self, ConfigError> {
        validate_thresholds(&config)?;
        Ok(Self::build(config, time))
    }

    fn build(config: ThresholdConfig, time: Arc<dyn TimeProvider>) -> Self {
        Self {
            log: Mutex::new(RecommendationLog {
                history: BoundedHistory::new(config.history_cap),
                latest: HashMap::new(),
            }),
            sensitivity: Mutex::new(config.anomaly_sensitivity),
            config,
            time,
            keys: RwLock::new(HashMap::new()),
            optimizations_run: AtomicU64::new(0),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    fn key_state(&self, key: &str) -> Arc<KeyState> {
        if let Some(state) = read(&self.keys, "threshold keys").get(key) {
            return Arc::clone(state);
        }
        let mut keys = write(&self.keys, "threshold keys");
        Arc::clone(keys.entry(key.to_string()).or_insert_with(|| {
            tracing::debug!(key = %key, "Tracking new metric key");
            Arc::new(KeyState::new(key, &self.config))
        }))
    }

    fn existing(&self, key: &str) -> Option<Arc<KeyState>> {
        read(&self.keys, "threshold keys").get(key).cloned()
    }

    /// Record a sample for `key` at the current time.
    ///
    /// Returns `false` if the value was rejected as non-finite.
    pub fn add_metric(&self, key: &str, value: f64) -> bool {
        self.add_metric_at(key, value, self.time.now())
    }

    /// Record a sample for `key` with an explicit timestamp.
    pub fn add_metric_at(&self, key: &str, value: f64, timestamp: DateTime<Utc>) -> bool {
        let state = self.key_state(key);
        let accepted = lock(&state.buffer, "metric buffer").add(value, timestamp);
        accepted
    }

    // ========================================================================
    // Optimization
    // ========================================================================

    /// Run one optimization pass over every key, honouring both gates.
    ///
    /// Keys below the data minimum or inside their interval come back
    /// [`OptimizationOutcome::Pending`]; keys already being optimized come
    /// back [`OptimizationOutcome::Skipped`].
    pub fn maybe_optimize(&self) -> BTreeMap<String, OptimizationOutcome> {
        self.run_all(true)
    }

    /// Run one pass ignoring the interval gate; the data gate still applies.
    pub fn force_optimize(&self) -> BTreeMap<String, OptimizationOutcome> {
        self.run_all(false)
    }

    /// Optimize a single key, honouring both gates.
    ///
    /// Returns `None` if the key has never been seen.
    pub fn optimize_key(&self, key: &str) -> Option<OptimizationOutcome> {
        let state = self.existing(key)?;
        Some(self.run_key(key, &state, self.time.now(), true))
    }

    fn run_all(&self, respect_interval: bool) -> BTreeMap<String, OptimizationOutcome> {
        let now = self.time.now();
        let keys: Vec<(String, Arc<KeyState>)> = read(&self.keys, "threshold keys")
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();

        keys.into_iter()
            .map(|(key, state)| {
                let outcome = self.run_key(&key, &state, now, respect_interval);
                (key, outcome)
            })
            .collect()
    }

    fn run_key(
        &self,
        key: &str,
        state: &KeyState,
        now: DateTime<Utc>,
        respect_interval: bool,
    ) -> OptimizationOutcome {
        let Some(_busy) = BusyGuard::try_acquire(&state.busy) else {
            tracing::debug!(key = %key, "Optimization already running, skipping");
            return OptimizationOutcome::Skipped;
        };

        let (cached, snapshot) = {
            let buffer = lock(&state.buffer, "metric buffer");
            let need = self.config.min_data_points;
            if buffer.len() < need {
                tracing::debug!(key = %key, have = buffer.len(), need, "Insufficient data");
                return OptimizationOutcome::Pending(PendingReason::InsufficientData {
                    have: buffer.len(),
                    need,
                });
            }
            (buffer.cached_statistics(now), buffer.snapshot())
        };

        if respect_interval {
            if let Some(last) = *lock(&state.last_optimized, "last optimized") {
                let elapsed = now - last;
                let interval = self.config.optimization_interval();
                if elapsed < interval {
                    let remaining_secs = (interval - elapsed).num_seconds();
                    tracing::debug!(key = %key, remaining_secs, "Optimization not due");
                    return OptimizationOutcome::Pending(PendingReason::NotDue { remaining_secs });
                }
            }
        }

        let stats = if let Some(stats) = cached {
            stats
        } else {
            let Some(stats) =
                MetricStatistics::compute(&snapshot.values, self.config.trend_epsilon, now)
            else {
                return OptimizationOutcome::Pending(PendingReason::InsufficientData {
                    have: 0,
                    need: self.config.min_data_points,
                });
            };
            lock(&state.buffer, "metric buffer").store_statistics(snapshot.version, stats.clone());
            stats
        };

        let preferred = *lock(&state.preferred, "preferred strategy");
        let recommendation = self.recommend(key, &stats, preferred, snapshot.last_update, now);

        *lock(&state.last_optimized, "last optimized") = Some(now);
        self.optimizations_run.fetch_add(1, Ordering::Relaxed);
        self.record(recommendation.clone());

        tracing::info!(
            key = %key,
            strategy = %recommendation.strategy,
            value = recommendation.value,
            confidence = recommendation.confidence,
            "Threshold recommended"
        );
        OptimizationOutcome::Recommended(recommendation)
    }

    fn recommend(
        &self,
        key: &str,
        stats: &MetricStatistics,
        preferred: Option<ThresholdStrategy>,
        last_update: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> ThresholdRecommendation {
        let strategy = strategy::select_strategy(stats, &self.config, preferred);
        let confidence = ConfidenceBreakdown::compute(
            stats,
            self.config.confidence_target_points,
            last_update,
            now,
            self.config.optimization_interval(),
        )
        .score();

        ThresholdRecommendation {
            parameter_key: key.to_string(),
            value: strategy::threshold_value(strategy, stats, &self.config),
            strategy,
            confidence,
            timestamp: now,
            reasoning: strategy::reasoning(strategy, stats, &self.config, preferred.is_some()),
            data_points: stats.count,
        }
    }

    fn record(&self, recommendation: ThresholdRecommendation) {
        let mut log = lock(&self.log, "recommendation log");
        log.latest
            .insert(recommendation.parameter_key.clone(), recommendation.clone());
        log.history.push(recommendation);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Most recent recommendation per key.
    #[must_use]
    pub fn export_thresholds(&self) -> BTreeMap<String, ThresholdRecommendation> {
        lock(&self.log, "recommendation log")
            .latest
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Optimization history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<ThresholdRecommendation> {
        lock(&self.log, "recommendation log").history.to_vec()
    }

    /// Statistics for `key`, served from the buffer cache when valid.
    #[must_use]
    pub fn statistics(&self, key: &str) -> Option<MetricStatistics> {
        let state = self.existing(key)?;
        let now = self.time.now();
        let snapshot = {
            let buffer = lock(&state.buffer, "metric buffer");
            if let Some(stats) = buffer.cached_statistics(now) {
                return Some(stats);
            }
            buffer.snapshot()
        };
        let stats = MetricStatistics::compute(&snapshot.values, self.config.trend_epsilon, now)?;
        lock(&state.buffer, "metric buffer").store_statistics(snapshot.version, stats.clone());
        Some(stats)
    }

    /// Metric keys seen so far, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = read(&self.keys, "threshold keys").keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Points currently buffered for `key`.
    #[must_use]
    pub fn data_points(&self, key: &str) -> usize {
        self.existing(key)
            .map_or(0, |state| lock(&state.buffer, "metric buffer").len())
    }

    /// Aggregate counters.
    #[must_use]
    pub fn learning_stats(&self) -> LearningStats {
        let states: Vec<Arc<KeyState>> = read(&self.keys, "threshold keys")
            .values()
            .cloned()
            .collect();

        let (total_data_points, rejected_points) =
            states.iter().fold((0usize, 0u64), |(points, rejected), state| {
                let buffer = lock(&state.buffer, "metric buffer");
                (points + buffer.len(), rejected + buffer.rejected())
            });

        LearningStats {
            total_parameters: states.len(),
            total_data_points,
            rejected_points,
            optimizations_run: self.optimizations_run.load(Ordering::Relaxed),
            recommendations_recorded: lock(&self.log, "recommendation log").history.len(),
            sensitivity: self.sensitivity(),
        }
    }

    // ========================================================================
    // Anomalies
    // ========================================================================

    /// Current anomaly sensitivity.
    #[must_use]
    pub fn sensitivity(&self) -> f64 {
        *lock(&self.sensitivity, "sensitivity")
    }

    /// Add `delta` to the sensitivity, clamped to `[min, max]`.
    ///
    /// Returns the value before and after.
    pub fn adjust_sensitivity(&self, delta: f64, min: f64, max: f64) -> (f64, f64) {
        let mut sensitivity = lock(&self.sensitivity, "sensitivity");
        let before = *sensitivity;
        *sensitivity = (before + delta).clamp(min, max);
        (before, *sensitivity)
    }

    /// Whether `value` would be anomalous for `key` right now.
    ///
    /// Returns `None` for an unknown or empty key.
    #[must_use]
    pub fn is_anomalous(&self, key: &str, value: f64) -> Option<bool> {
        let stats = self.statistics(key)?;
        Some(anomaly::is_anomaly(value, &stats, self.sensitivity()))
    }

    /// Buffered points of `key` that are anomalous under the current
    /// sensitivity.
    #[must_use]
    pub fn detect_anomalies(&self, key: &str) -> Vec<Anomaly> {
        let Some(stats) = self.statistics(key) else {
            return Vec::new();
        };
        let Some(state) = self.existing(key) else {
            return Vec::new();
        };
        let points = lock(&state.buffer, "metric buffer").points();
        anomaly::scan(key, &points, &stats, self.sensitivity())
    }

    // ========================================================================
    // Strategy preference
    // ========================================================================

    /// Set or clear the preferred strategy for `key`.
    ///
    /// Returns the previous preference.
    pub fn set_preferred_strategy(
        &self,
        key: &str,
        strategy: Option<ThresholdStrategy>,
    ) -> Option<ThresholdStrategy> {
        let state = self.key_state(key);
        let mut preferred = lock(&state.preferred, "preferred strategy");
        std::mem::replace(&mut *preferred, strategy)
    }

    /// Preferred strategy for `key`, if any.
    #[must_use]
    pub fn preferred_strategy(&self, key: &str) -> Option<ThresholdStrategy> {
        self.existing(key)
            .and_then(|state| *lock(&state.preferred, "preferred strategy"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::traits::MockTimeProvider;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use static_assertions::assert_impl_all;

    assert_impl_all!(SelfLearningThresholdOptimizer: Send, Sync);

    fn fixed_clock(at: DateTime<Utc>) -> Arc<dyn TimeProvider> {
        let mut mock = MockTimeProvider::new();
        mock.expect_now().return_const(at);
        Arc::new(mock)
    }

    fn optimizer_at(at: DateTime<Utc>, config: ThresholdConfig) -> SelfLearningThresholdOptimizer {
        SelfLearningThresholdOptimizer::with_time_provider(config, fixed_clock(at)).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = SelfLearningThresholdOptimizer::new(ThresholdConfig {
            anomaly_sensitivity: 0.0,
            ..ThresholdConfig::default()
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_pending_below_min_points() {
        let optimizer = optimizer_at(Utc::now(), ThresholdConfig::default());
        for i in 0..99 {
            optimizer.add_metric("cpu", f64::from(i));
        }
        let outcome = &optimizer.maybe_optimize()["cpu"];
        assert_eq!(
            outcome,
            &OptimizationOutcome::Pending(PendingReason::InsufficientData { have: 99, need: 100 })
        );
        assert!(optimizer.history().is_empty());
        assert!(optimizer.export_thresholds().is_empty());
    }

    #[test]
    fn test_constant_series_sigma_recommendation() {
        let optimizer = optimizer_at(Utc::now(), ThresholdConfig::default());
        for _ in 0..150 {
            optimizer.add_metric("latency", 10.0);
        }
        let outcomes = optimizer.maybe_optimize();
        let rec = outcomes["latency"].recommendation().unwrap();
        assert_eq!(rec.strategy, ThresholdStrategy::Sigma);
        assert!((rec.value - 10.0).abs() < 1e-9);
        assert!(rec.confidence > 0.75);
        assert_eq!(rec.data_points, 150);
    }

    #[test]
    fn test_interval_gate() {
        let clock = Arc::new(crate::traits::ManualTimeProvider::new(Utc::now()));
        let optimizer = SelfLearningThresholdOptimizer::with_time_provider(
            ThresholdConfig {
                min_data_points: 5,
                ..ThresholdConfig::default()
            },
            clock.clone(),
        )
        .unwrap();
        for _ in 0..5 {
            optimizer.add_metric("cpu", 1.0);
        }

        assert!(optimizer.maybe_optimize()["cpu"].recommendation().is_some());

        clock.advance(Duration::minutes(10));
        assert_eq!(
            optimizer.maybe_optimize()["cpu"],
            OptimizationOutcome::Pending(PendingReason::NotDue {
                remaining_secs: 3_000
            })
        );

        // force ignores the interval
        assert!(optimizer.force_optimize()["cpu"].recommendation().is_some());

        clock.advance(Duration::hours(1));
        assert!(optimizer.maybe_optimize()["cpu"].recommendation().is_some());
        assert_eq!(optimizer.history().len(), 3);
    }

    #[test]
    fn test_export_matches_last_history_entry() {
        let optimizer = optimizer_at(
            Utc::now(),
            ThresholdConfig {
                min_data_points: 3,
                ..ThresholdConfig::default()
            },
        );
        for key in ["a", "b"] {
            for v in [1.0, 2.0, 3.0] {
                optimizer.add_metric(key, v);
            }
        }
        optimizer.force_optimize();
        optimizer.add_metric("a", 50.0);
        optimizer.force_optimize();

        let exported = optimizer.export_thresholds();
        let history = optimizer.history();
        for (key, rec) in &exported {
            let last = history
                .iter()
                .rev()
                .find(|r| &r.parameter_key == key)
                .unwrap();
            assert_eq!(rec, last);
        }
        assert_eq!(history.len(), 4);
    }

    #[test]
    fn test_history_is_capped() {
        let optimizer = optimizer_at(
            Utc::now(),
            ThresholdConfig {
                min_data_points: 1,
                history_cap: 3,
                ..ThresholdConfig::default()
            },
        );
        optimizer.add_metric("k", 1.0);
        for _ in 0..10 {
            optimizer.force_optimize();
        }
        assert_eq!(optimizer.history().len(), 3);
        assert_eq!(optimizer.learning_stats().optimizations_run, 10);
    }

    #[test]
    fn test_busy_key_is_skipped() {
        let optimizer = optimizer_at(
            Utc::now(),
            ThresholdConfig {
                min_data_points: 1,
                ..ThresholdConfig::default()
            },
        );
        optimizer.add_metric("k", 1.0);
        let state = optimizer.existing("k").unwrap();
        let _held = BusyGuard::try_acquire(&state.busy).unwrap();

        assert_eq!(optimizer.maybe_optimize()["k"], OptimizationOutcome::Skipped);
        assert!(BusyGuard::try_acquire(&state.busy).is_none());
    }

    #[test]
    fn test_busy_flag_released_after_pass() {
        let optimizer = optimizer_at(Utc::now(), ThresholdConfig::default());
        optimizer.add_metric("k", 1.0);
        optimizer.maybe_optimize();
        let state = optimizer.existing("k").unwrap();
        assert!(!state.busy.load(Ordering::Acquire));
    }

    #[test]
    fn test_preferred_strategy_applies() {
        let optimizer = optimizer_at(
            Utc::now(),
            ThresholdConfig {
                min_data_points: 3,
                ..ThresholdConfig::default()
            },
        );
        assert_eq!(
            optimizer.set_preferred_strategy("mem", Some(ThresholdStrategy::Percentile)),
            None
        );
        for _ in 0..3 {
            optimizer.add_metric("mem", 7.0);
        }
        let rec = optimizer.force_optimize()["mem"].recommendation().cloned().unwrap();
        assert_eq!(rec.strategy, ThresholdStrategy::Percentile);
        assert!(rec.reasoning.contains("preferred by feedback"));
    }

    #[test]
    fn test_non_finite_rejected_and_counted() {
        let optimizer = optimizer_at(Utc::now(), ThresholdConfig::default());
        assert!(optimizer.add_metric("k", 1.0));
        assert!(!optimizer.add_metric("k", f64::NAN));
        let stats = optimizer.learning_stats();
        assert_eq!(stats.total_parameters, 1);
        assert_eq!(stats.total_data_points, 1);
        assert_eq!(stats.rejected_points, 1);
    }

    #[test]
    fn test_detect_anomalies() {
        let optimizer = optimizer_at(Utc::now(), ThresholdConfig::default());
        for i in 0..100 {
            optimizer.add_metric("latency", 100.0 + f64::from(i % 5));
        }
        optimizer.add_metric("latency", 500.0);
        let found = optimizer.detect_anomalies("latency");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, 500.0);
        assert_eq!(optimizer.is_anomalous("latency", 102.0), Some(false));
        assert_eq!(optimizer.is_anomalous("unknown", 1.0), None);
    }

    #[test]
    fn test_adjust_sensitivity_clamps() {
        let optimizer = SelfLearningThresholdOptimizer::with_defaults();
        assert_eq!(optimizer.adjust_sensitivity(-0.1, 0.5, 5.0), (2.0, 1.9));
        let (_, after) = optimizer.adjust_sensitivity(-10.0, 0.5, 5.0);
        assert_eq!(after, 0.5);
    }

    #[test]
    fn test_optimize_key_unknown() {
        let optimizer = SelfLearningThresholdOptimizer::with_defaults();
        assert!(optimizer.optimize_key("nope").is_none());
    }
}
