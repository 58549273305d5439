//! Pure health classification.
//!
//! Rules are checked in a fixed priority order, most cautious first:
//!
//! 1. **Critical**: error rate, p99 latency, CPU or memory at or past a
//!    critical cutoff
//! 2. **Degraded**: any of them at or past a degraded cutoff
//! 3. **Recovering**: previously impaired and now improving, or still
//!    recovering with decision quality below the recovery bar
//! 4. **Optimizing**: exploration requested
//! 5. **Healthy**
//!
//! A value sitting exactly on a cutoff counts as past it.

use super::state::{PerformanceSnapshot, SystemState};
use crate::config::DynamicConfig;

/// Inputs besides the snapshot that classification depends on.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationContext<'a> {
    /// Currently committed state.
    pub previous_state: SystemState,
    /// Snapshot from the previous evaluation, if any.
    pub previous_snapshot: Option<&'a PerformanceSnapshot>,
    /// Exploration flag set on the optimizer.
    pub exploration: bool,
}

impl<'a> ClassificationContext<'a> {
    /// Context with no prior snapshot and exploration off.
    #[must_use]
    pub const fn new(previous_state: SystemState) -> Self {
        Self {
            previous_state,
            previous_snapshot: None,
            exploration: false,
        }
    }

    /// Attach the previous snapshot.
    #[must_use]
    pub const fn with_previous_snapshot(mut self, snapshot: &'a PerformanceSnapshot) -> Self {
        self.previous_snapshot = Some(snapshot);
        self
    }

    /// Set the exploration flag.
    #[must_use]
    pub const fn with_exploration(mut self, exploration: bool) -> Self {
        self.exploration = exploration;
        self
    }
}

fn at_or_past(value: Option<f64>, cutoff: f64) -> bool {
    value.is_some_and(|v| v >= cutoff)
}

fn is_critical(snapshot: &PerformanceSnapshot, config: &DynamicConfig) -> bool {
    at_or_past(snapshot.error_rate(), config.critical_error_rate)
        || at_or_past(snapshot.p99_latency_ms(), config.critical_p99_latency_ms)
        || at_or_past(snapshot.cpu_usage(), config.critical_cpu_usage)
        || at_or_past(snapshot.memory_usage(), config.critical_memory_usage)
}

fn is_degraded(snapshot: &PerformanceSnapshot, config: &DynamicConfig) -> bool {
    at_or_past(snapshot.error_rate(), config.degraded_error_rate)
        || at_or_past(snapshot.p99_latency_ms(), config.degraded_p99_latency_ms)
        || at_or_past(snapshot.cpu_usage(), config.degraded_cpu_usage)
        || at_or_past(snapshot.memory_usage(), config.degraded_memory_usage)
}

/// No tracked metric got worse than in `previous`.
fn not_worse(current: &PerformanceSnapshot, previous: &PerformanceSnapshot) -> bool {
    let pairs = [
        (current.error_rate(), previous.error_rate()),
        (current.p99_latency_ms(), previous.p99_latency_ms()),
        (current.cpu_usage(), previous.cpu_usage()),
        (current.memory_usage(), previous.memory_usage()),
    ];
    pairs.into_iter().all(|pair| match pair {
        (Some(now), Some(before)) => now <= before,
        _ => true,
    })
}

/// Classify one snapshot.
///
/// Pure: identical inputs always give the same state.
#[must_use]
pub fn classify(
    snapshot: &PerformanceSnapshot,
    context: &ClassificationContext<'_>,
    config: &DynamicConfig,
) -> SystemState {
    if is_critical(snapshot, config) {
        return SystemState::Critical;
    }
    if is_degraded(snapshot, config) {
        return SystemState::Degraded;
    }

    if context.previous_state.is_impaired() {
        // Below every cutoff now; leaving impairment only counts once
        // nothing is trending back up.
        let improving = context
            .previous_snapshot
            .map_or(true, |previous| not_worse(snapshot, previous));
        return if improving {
            SystemState::Recovering
        } else {
            SystemState::Degraded
        };
    }

    if context.previous_state == SystemState::Recovering {
        let recovered = snapshot
            .decision_quality()
            .is_some_and(|q| q >= config.recovery_quality);
        if !recovered {
            return SystemState::Recovering;
        }
    }

    if context.exploration || snapshot.exploration {
        return SystemState::Optimizing;
    }
    SystemState::Healthy
}
