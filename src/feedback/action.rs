//! Actions applied in response to feedback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::signal::LoopType;
use crate::dynamic::SystemState;
use crate::thresholds::ThresholdStrategy;

/// What an action changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionChange {
    /// A numeric parameter moved.
    Delta {
        /// Value before.
        before: f64,
        /// Value after.
        after: f64,
    },
    /// An integer limit moved.
    Limit {
        /// Limit before.
        before: u32,
        /// Limit after.
        after: u32,
    },
    /// The preferred strategy for a key changed.
    Strategy {
        /// Preference before.
        before: Option<ThresholdStrategy>,
        /// Preference after.
        after: ThresholdStrategy,
    },
    /// The committed system state changed.
    Reclassified {
        /// State before.
        from: SystemState,
        /// State after.
        to: SystemState,
    },
}

impl ActionChange {
    /// Whether this change leaves everything as it was.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        match self {
            Self::Delta { before, after } => before.to_bits() == after.to_bits(),
            Self::Limit { before, after } => before == after,
            Self::Strategy { before, after } => *before == Some(*after),
            Self::Reclassified { from, to } => from == to,
        }
    }

    /// Signed numeric change, where one exists.
    #[must_use]
    pub fn delta(&self) -> Option<f64> {
        match self {
            Self::Delta { before, after } => Some(after - before),
            Self::Limit { before, after } => Some(f64::from(*after) - f64::from(*before)),
            Self::Strategy { .. } | Self::Reclassified { .. } => None,
        }
    }
}

/// One applied tuning action. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Unique id.
    pub id: Uuid,
    /// Loop that produced it.
    pub loop_type: LoopType,
    /// Name of the parameter changed, e.g. `anomaly_sensitivity`.
    pub parameter_changed: String,
    /// The change applied.
    pub change: ActionChange,
    /// Why.
    pub reason: String,
    /// When it was applied.
    pub timestamp: DateTime<Utc>,
    /// Signal that caused it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_id: Option<Uuid>,
}

impl Action {
    /// Create an action with a fresh id.
    #[must_use]
    pub fn new(
        loop_type: LoopType,
        parameter_changed: impl Into<String>,
        change: ActionChange,
        reason: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            loop_type,
            parameter_changed: parameter_changed.into(),
            change,
            reason: reason.into(),
            timestamp,
            signal_id: None,
        }
    }

    /// Link the action to the signal that caused it.
    #[must_use]
    pub fn caused_by(mut self, signal_id: Uuid) -> Self {
        self.signal_id = Some(signal_id);
        self
    }
}
