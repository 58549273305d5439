//! Feedback signals and their per-loop payloads.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dynamic::PerformanceSnapshot;
use crate::thresholds::ThresholdStrategy;

/// The five feedback channels.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum LoopType {
    /// Observations that refine learned thresholds.
    MetricsLearning,
    /// Live performance that may force a reclassification.
    PerformanceAdaptation,
    /// Predicted versus actual outcome of a decision.
    DecisionQuality,
    /// Verdicts on raised anomalies.
    AnomalyFeedback,
    /// Resource pressure reports.
    ResourceOptimization,
}

impl LoopType {
    /// Every loop type.
    pub const ALL: [Self; 5] = [
        Self::MetricsLearning,
        Self::PerformanceAdaptation,
        Self::DecisionQuality,
        Self::AnomalyFeedback,
        Self::ResourceOptimization,
    ];

    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MetricsLearning => "metrics_learning",
            Self::PerformanceAdaptation => "performance_adaptation",
            Self::DecisionQuality => "decision_quality",
            Self::AnomalyFeedback => "anomaly_feedback",
            Self::ResourceOptimization => "resource_optimization",
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::MetricsLearning => 0,
            Self::PerformanceAdaptation => 1,
            Self::DecisionQuality => 2,
            Self::AnomalyFeedback => 3,
            Self::ResourceOptimization => 4,
        }
    }
}

impl fmt::Display for LoopType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoopType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|loop_type| loop_type.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown loop type: {s}"))
    }
}

/// Payload of a feedback signal, one case per loop type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "loop_type", rename_all = "snake_case")]
pub enum SignalPayload {
    /// A labelled observation for a metric key.
    MetricsLearning {
        /// Metric key.
        key: String,
        /// Observed value.
        value: f64,
        /// Trust in the observation, in `[0, 1]`.
        #[serde(default = "full_confidence")]
        confidence: f64,
        /// Strategy the reporter wants used for this key.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preferred_strategy: Option<ThresholdStrategy>,
    },
    /// Live performance outside the regular cycle.
    PerformanceAdaptation {
        /// The observation.
        snapshot: PerformanceSnapshot,
    },
    /// Outcome of a decision.
    DecisionQuality {
        /// What the decision expected.
        predicted: f64,
        /// What happened.
        actual: f64,
    },
    /// Verdicts on anomalies raised since the last report.
    AnomalyFeedback {
        /// Confirmed anomalies.
        #[serde(default)]
        true_positives: u32,
        /// Anomalies that turned out benign.
        #[serde(default)]
        false_positives: u32,
        /// Incidents no anomaly was raised for.
        #[serde(default)]
        false_negatives: u32,
    },
    /// Resource pressure, in `[0, 1]`.
    ResourceOptimization {
        /// Utilisation relative to capacity.
        pressure: f64,
    },
}

const fn full_confidence() -> f64 {
    1.0
}

impl SignalPayload {
    /// Loop type this payload belongs to.
    #[must_use]
    pub const fn loop_type(&self) -> LoopType {
        match self {
            Self::MetricsLearning { .. } => LoopType::MetricsLearning,
            Self::PerformanceAdaptation { .. } => LoopType::PerformanceAdaptation,
            Self::DecisionQuality { .. } => LoopType::DecisionQuality,
            Self::AnomalyFeedback { .. } => LoopType::AnomalyFeedback,
            Self::ResourceOptimization { .. } => LoopType::ResourceOptimization,
        }
    }
}

/// An immutable outcome report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSignal {
    /// Unique id.
    pub id: Uuid,
    /// Who reported it.
    pub source: String,
    /// What was reported.
    pub payload: SignalPayload,
    /// When it was reported.
    pub timestamp: DateTime<Utc>,
}

impl FeedbackSignal {
    /// Create a signal with a fresh id.
    #[must_use]
    pub fn new(source: impl Into<String>, payload: SignalPayload, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            payload,
            timestamp,
        }
    }

    /// Loop type of the payload.
    #[must_use]
    pub const fn loop_type(&self) -> LoopType {
        self.payload.loop_type()
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
    use test_case::test_case;

    #[test]
    fn test_payload_tagged_by_loop_type() {
        let payload = SignalPayload::AnomalyFeedback {
            true_positives: 0,
            false_positives: 3,
            false_negatives: 0,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["loop_type"], "anomaly_feedback");
        assert_eq!(json["false_positives"], 3);
    }

    #[test]
    fn test_sparse_payload_defaults() {
        let payload: SignalPayload =
            serde_json::from_str(r#"{"loop_type":"anomaly_feedback","false_positives":2}"#)
                .unwrap();
        assert_eq!(
            payload,
            SignalPayload::AnomalyFeedback {
                true_positives: 0,
                false_positives: 2,
                false_negatives: 0,
            }
        );

        let payload: SignalPayload =
            serde_json::from_str(r#"{"loop_type":"metrics_learning","key":"cpu","value":4.5}"#)
                .unwrap();
        match payload {
            SignalPayload::MetricsLearning {
                confidence,
                preferred_strategy,
                ..
            } => {
                assert_eq!(confidence, 1.0);
                assert!(preferred_strategy.is_none());
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_loop_type_rejected() {
        let result: Result<SignalPayload, _> =
            serde_json::from_str(r#"{"loop_type":"telepathy","value":1}"#);
        assert!(result.is_err());
    }

    #[test_case("metrics_learning", LoopType::MetricsLearning)]
    #[test_case("Decision_Quality", LoopType::DecisionQuality)]
    #[test_case(" resource_optimization", LoopType::ResourceOptimization)]
    fn test_parse_loop_type(input: &str, expected: LoopType) {
        assert_eq!(input.parse::<LoopType>().unwrap(), expected);
    }

    #[test]
    fn test_indices_are_distinct() {
        let mut seen = [false; 5];
        for loop_type in LoopType::ALL {
            assert!(!seen[loop_type.index()]);
            seen[loop_type.index()] = true;
        }
    }

    #[test]
    fn test_signal_loop_type_follows_payload() {
        let signal = FeedbackSignal::new(
            "executor",
            SignalPayload::ResourceOptimization { pressure: 0.9 },
            Utc::now(),
        );
        assert_eq!(signal.loop_type(), LoopType::ResourceOptimization);
        assert_eq!(signal.source, "executor");
    }
}
