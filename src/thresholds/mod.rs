//! Self-learning threshold optimization.
//!
//! This module provides:
//! - [`SelfLearningThresholdOptimizer`]: per-key buffers, gated optimization
//!   passes, anomaly checks
//! - [`ThresholdStrategy`]: Percentile, Sigma and IQR derivations
//! - [`ThresholdRecommendation`]: an immutable, scored result
//!
//! # Example
//!
//! ```
//! use mape_autotune::config::ThresholdConfig;
//! use mape_autotune::thresholds::{OptimizationOutcome, SelfLearningThresholdOptimizer};
//!
//! let optimizer = SelfLearningThresholdOptimizer::new(ThresholdConfig {
//!     min_data_points: 10,
//!     ..ThresholdConfig::default()
//! })
//! .unwrap();
//!
//! for _ in 0..5 {
//!     optimizer.add_metric("cpu", 40.0);
//! }
//! let outcomes = optimizer.maybe_optimize();
//! assert!(outcomes["cpu"].is_pending());
//!
//! for _ in 0..5 {
//!     optimizer.add_metric("cpu", 40.0);
//! }
//! let outcomes = optimizer.maybe_optimize();
//! assert!(matches!(outcomes["cpu"], OptimizationOutcome::Recommended(_)));
//! assert!(optimizer.export_thresholds().contains_key("cpu"));
//! ```

mod anomaly;
mod confidence;
mod optimizer;
mod strategy;

pub use anomaly::{is_anomaly, z_score, Anomaly};
pub use confidence::{ConfidenceBreakdown, RECENCY_WEIGHT, STABILITY_WEIGHT, VOLUME_WEIGHT};
pub use optimizer::SelfLearningThresholdOptimizer;
pub use strategy::{reasoning, select_strategy, threshold_value, ThresholdStrategy};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A computed threshold for one metric key.
///
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRecommendation {
    /// Metric key.
    pub parameter_key: String,
    /// Recommended threshold.
    pub value: f64,
    /// Strategy that produced `value`.
    pub strategy: ThresholdStrategy,
    /// Trust in the recommendation, in `[0, 1]`.
    pub confidence: f64,
    /// When the recommendation was made.
    pub timestamp: DateTime<Utc>,
    /// Why this strategy and value.
    pub reasoning: String,
    /// Points the statistics were computed over.
    pub data_points: usize,
}

/// Why a key was not optimized this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PendingReason {
    /// Fewer points than the configured minimum.
    InsufficientData {
        /// Points held.
        have: usize,
        /// Points required.
        need: usize,
    },
    /// Optimized too recently.
    NotDue {
        /// Seconds until the key is due again.
        remaining_secs: i64,
    },
}

/// Result of one optimization attempt for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum OptimizationOutcome {
    /// A new recommendation was produced and recorded.
    Recommended(ThresholdRecommendation),
    /// Gates not satisfied; nothing recorded.
    Pending(PendingReason),
    /// Another pass was already running for this key.
    Skipped,
}

impl OptimizationOutcome {
    /// Whether this is a pending result.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// The recommendation, if one was produced.
    #[must_use]
    pub const fn recommendation(&self) -> Option<&ThresholdRecommendation> {
        match self {
            Self::Recommended(rec) => Some(rec),
            Self::Pending(_) | Self::Skipped => None,
        }
    }
}

/// Aggregate learning counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    /// Metric keys seen.
    pub total_parameters: usize,
    /// Points currently buffered across all keys.
    pub total_data_points: usize,
    /// Non-finite samples rejected across all keys.
    pub rejected_points: u64,
    /// Optimization passes that produced a recommendation.
    pub optimizations_run: u64,
    /// Recommendations currently held in history.
    pub recommendations_recorded: usize,
    /// Current anomaly sensitivity.
    pub sensitivity: f64,
}
