//! Feedback loop management.
//!
//! Downstream phases report outcomes as [`FeedbackSignal`]s. The
//! [`FeedbackLoopManager`] routes each signal to the handler for its
//! [`LoopType`], which applies at most one [`Action`] to the threshold or
//! dynamic optimizer:
//!
//! | Loop type | Effect |
//! |-----------|--------|
//! | `metrics_learning` | feeds the observation; may set the key's preferred strategy |
//! | `performance_adaptation` | out-of-cycle evaluation of a performance snapshot |
//! | `decision_quality` | nudges the active state's learning rate |
//! | `anomaly_feedback` | moves anomaly sensitivity by one step |
//! | `resource_optimization` | tightens or relaxes the parallelism limit |
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use mape_autotune::config::FeedbackConfig;
//! use mape_autotune::dynamic::DynamicParameterOptimizer;
//! use mape_autotune::feedback::{FeedbackLoopManager, SignalPayload};
//! use mape_autotune::thresholds::SelfLearningThresholdOptimizer;
//!
//! let thresholds = Arc::new(SelfLearningThresholdOptimizer::with_defaults());
//! let dynamic = Arc::new(DynamicParameterOptimizer::with_defaults());
//! let manager =
//!     FeedbackLoopManager::new(FeedbackConfig::default(), thresholds.clone(), dynamic).unwrap();
//!
//! let action = manager.emit(
//!     "analyzer",
//!     SignalPayload::AnomalyFeedback {
//!         true_positives: 0,
//!         false_positives: 4,
//!         false_negatives: 0,
//!     },
//! );
//! assert!(action.is_some());
//! assert!((thresholds.sensitivity() - 1.9).abs() < 1e-9);
//! ```

mod action;
mod manager;
mod signal;

pub use action::{Action, ActionChange};
pub use manager::{FeedbackLoopManager, FeedbackStats, LoopStats, SubscriptionId};
pub use signal::{FeedbackSignal, LoopType, SignalPayload};
