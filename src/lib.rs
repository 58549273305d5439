//! MAPE Autotune
//!
//! The self-tuning core of a monitor-analyze-plan-execute control cycle:
//! it learns metric thresholds from live telemetry, classifies overall
//! health into one of five states, and adapts its own tuning from outcome
//! feedback.
//!
//! # Features
//!
//! - Fixed-capacity metric buffers with cached statistics
//! - Percentile, Sigma and IQR threshold strategies with confidence scores
//! - Hysteresis-protected health state machine with per-state parameters
//! - Typed feedback loops with isolated observer fan-out
//! - Stdio JSON-lines host binary
//!
//! # Quick Start
//!
//! ```bash
//! echo '{"command":"stats"}' | ./mape-autotune
//! ```
//!
//! # Architecture
//!
//! ```text
//!  monitors ──push_metric──▶ MetricsBuffer ──▶ SelfLearningThresholdOptimizer
//!                                                    ▲            │ thresholds
//!  executor ──record_performance──▶ DynamicParameterOptimizer     ▼
//!                                          ▲      │ parameters   consumers
//!                                          │      ▼
//!  outcomes ──emit_signal──▶ FeedbackLoopManager ──▶ observers
//! ```

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod control_loop;
pub mod dynamic;
pub mod error;
pub mod feedback;
pub mod history;
pub mod host;
pub mod metrics;
pub mod thresholds;
pub mod traits;

mod sync;

#[cfg(test)]
mod test_utils;

pub use control_loop::AutotuneLoop;
