//! Dynamic parameter optimization.
//!
//! Classifies overall health from [`PerformanceSnapshot`]s into a
//! [`SystemState`], holds state changes back until they have been seen on
//! consecutive cycles, and maps the committed state to a [`ParameterSet`]
//! for the outer control cycle.
//!
//! # Example
//!
//! ```
//! use mape_autotune::config::DynamicConfig;
//! use mape_autotune::dynamic::{DynamicParameterOptimizer, PerformanceSnapshot, SystemState};
//!
//! let optimizer = DynamicParameterOptimizer::new(DynamicConfig::default()).unwrap();
//! let snapshot = PerformanceSnapshot::new()
//!     .with_error_rate(0.15)
//!     .with_p99_latency_ms(2_000.0);
//!
//! optimizer.record_performance(snapshot.clone());
//! assert_eq!(optimizer.current_state(), SystemState::Healthy);
//!
//! optimizer.record_performance(snapshot);
//! assert_eq!(optimizer.current_state(), SystemState::Critical);
//! assert_eq!(optimizer.current_parameters().execution_parallelism, 1);
//! ```

mod classifier;
mod optimizer;
mod state;

pub use classifier::{classify, ClassificationContext};
pub use optimizer::{DynamicParameterOptimizer, DynamicStats, Evaluation};
pub use state::{
    ParameterSet, PerformanceRecord, PerformanceSnapshot, StateTransition, SystemState,
};
