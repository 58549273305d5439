//! Workflow integration tests for the self-tuning core.
//!
//! These tests verify end-to-end workflows including:
//! - Buffer capacity and eviction properties
//! - Threshold learning from buffered telemetry
//! - The health state machine with hysteresis
//! - Feedback loops and observer isolation
//! - The stdio JSON-lines host protocol

mod buffer_properties;
mod feedback_loops;
mod host_protocol;
mod state_machine;
mod threshold_learning;
