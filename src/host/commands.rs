//! Host command and response types.
//!
//! Each command uses schemars for automatic JSON schema generation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::control_loop::AutotuneLoop;
use crate::dynamic::{PerformanceSnapshot, SystemState};
use crate::error::CommandError;
use crate::feedback::{LoopType, SignalPayload};

/// One line of host input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Buffer a metric sample.
    PushMetric {
        /// Metric key.
        #[schemars(description = "Metric key, e.g. cpu_usage")]
        key: String,
        /// Sample value.
        value: f64,
    },
    /// Record a performance snapshot and run one classification cycle.
    RecordPerformance {
        /// The observation.
        snapshot: PerformanceSnapshot,
    },
    /// Report a feedback outcome.
    EmitSignal {
        /// Reporter name.
        #[serde(default = "default_source")]
        source: String,
        /// Outcome payload, tagged by `loop_type`.
        payload: SignalPayload,
    },
    /// Run an optimization pass.
    Optimize {
        /// Ignore the interval gate.
        #[serde(default)]
        force: bool,
    },
    /// Latest recommendation per key.
    Thresholds,
    /// Effective parameters.
    Parameters {
        /// State to report; the committed state when absent.
        #[serde(default)]
        state: Option<SystemState>,
    },
    /// Committed state and transition history.
    State,
    /// Commit a state immediately.
    ForceState {
        /// Target state.
        state: SystemState,
    },
    /// Enable or disable exploration.
    SetExploration {
        /// New flag value.
        enabled: bool,
    },
    /// Currently anomalous points for a key.
    Anomalies {
        /// Metric key.
        key: String,
    },
    /// Counters from every component.
    Stats,
    /// JSON schema of this command set.
    Schema,
}

fn default_source() -> String {
    "host".to_string()
}

/// One line of host output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Command result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// Successful response.
    #[must_use]
    pub const fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    /// Failed response.
    #[must_use]
    pub fn failure(error: &CommandError) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

/// JSON schema of [`Command`].
#[must_use]
pub fn command_schema() -> Value {
    serde_json::to_value(schemars::schema_for!(Command)).unwrap_or(Value::Null)
}

/// Parse one input line.
///
/// # Errors
///
/// - [`CommandError::TooLarge`] if the line exceeds `max_bytes`
/// - [`CommandError::UnknownLoopType`] if a signal names a loop type that
///   does not exist
/// - [`CommandError::PayloadMismatch`] if an explicit `loop_type` disagrees
///   with the payload's
/// - [`CommandError::InvalidJson`] for anything else that does not parse
pub fn parse_command(line: &str, max_bytes: usize) -> Result<Command, CommandError> {
    if line.len() > max_bytes {
        return Err(CommandError::TooLarge {
            size: line.len(),
            max: max_bytes,
        });
    }
    let value: Value = serde_json::from_str(line).map_err(|e| CommandError::InvalidJson {
        message: e.to_string(),
    })?;
    if value.get("command").and_then(Value::as_str) == Some("emit_signal") {
        check_loop_type(&value)?;
    }
    serde_json::from_value(value).map_err(|e| CommandError::InvalidJson {
        message: e.to_string(),
    })
}

fn check_loop_type(value: &Value) -> Result<(), CommandError> {
    let declared = value.get("loop_type").and_then(Value::as_str);
    let carried = value
        .get("payload")
        .and_then(|payload| payload.get("loop_type"))
        .and_then(Value::as_str);

    for name in [declared, carried].into_iter().flatten() {
        if name.parse::<LoopType>().is_err() {
            return Err(CommandError::UnknownLoopType {
                loop_type: name.to_string(),
            });
        }
    }
    match (declared, carried) {
        (Some(declared), Some(carried)) if !declared.eq_ignore_ascii_case(carried) => {
            Err(CommandError::PayloadMismatch {
                loop_type: declared.to_string(),
            })
        }
        _ => Ok(()),
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize response");
        Value::Null
    })
}

/// Run one command against `autotune`.
#[must_use]
pub fn execute(autotune: &AutotuneLoop, command: Command) -> Response {
    let result = match command {
        Command::PushMetric { key, value } => {
            serde_json::json!({ "accepted": autotune.push_metric(&key, value) })
        }
        Command::RecordPerformance { snapshot } => to_value(&autotune.record_performance(snapshot)),
        Command::EmitSignal { source, payload } => {
            serde_json::json!({ "action": autotune.emit_signal(source, payload) })
        }
        Command::Optimize { force } => {
            let outcomes = if force {
                autotune.force_optimize()
            } else {
                autotune.maybe_optimize()
            };
            to_value(&outcomes)
        }
        Command::Thresholds => to_value(&autotune.get_thresholds()),
        Command::Parameters { state } => {
            let state = state.unwrap_or_else(|| autotune.current_state());
            serde_json::json!({
                "state": state,
                "parameters": autotune.dynamic().parameters_for(state),
            })
        }
        Command::State => serde_json::json!({
            "state": autotune.current_state(),
            "transitions": autotune.dynamic().transitions(),
        }),
        Command::ForceState { state } => {
            serde_json::json!({ "transition": autotune.force_state(state) })
        }
        Command::SetExploration { enabled } => {
            autotune.dynamic().set_exploration(enabled);
            serde_json::json!({ "exploration": enabled })
        }
        Command::Anomalies { key } => to_value(&autotune.detect_anomalies(&key)),
        Command::Stats => to_value(&autotune.stats()),
        Command::Schema => command_schema(),
    };
    Response::success(result)
}

/// Parse and run one input line.
#[must_use]
pub fn handle_line(autotune: &AutotuneLoop, line: &str, max_bytes: usize) -> Response {
    match parse_command(line, max_bytes) {
        Ok(command) => execute(autotune, command),
        Err(error) => {
            tracing::warn!(error = %error, "Rejected host command");
            Response::failure(&error)
        }
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
    use crate::config::AutotuneConfig;
    use pretty_assertions::assert_eq;

    const MAX: usize = 64 * 1024;

    fn autotune() -> AutotuneLoop {
        AutotuneLoop::new(AutotuneConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_push_metric() {
        let command = parse_command(r#"{"command":"push_metric","key":"cpu","value":42}"#, MAX)
            .unwrap();
        assert_eq!(
            command,
            Command::PushMetric {
                key: "cpu".into(),
                value: 42.0
            }
        );
    }

    #[test]
    fn test_parse_defaults() {
        let command = parse_command(r#"{"command":"optimize"}"#, MAX).unwrap();
        assert_eq!(command, Command::Optimize { force: false });

        let command = parse_command(
            r#"{"command":"emit_signal","payload":{"loop_type":"resource_optimization","pressure":0.9}}"#,
            MAX,
        )
        .unwrap();
        match command {
            Command::EmitSignal { source, .. } => assert_eq!(source, "host"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_command("not json", MAX),
            Err(CommandError::InvalidJson { .. })
        ));
        assert!(matches!(
            parse_command(r#"{"command":"reboot"}"#, MAX),
            Err(CommandError::InvalidJson { .. })
        ));
        assert!(matches!(
            parse_command(r#"{"command":"push_metric","key":"cpu","value":1}"#, 10),
            Err(CommandError::TooLarge { max: 10, .. })
        ));
    }

    #[test]
    fn test_unknown_loop_type() {
        let result = parse_command(
            r#"{"command":"emit_signal","payload":{"loop_type":"telepathy"}}"#,
            MAX,
        );
        assert_eq!(
            result,
            Err(CommandError::UnknownLoopType {
                loop_type: "telepathy".into()
            })
        );
    }

    #[test]
    fn test_payload_mismatch() {
        let result = parse_command(
            r#"{"command":"emit_signal","loop_type":"decision_quality","payload":{"loop_type":"resource_optimization","pressure":0.5}}"#,
            MAX,
        );
        assert!(matches!(result, Err(CommandError::PayloadMismatch { .. })));
    }

    #[test]
    fn test_handle_line_round() {
        let autotune = autotune();
        let response = handle_line(
            &autotune,
            r#"{"command":"push_metric","key":"cpu","value":1.5}"#,
            MAX,
        );
        assert!(response.ok);
        assert_eq!(response.result.unwrap()["accepted"], true);

        let response = handle_line(&autotune, r#"{"command":"parameters"}"#, MAX);
        let result = response.result.unwrap();
        assert_eq!(result["state"], "healthy");
        assert_eq!(result["parameters"]["execution_parallelism"], 4);
    }

    #[test]
    fn test_handle_line_reports_errors() {
        let response = handle_line(&autotune(), "{", MAX);
        assert!(!response.ok);
        assert!(response.error.unwrap().starts_with("Invalid command"));
    }

    #[test]
    fn test_emit_signal_returns_action() {
        let autotune = autotune();
        let response = handle_line(
            &autotune,
            r#"{"command":"emit_signal","source":"analyzer","payload":{"loop_type":"anomaly_feedback","false_positives":2}}"#,
            MAX,
        );
        let action = &response.result.unwrap()["action"];
        assert_eq!(action["parameter_changed"], "anomaly_sensitivity");
        assert_eq!(action["change"]["kind"], "delta");
    }

    #[test]
    fn test_force_state_and_state() {
        let autotune = autotune();
        let _ = handle_line(
            &autotune,
            r#"{"command":"force_state","state":"critical"}"#,
            MAX,
        );
        let response = handle_line(&autotune, r#"{"command":"state"}"#, MAX);
        let result = response.result.unwrap();
        assert_eq!(result["state"], "critical");
        assert_eq!(result["transitions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_schema_lists_commands() {
        let schema = command_schema().to_string();
        for name in ["push_metric", "emit_signal", "record_performance", "schema"] {
            assert!(schema.contains(name), "schema missing {name}");
        }
    }

    #[test]
    fn test_response_serialization_skips_empty_fields() {
        let json = serde_json::to_string(&Response::success(serde_json::json!(1))).unwrap();
        assert_eq!(json, r#"{"ok":true,"result":1}"#);
    }
}
