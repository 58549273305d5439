//! Host protocol workflow tests.
//!
//! Drives the JSON-lines host over in-memory byte buffers, one response
//! line per command line.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fmt::Write as _;
use std::sync::Arc;

use mape_autotune::config::{AutotuneConfig, ThresholdConfig};
use mape_autotune::host::{Host, Response};
use mape_autotune::AutotuneLoop;
use serde_json::Value;
use tokio::io::BufReader;

async fn run(host: &Host, input: &str) -> Vec<Response> {
    let mut output = Vec::new();
    host.serve(BufReader::new(input.as_bytes()), &mut output)
        .await
        .expect("serve should finish at end of input");
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn host(min_data_points: usize) -> Host {
    let config = AutotuneConfig {
        thresholds: ThresholdConfig {
            min_data_points,
            ..ThresholdConfig::default()
        },
        ..AutotuneConfig::default()
    };
    Host::new(Arc::new(AutotuneLoop::new(config).unwrap()))
}

// ============================================================================
// Session Tests
// ============================================================================

#[tokio::test]
async fn test_metric_session_produces_thresholds() {
    let host = host(10);
    let mut input = String::new();
    for i in 0..12 {
        writeln!(
            input,
            r#"{{"command":"push_metric","key":"latency_ms","value":{}}}"#,
            100 + i % 3
        )
        .unwrap();
    }
    input.push_str("{\"command\":\"optimize\"}\n");
    input.push_str("{\"command\":\"thresholds\"}\n");

    let responses = run(&host, &input).await;
    assert_eq!(responses.len(), 14);
    assert!(responses.iter().all(|r| r.ok));

    let thresholds = responses[13].result.as_ref().unwrap();
    let latency = &thresholds["latency_ms"];
    assert_eq!(latency["parameter_key"], "latency_ms");
    assert_eq!(latency["data_points"], 12);
    assert!(latency["value"].as_f64().unwrap() >= 100.0);
}

#[tokio::test]
async fn test_signal_session_reports_action() {
    let host = host(100);
    let input = concat!(
        r#"{"command":"emit_signal","source":"analyzer","payload":{"loop_type":"anomaly_feedback","false_positives":1}}"#,
        "\n",
        r#"{"command":"stats"}"#,
        "\n",
    );

    let responses = run(&host, input).await;
    assert_eq!(responses.len(), 2);

    let action = &responses[0].result.as_ref().unwrap()["action"];
    assert_eq!(action["loop_type"], "anomaly_feedback");
    assert_eq!(action["parameter_changed"], "anomaly_sensitivity");

    let stats = responses[1].result.as_ref().unwrap();
    assert_eq!(stats["feedback"]["total_actions"], 1);
    assert!((host.autotune().thresholds().sensitivity() - 1.9).abs() < 1e-9);
}

#[tokio::test]
async fn test_state_commands() {
    let host = host(100);
    let input = concat!(
        r#"{"command":"force_state","state":"degraded"}"#,
        "\n",
        r#"{"command":"parameters"}"#,
        "\n",
        r#"{"command":"parameters","state":"critical"}"#,
        "\n",
        r#"{"command":"state"}"#,
        "\n",
    );

    let responses = run(&host, input).await;
    assert_eq!(responses.len(), 4);
    assert_eq!(
        responses[0].result.as_ref().unwrap()["transition"]["to"],
        "degraded"
    );
    assert_eq!(
        responses[1].result.as_ref().unwrap()["parameters"]["execution_parallelism"],
        2
    );
    assert_eq!(
        responses[2].result.as_ref().unwrap()["parameters"]["execution_parallelism"],
        1
    );
    let state = responses[3].result.as_ref().unwrap();
    assert_eq!(state["state"], "degraded");
    assert_eq!(state["transitions"].as_array().unwrap().len(), 1);
}

// ============================================================================
// Error Recovery Tests
// ============================================================================

#[tokio::test]
async fn test_bad_lines_do_not_end_session() {
    let host = host(100);
    let input = concat!(
        "not json\n",
        r#"{"command":"emit_signal","payload":{"loop_type":"bogus"}}"#,
        "\n",
        r#"{"command":"emit_signal","loop_type":"decision_quality","payload":{"loop_type":"anomaly_feedback"}}"#,
        "\n",
        r#"{"command":"push_metric","key":"cpu","value":1}"#,
        "\n",
    );

    let responses = run(&host, input).await;
    assert_eq!(responses.len(), 4);
    assert!(!responses[0].ok);
    assert!(responses[1].error.as_ref().unwrap().contains("bogus"));
    assert!(!responses[2].ok);
    assert!(responses[3].ok);
    assert_eq!(host.autotune().feedback().signal_history().len(), 0);
}

#[tokio::test]
async fn test_schema_lists_commands() {
    let host = host(100);
    let responses = run(&host, "{\"command\":\"schema\"}\n").await;
    let schema = responses[0].result.as_ref().unwrap();
    let text = schema.to_string();
    for name in ["push_metric", "emit_signal", "force_state", "schema"] {
        assert!(text.contains(name), "schema should mention {name}");
    }
    assert!(matches!(schema, Value::Object(_)));
}
