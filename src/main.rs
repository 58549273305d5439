//! Autotune host binary entry point.
//!
//! Serves the JSON-lines command protocol over stdio. All logs go to
//! stderr; stdout is reserved for responses.
//!
//! Coverage is excluded because the main function needs a live stdio
//! session.

// Enable the coverage attribute when running with nightly for llvm-cov exclusions
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use std::sync::Arc;

use mape_autotune::config::{AutotuneConfig, DEFAULT_LOG_LEVEL};
use mape_autotune::control_loop::AutotuneLoop;
use mape_autotune::host::Host;

#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() {
    // Initialize logging to stderr only (stdout is for responses)
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
                .parse()
                .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(DEFAULT_LOG_LEVEL)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("mape-autotune starting...");

    let config = match AutotuneConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Configuration loaded: buffer_capacity={}, min_data_points={}, tick={}s",
        config.thresholds.buffer_capacity,
        config.thresholds.min_data_points,
        config.cycle_tick_secs
    );

    let autotune = match AutotuneLoop::new(config) {
        Ok(autotune) => Arc::new(autotune),
        Err(e) => {
            tracing::error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = Host::new(autotune).run_stdio().await {
        tracing::error!("Host error: {e}");
        std::process::exit(1);
    }

    tracing::info!("mape-autotune shutdown complete");
}
