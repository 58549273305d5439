//! Stdio JSON-lines host.
//!
//! This module provides:
//! - [`Command`]/[`Response`]: the line protocol, with a published schema
//! - [`LineTransport`]: line framing over any async reader/writer
//! - [`Host`]: the serving loop, which also drives periodic optimization
//!
//! stdout carries responses only; all logging goes to stderr.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use mape_autotune::config::AutotuneConfig;
//! use mape_autotune::control_loop::AutotuneLoop;
//! use mape_autotune::host::Host;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let autotune = Arc::new(AutotuneLoop::new(AutotuneConfig::default())?);
//! let host = Host::new(autotune);
//!
//! let input = b"{\"command\":\"push_metric\",\"key\":\"cpu\",\"value\":40}\n";
//! let mut output = Vec::new();
//! host.serve(tokio::io::BufReader::new(&input[..]), &mut output).await?;
//! assert!(String::from_utf8(output)?.starts_with("{\"ok\":true"));
//! # Ok(())
//! # }
//! ```

mod commands;
mod transport;

pub use commands::{command_schema, execute, handle_line, parse_command, Command, Response};
pub use transport::{LineTransport, TransportConfig};

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::time::MissedTickBehavior;

use crate::control_loop::AutotuneLoop;
use crate::error::AppError;

/// Serves the line protocol against one [`AutotuneLoop`].
#[derive(Debug, Clone)]
pub struct Host {
    autotune: Arc<AutotuneLoop>,
}

impl Host {
    /// Creates a host for `autotune`.
    #[must_use]
    pub const fn new(autotune: Arc<AutotuneLoop>) -> Self {
        Self { autotune }
    }

    /// The loop being served.
    #[must_use]
    pub fn autotune(&self) -> &AutotuneLoop {
        &self.autotune
    }

    /// Serve stdin/stdout until stdin closes or Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if stdin or stdout fails.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run_stdio(&self) -> Result<(), AppError> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        tokio::select! {
            result = self.serve(stdin, stdout) => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted; shutting down");
                Ok(())
            }
        }
    }

    /// Serve commands from `reader`, writing responses to `writer`, until
    /// end of input.
    ///
    /// Between commands a timer runs a gated optimization pass every
    /// `cycle_tick_secs`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if reading or writing fails.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<(), AppError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let config = self.autotune.config();
        let max_bytes = config.max_command_bytes;
        let mut transport = LineTransport::new(
            reader,
            writer,
            TransportConfig {
                max_message_size: max_bytes,
            },
        );
        let mut ticker = tokio::time::interval(config.cycle_tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately
        ticker.tick().await;

        tracing::info!(
            cycle_tick_secs = config.cycle_tick_secs,
            "Host serving JSON lines"
        );

        loop {
            tokio::select! {
                line = transport.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    let response = handle_line(&self.autotune, line, max_bytes);
                    transport.send(&response).await?;
                }
                _ = ticker.tick() => self.tick(),
            }
        }

        tracing::info!("Input closed; host stopping");
        Ok(())
    }

    fn tick(&self) {
        let outcomes = self.autotune.maybe_optimize();
        let recommended = outcomes
            .values()
            .filter(|outcome| outcome.recommendation().is_some())
            .count();
        tracing::debug!(
            keys = outcomes.len(),
            recommended,
            "Scheduled optimization pass"
        );
    }
}
