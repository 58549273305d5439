//! Line transport for the host.
//!
//! Reads one JSON command per line and writes one JSON response per line.
//! Blank lines are ignored.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::commands::Response;
use crate::error::AppError;

/// Configuration for the line transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Maximum command line size in bytes.
    pub max_message_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_size: crate::config::DEFAULT_MAX_COMMAND_BYTES,
        }
    }
}

/// JSON-lines reader/writer pair.
#[derive(Debug)]
pub struct LineTransport<R, W> {
    config: TransportConfig,
    reader: R,
    writer: W,
    buffer: String,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap a reader and writer.
    pub const fn new(reader: R, writer: W, config: TransportConfig) -> Self {
        Self {
            config,
            reader,
            writer,
            buffer: String::new(),
        }
    }

    /// Returns the transport configuration.
    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Next non-blank line, or `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if reading fails.
    pub async fn next_line(&mut self) -> Result<Option<&str>, AppError> {
        loop {
            self.buffer.clear();
            if self.reader.read_line(&mut self.buffer).await? == 0 {
                return Ok(None);
            }
            if !self.buffer.trim().is_empty() {
                return Ok(Some(self.buffer.trim_end_matches(['\r', '\n'])));
            }
        }
    }

    /// Write one response line and flush.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if writing fails.
    pub async fn send(&mut self, response: &Response) -> Result<(), AppError> {
        let mut line = serde_json::to_string(response).map_err(|e| AppError::Io {
            message: e.to_string(),
        })?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
