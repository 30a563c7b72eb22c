//! Line source over any async buffered reader.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

use super::{decode_line, LineSource};
use crate::error::{Result, TelemetryError};

/// Reads lines until EOF.
///
/// Bytes are read up to each newline and decoded lossily. A partial read
/// survives a dropped `next_line` future in the internal buffer.
pub struct ReaderSource<R> {
    reader: R,
    pending: Vec<u8>,
    label: String,
}

impl<R: AsyncBufRead + Unpin + Send> ReaderSource<R> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            label: "reader".to_string(),
        }
    }

    /// Name used in logs.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl ReaderSource<BufReader<Stdin>> {
    /// Read standard input.
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin())).with_label("stdin")
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> LineSource for ReaderSource<R> {
    async fn next_line(&mut self) -> Result<Option<String>> {
        let read = self
            .reader
            .read_until(b'\n', &mut self.pending)
            .await
            .map_err(|e| TelemetryError::io(format!("Failed to read from {}", self.label), e))?;

        if read == 0 && self.pending.is_empty() {
            return Ok(None);
        }
        Ok(Some(decode_line(std::mem::take(&mut self.pending))))
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
