//! Tailing a measurement log file from a byte offset.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, warn};

use super::{decode_line, LineSource};
use crate::error::{Result, TelemetryError};

/// Default delay between polls at end of file.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Follows a log file, yielding complete lines only.
///
/// The committed [`offset`](LineSource::offset) is the byte position just
/// after the last line handed out. A trailing partial line stays buffered
/// until its newline arrives and is never counted, so resuming from the
/// offset neither repeats nor skips a line.
#[derive(Debug)]
pub struct FileTailSource {
    path: PathBuf,
    reader: BufReader<File>,
    offset: u64,
    pending: Vec<u8>,
    follow: bool,
    poll_interval: Duration,
}

impl FileTailSource {
    /// Open `path` at the start of the file.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::FileNotFound`] or
    /// [`TelemetryError::PermissionDenied`] when the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_at(path, 0).await
    }

    /// Open `path` and seek to `offset`.
    ///
    /// An offset beyond the end of the file means the file was truncated
    /// since it was recorded; reading restarts from the beginning.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be opened or seeked.
    pub async fn open_at(path: impl AsRef<Path>, offset: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .map_err(|e| TelemetryError::open(&path, e))?;

        let len = file
            .metadata()
            .await
            .map_err(|e| TelemetryError::io(format!("Failed to stat {}", path.display()), e))?
            .len();

        let offset = if offset > len {
            warn!(
                path = %path.display(),
                offset,
                len,
                "Resume offset is past end of file, reading from the start"
            );
            0
        } else {
            offset
        };

        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| TelemetryError::io(format!("Failed to seek {}", path.display()), e))?;

        debug!(path = %path.display(), offset, "Opened log file");
        Ok(Self {
            path,
            reader,
            offset,
            pending: Vec::new(),
            follow: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Keep polling for new lines at end of file (default), or stop there.
    #[must_use]
    pub fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    /// Delay between polls at end of file.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Path being followed.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of an unterminated line held back.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    fn take_line(&mut self) -> String {
        self.offset += self.pending.len() as u64;
        decode_line(std::mem::take(&mut self.pending))
    }

    async fn truncated(&self) -> Result<bool> {
        let len = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| TelemetryError::io(format!("Failed to stat {}", self.path.display()), e))?
            .len();
        Ok(len < self.offset + self.pending.len() as u64)
    }

    async fn restart(&mut self) -> Result<()> {
        warn!(
            path = %self.path.display(),
            offset = self.offset,
            "Log file truncated, reading from the start"
        );
        self.reader
            .seek(SeekFrom::Start(0))
            .await
            .map_err(|e| TelemetryError::io(format!("Failed to seek {}", self.path.display()), e))?;
        self.offset = 0;
        self.pending.clear();
        Ok(())
    }
}

#[async_trait]
impl LineSource for FileTailSource {
    async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            // read_until appends to `pending`, so a cancelled read loses nothing
            self.reader
                .read_until(b'\n', &mut self.pending)
                .await
                .map_err(|e| {
                    TelemetryError::io(format!("Failed to read {}", self.path.display()), e)
                })?;

            if self.pending.last() == Some(&b'\n') {
                return Ok(Some(self.take_line()));
            }

            if !self.follow {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_line()));
            }

            if self.truncated().await? {
                self.restart().await?;
                continue;
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn offset(&self) -> Option<u64> {
        Some(self.offset)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}
