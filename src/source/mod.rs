//! Line sources feeding the parser.
//!
//! Every transport implements [`LineSource`]: yield the next line or report
//! end-of-stream. All blocking lives here; the parser never waits.
//!
//! Current implementations:
//! - [`ReaderSource`]: any async buffered reader (stdin, in-memory buffers)
//! - [`FileTailSource`]: a log file followed from a byte offset
//! - [`ConsoleSource`]: standard output of a spawned measurement program

mod console;
mod file;
mod reader;

pub use console::ConsoleSource;
pub use file::FileTailSource;
pub use reader::ReaderSource;

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::{Result, TelemetryError};
use crate::model::SourceMode;

/// A producer of text lines.
///
/// Implementations must be cancel-safe in [`next_line`](Self::next_line):
/// when the returned future is dropped before completion, no bytes that were
/// already read may be lost or delivered twice.
#[async_trait]
pub trait LineSource: Send {
    /// Next line without its terminator, or `None` at end-of-stream.
    async fn next_line(&mut self) -> Result<Option<String>>;

    /// Byte position just after the last line handed out, if resumable.
    fn offset(&self) -> Option<u64> {
        None
    }

    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Release the underlying resource.
    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<S: LineSource + ?Sized> LineSource for Box<S> {
    async fn next_line(&mut self) -> Result<Option<String>> {
        (**self).next_line().await
    }

    fn offset(&self) -> Option<u64> {
        (**self).offset()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    async fn shutdown(&mut self) -> Result<()> {
        (**self).shutdown().await
    }
}

/// Turn raw line bytes into text.
///
/// Strips one `\n` or `\r\n` terminator. Invalid UTF-8 is replaced rather
/// than reported, so a corrupt byte costs one line and never the stream.
pub(crate) fn decode_line(mut bytes: Vec<u8>) -> String {
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
    }
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Open the source described by `config`.
///
/// File mode without a path reads standard input.
///
/// # Errors
///
/// Returns the failed-start condition of the chosen adapter: missing file,
/// permission denied, spawn failure, or a console config without a program.
pub async fn open_source(config: &SourceConfig) -> Result<Box<dyn LineSource>> {
    let source: Box<dyn LineSource> = match config.mode {
        SourceMode::File => match &config.path {
            Some(path) => Box::new(
                FileTailSource::open_at(path, config.offset)
                    .await?
                    .follow(config.follow)
                    .poll_interval(Duration::from_millis(config.poll_interval_ms)),
            ),
            None => Box::new(ReaderSource::stdin()),
        },
        SourceMode::Console => {
            let program = config
                .program
                .as_deref()
                .ok_or_else(|| TelemetryError::InvalidArgument {
                    name: "program".to_string(),
                    reason: "console mode needs a program to run".to_string(),
                })?;
            Box::new(ConsoleSource::spawn(program, &config.args, &config.input_string)?)
        }
    };

    debug!(source = %source.describe(), "Opened line source");
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_boxed_source_delegates() {
        let mut source: Box<dyn LineSource> = Box::new(ReaderSource::new(&b"a\nb\n"[..]));
        assert_eq!(source.next_line().await.unwrap().as_deref(), Some("a"));
        assert_eq!(source.next_line().await.unwrap().as_deref(), Some("b"));
        assert_eq!(source.next_line().await.unwrap(), None);
        assert_eq!(source.offset(), None);
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line(b"abc\r\n".to_vec()), "abc");
        assert_eq!(decode_line(b"abc\n".to_vec()), "abc");
        assert_eq!(decode_line(b"abc".to_vec()), "abc");
        assert_eq!(decode_line(b"a\xffb\n".to_vec()), "a\u{fffd}b");
    }

    #[tokio::test]
    async fn test_console_without_program() {
        let config = SourceConfig {
            mode: SourceMode::Console,
            program: None,
            ..SourceConfig::default()
        };
        let err = open_source(&config).await.err().unwrap();
        assert!(matches!(err, TelemetryError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let config = SourceConfig {
            path: Some("/definitely/not/here.log".into()),
            ..SourceConfig::default()
        };
        let err = open_source(&config).await.err().unwrap();
        assert!(matches!(err, TelemetryError::FileNotFound { .. }));
    }
}
