//! Background runner joining one [`LineSource`] to one [`SessionParser`].
//!
//! A stream is a single tokio task: it pulls lines from the source, feeds
//! them to the parser in order and pushes events onto an unbounded channel.
//! Cancellation is cooperative and is checked between lines and while the
//! source waits for input.
//!
//! ```rust,no_run
//! # async fn demo() -> qkd_telemetry::Result<()> {
//! use qkd_telemetry::model::SourceMode;
//! use qkd_telemetry::parser::SessionParser;
//! use qkd_telemetry::source::FileTailSource;
//! use qkd_telemetry::stream::spawn_stream;
//!
//! let source = FileTailSource::open("measurement.log").await?;
//! let (handle, mut events) = spawn_stream(source, SessionParser::new(SourceMode::File));
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event}");
//! }
//! let summary = handle.join().await?;
//! println!("resume at {:?}", summary.resume_offset);
//! # Ok(())
//! # }
//! ```

use futures::Stream;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, TelemetryError};
use crate::model::Event;
use crate::parser::{EventSink, ParseStats, SessionParser};
use crate::source::LineSource;

/// Why a stream finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The source reported end-of-stream.
    Exhausted,
    /// The stream was cancelled.
    Stopped,
}

/// Final state of a finished stream.
#[derive(Debug, Clone)]
pub struct StreamSummary {
    /// Source description.
    pub source: String,
    /// Lines pulled from the source.
    pub lines_read: u64,
    /// Offset to resume from, for resumable sources.
    pub resume_offset: Option<u64>,
    /// Parser statistics.
    pub stats: ParseStats,
    /// Why the stream ended.
    pub end: StreamEnd,
}

/// Control handle for a running stream.
#[derive(Debug)]
pub struct StreamHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<StreamSummary>>,
}

impl StreamHandle {
    /// Request a cooperative stop. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the runner task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the stream to finish.
    ///
    /// # Errors
    ///
    /// Returns the source error that ended the stream, or
    /// [`TelemetryError::StreamTask`] if the runner panicked.
    pub async fn join(self) -> Result<StreamSummary> {
        self.task.await.map_err(|e| TelemetryError::StreamTask {
            message: e.to_string(),
        })?
    }

    /// Stop the stream and wait for it.
    pub async fn stop_and_join(self) -> Result<StreamSummary> {
        self.stop();
        self.join().await
    }
}

/// Start a runner task owning `source` and `parser`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_stream<S>(source: S, parser: SessionParser) -> (StreamHandle, UnboundedReceiver<Event>)
where
    S: LineSource + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_stream(source, parser, tx, cancel.clone()));
    (StreamHandle { cancel, task }, rx)
}

async fn run_stream<S: LineSource>(
    mut source: S,
    mut parser: SessionParser,
    mut tx: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
) -> Result<StreamSummary> {
    drive(&mut source, &mut parser, &mut tx, &cancel).await
}

/// Drive `source` to end-of-stream, delivering events into `sink`.
///
/// The source is shut down before returning.
pub async fn run_to_end<S, K>(
    source: &mut S,
    parser: &mut SessionParser,
    sink: &mut K,
) -> Result<StreamSummary>
where
    S: LineSource + ?Sized,
    K: EventSink + ?Sized,
{
    drive(source, parser, sink, &CancellationToken::new()).await
}

async fn drive<S, K>(
    source: &mut S,
    parser: &mut SessionParser,
    sink: &mut K,
    cancel: &CancellationToken,
) -> Result<StreamSummary>
where
    S: LineSource + ?Sized,
    K: EventSink + ?Sized,
{
    let description = source.describe();
    info!(source = %description, mode = %parser.mode(), "Stream started");

    let mut lines_read = 0u64;
    let outcome = loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break Ok(StreamEnd::Stopped),
            next = source.next_line() => next,
        };

        match next {
            Ok(Some(line)) => {
                lines_read += 1;
                parser.feed(&line, sink);
            }
            Ok(None) => break Ok(StreamEnd::Exhausted),
            Err(e) => break Err(e),
        }
    };

    if let Err(e) = source.shutdown().await {
        warn!(source = %description, error = %e, "Failed to shut down source");
    }

    let end = outcome?;
    let stats = parser.stats().clone();
    info!(
        source = %description,
        ?end,
        lines_read,
        events = stats.events_emitted,
        rejected = stats.lines_rejected,
        "Stream finished"
    );

    Ok(StreamSummary {
        source: description,
        lines_read,
        resume_offset: source.offset(),
        stats,
        end,
    })
}

/// Take every event currently queued without waiting.
pub fn drain(receiver: &mut UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    debug!(count = events.len(), "Drained events");
    events
}

/// Adapt a receiver into a [`Stream`] of events.
pub fn event_stream(receiver: UnboundedReceiver<Event>) -> impl Stream<Item = Event> {
    futures::stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|event| (event, receiver))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceMode;
    use crate::source::ReaderSource;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;

    const INPUT: &[u8] = b"SESSION_NUMBER:0\nSPD1_QBER_VALUE_IS:1.5\n";

    #[tokio::test]
    async fn test_spawned_stream_exhausts() {
        let (handle, mut rx) =
            spawn_stream(ReaderSource::new(INPUT), SessionParser::new(SourceMode::File));

        let summary = handle.join().await.unwrap();
        assert_eq!(summary.end, StreamEnd::Exhausted);
        assert_eq!(summary.lines_read, 2);
        assert_eq!(summary.resume_offset, None);
        assert_eq!(
            drain(&mut rx),
            vec![
                Event::SessionNumber { session_id: 0 },
                Event::Qber { value: 1.5 }
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_while_waiting() {
        let (_writer, reader) = tokio::io::duplex(64);
        let source = ReaderSource::new(tokio::io::BufReader::new(reader));
        let (handle, _rx) = spawn_stream(source, SessionParser::new(SourceMode::File));

        let summary = handle.stop_and_join().await.unwrap();
        assert_eq!(summary.end, StreamEnd::Stopped);
        assert_eq!(summary.lines_read, 0);
    }

    #[tokio::test]
    async fn test_event_stream_ends_with_channel() {
        let (handle, rx) =
            spawn_stream(ReaderSource::new(INPUT), SessionParser::new(SourceMode::File));
        let events: Vec<Event> = event_stream(rx).collect().await;
        assert_eq!(events.len(), 2);
        handle.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_to_end_into_vec() {
        let mut source = ReaderSource::new(INPUT);
        let mut parser = SessionParser::new(SourceMode::File);
        let mut events = Vec::new();

        let summary = run_to_end(&mut source, &mut parser, &mut events)
            .await
            .unwrap();
        assert_eq!(summary.end, StreamEnd::Exhausted);
        assert_eq!(events.len(), 2);
        assert_eq!(parser.current_session(), Some(0));
    }
}
