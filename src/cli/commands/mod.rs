//! CLI command implementations.
//!
//! Each command is implemented in its own module with a `run` function
//! that handles the command logic. Shared pieces live here: the tokio
//! runtime, parser construction and event printing.

pub mod config;
pub mod parse;
pub mod run;
pub mod tail;

use std::future::Future;
use std::io::{self, BufWriter, Stdout, Write};

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::cli::{BlockPolicyArg, OutputFormat};
use crate::config::Config;
use crate::error::{Result, TelemetryError};
use crate::model::{Event, EventRecord, SourceMode};
use crate::parser::{EventSink, ParseStats, SessionParser};
use crate::stream::{StreamEnd, StreamHandle, StreamSummary};

/// Run a future on a fresh multi-threaded runtime.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| TelemetryError::io("Failed to start async runtime", e))?;
    Ok(runtime.block_on(future))
}

/// Build a parser from config, with an optional policy override.
pub fn build_parser(
    mode: SourceMode,
    config: &Config,
    policy: Option<BlockPolicyArg>,
) -> SessionParser {
    SessionParser::new(mode)
        .with_block_policy(policy.map_or(config.parser.block_policy, Into::into))
        .with_default_input(config.parser.default_input.clone())
}

/// Writes events to stdout in the chosen format.
pub struct EventPrinter<W: Write = BufWriter<Stdout>> {
    format: OutputFormat,
    out: W,
    error: Option<TelemetryError>,
}

impl EventPrinter {
    /// Printer writing to stdout.
    #[must_use]
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(format, BufWriter::new(io::stdout()))
    }
}

impl<W: Write> EventPrinter<W> {
    /// Printer writing to `out`.
    pub fn new(format: OutputFormat, out: W) -> Self {
        Self {
            format,
            out,
            error: None,
        }
    }

    /// Print one event and flush it.
    pub fn print(&mut self, event: Event) -> Result<()> {
        match self.format {
            OutputFormat::Text => writeln!(self.out, "{event}"),
            OutputFormat::Json => {
                let record = EventRecord::now(event);
                serde_json::to_writer(&mut self.out, &record)?;
                writeln!(self.out)
            }
        }
        .and_then(|()| self.out.flush())
        .map_err(|e| TelemetryError::io("Failed to write event", e))
    }

    /// Surface the first error seen while used as a sink.
    pub fn finish(mut self) -> Result<W> {
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(self.out),
        }
    }
}

impl<W: Write> EventSink for EventPrinter<W> {
    fn deliver(&mut self, event: Event) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.print(event) {
            self.error = Some(e);
        }
    }
}

/// Print events from a running stream until it ends or Ctrl-C stops it.
pub async fn print_until_done(
    handle: StreamHandle,
    mut events: UnboundedReceiver<Event>,
    printer: &mut EventPrinter<impl Write>,
) -> Result<StreamSummary> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if let Err(e) = printer.print(event) {
                    handle.stop();
                    return Err(e);
                }
            }
            signal = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if let Err(e) = signal {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                } else {
                    info!("Interrupt received, stopping stream");
                }
                handle.stop();
            }
        }
    }

    handle.join().await
}

/// Turn a stream stopped by Ctrl-C into [`TelemetryError::Interrupted`].
///
/// Call after the summary and resume state have been handled.
pub fn ensure_completed(summary: &StreamSummary) -> Result<()> {
    match summary.end {
        StreamEnd::Exhausted => Ok(()),
        StreamEnd::Stopped => Err(TelemetryError::Interrupted),
    }
}

/// Print a parse statistics summary to stderr.
pub fn print_summary(summary: &StreamSummary) {
    let stats: &ParseStats = &summary.stats;
    eprintln!("Source:           {}", summary.source);
    eprintln!("Lines read:       {}", summary.lines_read);
    eprintln!("Events emitted:   {}", stats.events_emitted);
    eprintln!("  backfilled:     {}", stats.backfilled_events);
    eprintln!("Sessions:         {}", stats.sessions_started);
    eprintln!("Blocks completed: {}", stats.blocks_completed);
    eprintln!("Lines ignored:    {}", stats.lines_ignored);
    eprintln!("Lines rejected:   {}", stats.lines_rejected);
    eprintln!("Success rate:     {:.1}%", stats.success_rate());
    for rejected in &stats.errors {
        eprintln!(
            "  line {}: {} ({})",
            rejected.line, rejected.error, rejected.content_preview
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_printer() {
        let mut printer = EventPrinter::new(OutputFormat::Text, Vec::new());
        printer.print(Event::SessionNumber { session_id: 3 }).unwrap();
        printer.deliver(Event::Qber { value: 1.5 });
        let out = String::from_utf8(printer.finish().unwrap()).unwrap();
        assert_eq!(out, "session 3\nqber 1.5\n");
    }

    #[test]
    fn test_json_printer() {
        let mut printer = EventPrinter::new(OutputFormat::Json, Vec::new());
        printer.print(Event::KbpsData { value: 2.0 }).unwrap();
        let out = String::from_utf8(printer.finish().unwrap()).unwrap();

        let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["type"], "kbps_data");
        assert_eq!(value["value"], 2.0);
        assert!(value["received_at"].is_string());
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_keeps_json_write_error() {
        let mut printer = EventPrinter::new(OutputFormat::Json, BrokenPipe);
        printer.deliver(Event::Qber { value: 1.0 });
        printer.deliver(Event::Qber { value: 2.0 });
        let err = printer.finish().err().unwrap();
        assert!(matches!(err, TelemetryError::SerializationError { .. }));
    }

    #[test]
    fn test_sink_keeps_text_write_error() {
        let mut printer = EventPrinter::new(OutputFormat::Text, BrokenPipe);
        printer.deliver(Event::SessionNumber { session_id: 0 });
        let err = printer.finish().err().unwrap();
        assert!(matches!(err, TelemetryError::IoError { .. }));
    }

    fn summary(end: StreamEnd) -> StreamSummary {
        StreamSummary {
            source: "test".to_string(),
            lines_read: 0,
            resume_offset: None,
            stats: ParseStats::default(),
            end,
        }
    }

    #[test]
    fn test_stopped_stream_is_interrupted() {
        assert!(ensure_completed(&summary(StreamEnd::Exhausted)).is_ok());
        let err = ensure_completed(&summary(StreamEnd::Stopped)).unwrap_err();
        assert!(matches!(err, TelemetryError::Interrupted));
        assert_eq!(err.exit_code(), 130);
    }

    #[test]
    fn test_build_parser_override() {
        let config = Config::default();
        let parser = build_parser(
            SourceMode::Console,
            &config,
            Some(BlockPolicyArg::AbortOnInvalid),
        );
        assert_eq!(parser.mode(), SourceMode::Console);
        assert_eq!(parser.block_policy(), crate::parser::BlockPolicy::AbortOnInvalid);
    }
}
