//! qkd-telemetry: live decoder for QKD measurement program output.
//!
//! A quantum key distribution measurement program prints a line-oriented
//! protocol: session markers, 40-value bursts of detector timestamps, and
//! keyed readings such as QBER, visibility, key rate and the distilled key.
//! This crate turns that text into typed [`model::Event`]s, tracks session
//! boundaries and backfills the fields a session never reported.
//!
//! # Features
//!
//! - **Streaming**: one line at a time, never blocking, bounded memory
//! - **Session tracking**: parity-based expected fields with backfill
//! - **Resumable tails**: committed byte offsets survive restarts
//! - **Two transports**: log files and spawned measurement programs
//!
//! # Quick Start
//!
//! ```rust
//! use qkd_telemetry::prelude::*;
//!
//! let mut parser = SessionParser::new(SourceMode::File);
//! let mut events = Vec::new();
//! for line in ["SESSION_NUMBER:0", "KEY_RATE_PER_SECOND_IS:12.5", "SESSION_NUMBER:1"] {
//!     parser.feed(line, &mut events);
//! }
//!
//! // Even session 0 never reported a key, so a zero key is synthesized
//! assert!(events.iter().any(|e| matches!(e, Event::Key { length: 128, .. })));
//! assert_eq!(events.last(), Some(&Event::SessionNumber { session_id: 1 }));
//! ```
//!
//! # Architecture
//!
//! - [`model`]: events, event kinds, detectors and the JSON record envelope
//! - [`parser`]: line classification, timestamp blocks, session backfill
//! - [`source`]: line sources for readers, log files and child processes
//! - [`stream`]: background runner with cancellation and resume offsets
//! - [`config`]: TOML configuration and resume state
//! - [`cli`]: the `qkdtap` command-line interface
//! - [`error`]: error types and exit codes

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod source;
pub mod stream;
pub mod util;

// Re-export commonly used types at the crate root
pub use error::{Result, TelemetryError};
pub use model::{Event, EventKind};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Result, TelemetryError};
    pub use crate::model::{Detector, Event, EventKind, EventRecord, SourceMode};
    pub use crate::parser::{BlockPolicy, EventSink, LineOutcome, ParseStats, SessionParser};
    pub use crate::source::{ConsoleSource, FileTailSource, LineSource, ReaderSource};
    pub use crate::stream::{spawn_stream, StreamEnd, StreamHandle, StreamSummary};
}
