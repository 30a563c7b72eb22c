//! qkdtap: decode QKD measurement program output into structured events.
//!
//! Follows a measurement log file or runs the measurement program directly,
//! printing one event per line as text or JSON.

use std::process::ExitCode;

use qkd_telemetry::cli;

fn main() -> ExitCode {
    // Logging is initialized by cli::run based on --log-level and --log-format
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");

            if std::env::var("RUST_BACKTRACE").is_ok() {
                if let Some(source) = std::error::Error::source(&e) {
                    eprintln!("Caused by: {source}");
                }
            }

            ExitCode::from(e.exit_code() as u8)
        }
    }
}
