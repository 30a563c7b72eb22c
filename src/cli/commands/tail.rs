//! Tail command implementation.
//!
//! Follows a measurement log file and prints events as lines arrive. When
//! the stream stops, the resume offset is printed and saved.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{block_on, build_parser, ensure_completed, print_until_done, EventPrinter};
use crate::cli::{Cli, TailArgs};
use crate::config::{Config, ResumeState, SourceConfig};
use crate::error::{Result, TelemetryError};
use crate::model::SourceMode;
use crate::source::open_source;
use crate::stream::spawn_stream;

/// Run the tail command.
pub fn run(cli: &Cli, config: &Config, args: &TailArgs) -> Result<()> {
    let source_config = source_config(config, args)?;
    let path = source_config
        .path
        .clone()
        .ok_or_else(|| TelemetryError::InvalidArgument {
            name: "path".to_string(),
            reason: "no log file given and none configured".to_string(),
        })?;

    let parser = build_parser(SourceMode::File, config, args.block_policy);
    let mut printer = EventPrinter::stdout(cli.effective_output(config));

    let summary = block_on(async {
        let source = open_source(&source_config).await?;
        let (handle, events) = spawn_stream(source, parser);
        print_until_done(handle, events, &mut printer).await
    })??;

    if let Some(offset) = summary.resume_offset {
        ResumeState::new(&path, offset).save()?;
        if !cli.quiet {
            eprintln!("Resume offset: {offset} ({})", path.display());
        }
    }
    ensure_completed(&summary)
}

/// Merge command-line flags over the configured source.
fn source_config(config: &Config, args: &TailArgs) -> Result<SourceConfig> {
    let mut source = config.source.clone();
    source.mode = SourceMode::File;

    if let Some(path) = &args.path {
        source.path = Some(path.clone());
    }
    source.path = source.path.map(|p| canonical(&p));

    if let Some(offset) = args.offset {
        source.offset = offset;
    } else if args.resume {
        let saved = ResumeState::load()?;
        source.offset = match (&saved, &source.path) {
            (Some(state), Some(path)) => state.offset_for(path).unwrap_or(0),
            _ => 0,
        };
        debug!(offset = source.offset, "Resuming from saved offset");
    }

    if args.no_follow {
        source.follow = false;
    }
    if let Some(interval) = args.poll_interval {
        source.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    }
    Ok(source)
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use crate::cli::Commands;

    fn tail_args(argv: &[&str]) -> TailArgs {
        let mut full = vec!["qkdtap", "tail"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Tail(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = Config::default();
        config.source.path = Some(PathBuf::from("/configured.log"));
        config.source.offset = 10;

        let source = source_config(
            &config,
            &tail_args(&["/given.log", "--offset", "99", "--no-follow", "--poll-interval", "2s"]),
        )
        .unwrap();

        assert_eq!(source.path, Some(PathBuf::from("/given.log")));
        assert_eq!(source.offset, 99);
        assert!(!source.follow);
        assert_eq!(source.poll_interval_ms, 2000);
    }

    #[test]
    fn test_config_path_used_when_absent() {
        let mut config = Config::default();
        config.source.path = Some(PathBuf::from("/configured.log"));
        config.source.mode = SourceMode::Console;

        let source = source_config(&config, &tail_args(&[])).unwrap();
        assert_eq!(source.mode, SourceMode::File);
        assert_eq!(source.path, Some(PathBuf::from("/configured.log")));
        assert!(source.follow);
    }
}
