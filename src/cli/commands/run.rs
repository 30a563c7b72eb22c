//! Run command implementation.
//!
//! Spawns the measurement program and prints decoded events until it exits
//! or Ctrl-C is pressed.

use super::{
    block_on, build_parser, ensure_completed, print_summary, print_until_done, EventPrinter,
};
use crate::cli::{Cli, RunArgs};
use crate::config::{Config, SourceConfig};
use crate::error::Result;
use crate::model::SourceMode;
use crate::source::open_source;
use crate::stream::spawn_stream;

/// Run the run command.
pub fn run(cli: &Cli, config: &Config, args: &RunArgs) -> Result<()> {
    let source_config = source_config(config, args);
    let parser = build_parser(SourceMode::Console, config, args.block_policy);
    let mut printer = EventPrinter::stdout(cli.effective_output(config));

    let summary = block_on(async {
        let source = open_source(&source_config).await?;
        let (handle, events) = spawn_stream(source, parser);
        print_until_done(handle, events, &mut printer).await
    })??;

    if !cli.quiet {
        print_summary(&summary);
    }
    ensure_completed(&summary)
}

/// Merge command-line flags over the configured source.
fn source_config(config: &Config, args: &RunArgs) -> SourceConfig {
    let mut source = config.source.clone();
    source.mode = SourceMode::Console;
    if let Some(program) = &args.program {
        source.program = Some(program.clone());
    }
    if let Some(input) = &args.input {
        source.input_string = input.clone();
    }
    if !args.args.is_empty() {
        source.args = args.args.clone();
    }
    source
}
