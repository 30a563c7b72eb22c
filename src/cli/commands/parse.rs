//! Parse command implementation.
//!
//! One-shot decode of a finished log or standard input.

use std::path::Path;

use super::{block_on, build_parser, print_summary, EventPrinter};
use crate::cli::{Cli, ParseArgs};
use crate::config::Config;
use crate::error::Result;
use crate::model::SourceMode;
use crate::source::{FileTailSource, LineSource, ReaderSource};
use crate::stream::run_to_end;

/// Run the parse command.
pub fn run(cli: &Cli, config: &Config, args: &ParseArgs) -> Result<()> {
    let mode = if args.console {
        SourceMode::Console
    } else {
        SourceMode::File
    };
    let mut parser = build_parser(mode, config, args.block_policy);
    let mut printer = EventPrinter::stdout(cli.effective_output(config));

    let summary = block_on(async {
        let mut source = open(&args.path).await?;
        run_to_end(&mut source, &mut parser, &mut printer).await
    })??;
    printer.finish()?;

    if !cli.quiet {
        print_summary(&summary);
    }
    Ok(())
}

async fn open(path: &Path) -> Result<Box<dyn LineSource>> {
    if path == Path::new("-") {
        return Ok(Box::new(ReaderSource::stdin()));
    }
    Ok(Box::new(FileTailSource::open(path).await?.follow(false)))
}
