//! Command-line interface for qkdtap.
//!
//! Five commands:
//! - `tail`: follow a measurement log file
//! - `run`: spawn the measurement program and decode its output
//! - `parse`: decode a finished log (or stdin) and report statistics
//! - `config`: inspect or create the configuration file
//! - `completions`: generate shell completion scripts

mod commands;

pub use commands::*;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{self, Config};
use crate::error::Result;
use crate::parser::BlockPolicy;

/// Live decoder for QKD measurement program output.
#[derive(Debug, Parser)]
#[command(name = "qkdtap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Output format for events.
    #[arg(short = 'o', long, global = true, env = "QKDTAP_OUTPUT")]
    pub output: Option<OutputFormat>,

    /// Output as JSON (shorthand for -o json).
    #[arg(long, global = true, env = "QKDTAP_JSON")]
    pub json: bool,

    /// Suppress summaries and progress messages.
    #[arg(short = 'q', long, global = true, env = "QKDTAP_QUIET")]
    pub quiet: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "warn", env = "QKDTAP_LOG_LEVEL")]
    pub log_level: LogLevel,

    /// Log format (text, json, compact, pretty).
    #[arg(long, global = true, default_value = "text", env = "QKDTAP_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Path to custom configuration file.
    #[arg(long, global = true, env = "QKDTAP_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Log level options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogLevel {
    /// Only errors.
    Error,
    /// Errors and warnings.
    #[default]
    Warn,
    /// Errors, warnings, and informational messages.
    Info,
    /// All of the above plus debug messages.
    Debug,
    /// All messages including trace-level details.
    Trace,
}

/// Log format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format.
    #[default]
    Text,
    /// Structured JSON format for machine consumption.
    Json,
    /// Compact single-line format.
    Compact,
    /// Pretty format with full details.
    Pretty,
}

impl LogLevel {
    /// Convert to tracing filter level.
    #[must_use]
    pub fn to_filter_string(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Output format for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// One human-readable event per line.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl From<config::OutputFormat> for OutputFormat {
    fn from(format: config::OutputFormat) -> Self {
        match format {
            config::OutputFormat::Text => Self::Text,
            config::OutputFormat::Json => Self::Json,
        }
    }
}

impl Cli {
    /// Get effective output format: `--json`, then `--output`, then config.
    #[must_use]
    pub fn effective_output(&self, config: &Config) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.output
                .unwrap_or_else(|| OutputFormat::from(config.output.format))
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Follow a measurement log file and print events.
    #[command(alias = "follow")]
    Tail(TailArgs),

    /// Run the measurement program and print events from its output.
    Run(RunArgs),

    /// Decode a finished log and print a statistics summary.
    Parse(ParseArgs),

    /// Inspect or create the configuration file.
    Config(ConfigArgs),

    /// Generate shell completions.
    Completions(CompletionsArgs),
}

/// Burst policy choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BlockPolicyArg {
    /// Drop non-integer lines and keep collecting.
    SkipInvalid,
    /// Close the burst and treat the line as keyed payload.
    AbortOnInvalid,
}

impl From<BlockPolicyArg> for BlockPolicy {
    fn from(arg: BlockPolicyArg) -> Self {
        match arg {
            BlockPolicyArg::SkipInvalid => Self::SkipInvalid,
            BlockPolicyArg::AbortOnInvalid => Self::AbortOnInvalid,
        }
    }
}

/// Arguments for the tail command.
#[derive(Debug, Clone, clap::Args)]
pub struct TailArgs {
    /// Log file to follow (default: `source.path` from config).
    pub path: Option<PathBuf>,

    /// Start at this byte offset.
    #[arg(long, conflicts_with = "resume")]
    pub offset: Option<u64>,

    /// Continue from the offset saved when the last tail of this file stopped.
    #[arg(long)]
    pub resume: bool,

    /// Stop at end of file instead of waiting for more lines.
    #[arg(long)]
    pub no_follow: bool,

    /// Delay between end-of-file polls (e.g. 500ms, 2s).
    #[arg(long, value_parser = humantime::parse_duration)]
    pub poll_interval: Option<Duration>,

    /// Handling of non-integer lines inside a timestamp block.
    #[arg(long, value_enum)]
    pub block_policy: Option<BlockPolicyArg>,
}

/// Arguments for the run command.
#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// Measurement program (default: `source.program` from config).
    pub program: Option<String>,

    /// Input string passed as the program's last argument.
    #[arg(short = 'i', long)]
    pub input: Option<String>,

    /// Handling of non-integer lines inside a timestamp block.
    #[arg(long, value_enum)]
    pub block_policy: Option<BlockPolicyArg>,

    /// Launch arguments placed before the input string.
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// Arguments for the parse command.
#[derive(Debug, Clone, clap::Args)]
pub struct ParseArgs {
    /// Log file, or `-` for standard input.
    #[arg(default_value = "-")]
    pub path: PathBuf,

    /// Decode as console output (recognizes `INPUT_STRING:`).
    #[arg(long)]
    pub console: bool,

    /// Handling of non-integer lines inside a timestamp block.
    #[arg(long, value_enum)]
    pub block_policy: Option<BlockPolicyArg>,
}

/// Arguments for the config command.
#[derive(Debug, Clone, clap::Args)]
pub struct ConfigArgs {
    /// Config action.
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config actions.
#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration.
    Show,
    /// Print the configuration file path.
    Path,
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

/// Arguments for the completions command.
#[derive(Debug, Clone, clap::Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: CompletionShell,
}

/// Supported shells for completion generation.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CompletionShell {
    /// Bash shell.
    Bash,
    /// Zsh shell.
    Zsh,
    /// Fish shell.
    Fish,
    /// PowerShell.
    Powershell,
    /// Elvish shell.
    Elvish,
}

impl From<CompletionShell> for Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => Shell::Bash,
            CompletionShell::Zsh => Shell::Zsh,
            CompletionShell::Fish => Shell::Fish,
            CompletionShell::Powershell => Shell::PowerShell,
            CompletionShell::Elvish => Shell::Elvish,
        }
    }
}

/// Generate shell completions and print to stdout.
pub fn generate_completions(shell: CompletionShell) {
    let mut cmd = Cli::command();
    let shell: Shell = shell.into();
    generate(shell, &mut cmd, "qkdtap", &mut io::stdout());
}

/// Initialize tracing/logging based on CLI options.
///
/// `RUST_LOG` takes precedence over `--log-level`. Logs go to stderr so
/// stdout carries only events.
fn init_logging(cli: &Cli) {
    use tracing_subscriber::{
        fmt::{self, format::FmtSpan},
        layer::SubscriberExt,
        util::SubscriberInitExt,
        EnvFilter,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_filter_string()));

    let result = match cli.log_format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_span_events(FmtSpan::CLOSE)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
        }
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .pretty()
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
        }
        LogFormat::Text => {
            let layer = fmt::layer().with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
        }
    };

    if let Err(e) = result {
        eprintln!("Warning: Could not initialize logging: {e}");
    }
}

/// Run the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli);

    // An existing --config must parse; the default location may be absent or broken
    let config = match &cli.config {
        Some(path) if path.exists() => Config::load_from(path)?,
        Some(_) => Config::default(),
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config: {e}");
            Config::default()
        }),
    };

    match &cli.command {
        Commands::Tail(args) => commands::tail::run(&cli, &config, args),
        Commands::Run(args) => commands::run::run(&cli, &config, args),
        Commands::Parse(args) => commands::parse::run(&cli, &config, args),
        Commands::Config(args) => commands::config::run(&cli, &config, args),
        Commands::Completions(args) => {
            generate_completions(args.shell);
            Ok(())
        }
    }
}
