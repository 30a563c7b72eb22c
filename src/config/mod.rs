//! Configuration management for qkdtap.
//!
//! Handles:
//! - Source selection (log file or measurement program)
//! - Parser policy
//! - Output format
//! - Resume state for interrupted file streams

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TelemetryError};
use crate::model::SourceMode;
use crate::parser::{BlockPolicy, DEFAULT_INPUT_STRING};
use crate::util::atomic_write;

/// Directory name used under the platform config and data directories.
pub const APP_DIR: &str = "qkd-telemetry";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Where lines come from.
    #[serde(default)]
    pub source: SourceConfig,
    /// Parser behavior.
    #[serde(default)]
    pub parser: ParserConfig,
    /// Output rendering.
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let config_path = default_config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            debug!(path = %config_path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TelemetryError::io(format!("Failed to read config file: {}", path.display()), e)
        })?;

        toml::from_str(&content).map_err(|e| TelemetryError::InvalidConfig {
            message: e.to_string(),
        })
    }

    /// Save configuration to a specific path.
    ///
    /// The file is written atomically.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| TelemetryError::InvalidConfig {
            message: format!("Failed to serialize config: {e}"),
        })?;

        atomic_write(path, content.as_bytes())
    }
}

/// Source settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// File or console mode.
    #[serde(default)]
    pub mode: SourceMode,
    /// Log file to follow (file mode). Standard input when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Starting byte offset (file mode).
    #[serde(default)]
    pub offset: u64,
    /// Measurement program (console mode).
    #[serde(default)]
    pub program: Option<String>,
    /// Launch arguments placed before the input string.
    #[serde(default)]
    pub args: Vec<String>,
    /// Last argument passed to the measurement program.
    #[serde(default = "default_input_string")]
    pub input_string: String,
    /// Delay between end-of-file polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Keep waiting for new lines at end of file.
    #[serde(default = "default_true")]
    pub follow: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::File,
            path: None,
            offset: 0,
            program: None,
            args: Vec::new(),
            input_string: default_input_string(),
            poll_interval_ms: default_poll_interval_ms(),
            follow: true,
        }
    }
}

/// Parser settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Handling of non-integer lines inside a timestamp block.
    #[serde(default)]
    pub block_policy: BlockPolicy,
    /// Input string synthesized when a console session never reported one.
    #[serde(default = "default_input_string")]
    pub default_input: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            block_policy: BlockPolicy::default(),
            default_input: default_input_string(),
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Event rendering.
    #[serde(default)]
    pub format: OutputFormat,
}

/// How events are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One human-readable event per line.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Where a file stream stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeState {
    /// Followed file.
    pub path: PathBuf,
    /// Byte offset just after the last consumed line.
    pub offset: u64,
    /// When the state was recorded.
    pub updated_at: DateTime<Utc>,
}

impl ResumeState {
    /// Record `offset` for `path` now.
    pub fn new(path: impl Into<PathBuf>, offset: u64) -> Self {
        Self {
            path: path.into(),
            offset,
            updated_at: Utc::now(),
        }
    }

    /// Load state from a specific path, `None` if it does not exist.
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            TelemetryError::io(format!("Failed to read resume state: {}", path.display()), e)
        })?;
        let state = serde_json::from_str(&content).map_err(|e| TelemetryError::SerializationError {
            context: format!("Failed to parse resume state: {}", path.display()),
            source: e,
        })?;
        Ok(Some(state))
    }

    /// Load state from the default location.
    pub fn load() -> Result<Option<Self>> {
        Self::load_from(&default_state_path()?)
    }

    /// Offset to use for `path`, if the state belongs to it.
    #[must_use]
    pub fn offset_for(&self, path: &Path) -> Option<u64> {
        (self.path == path).then_some(self.offset)
    }

    /// Save state to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_vec_pretty(self).map_err(|e| TelemetryError::SerializationError {
                context: "Failed to serialize resume state".to_string(),
                source: e,
            })?;
        atomic_write(path, &content)
    }

    /// Save state to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&default_state_path()?)
    }
}

fn default_true() -> bool {
    true
}

fn default_input_string() -> String {
    DEFAULT_INPUT_STRING.to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

/// Get the default configuration path.
pub fn default_config_path() -> Result<PathBuf> {
    let config_dir =
        dirs::config_dir().ok_or_else(|| TelemetryError::config("Cannot determine config directory"))?;

    Ok(config_dir.join(APP_DIR).join("config.toml"))
}

/// Get the default resume-state path.
pub fn default_state_path() -> Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| TelemetryError::config("Cannot determine data directory"))?;

    Ok(data_dir.join(APP_DIR).join("resume.json"))
}
