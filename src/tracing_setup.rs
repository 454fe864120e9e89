//! Log output for the scanner.
//!
//! One `tracing-subscriber` fmt layer in the chosen [`OutputFormat`], filtered by
//! `RUST_LOG` or, failing that, the configured level. The decode worker runs on
//! a named thread, so thread names are on by default.
//!
//! # Example
//! ```no_run
//! use rust_scan::{config::ScanConfig, tracing_setup};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScanConfig::load()?;
//! tracing_setup::init_from_config(&config)?;
//! tracing::info!("Scanner ready");
//! # Ok(())
//! # }
//! ```

use crate::config::ScanConfig;
use crate::error::{ScanError, ScanResult};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

/// Line layout of emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Multi-line, coloured; for a developer at a terminal.
    Pretty,
    /// One plain line per event.
    Compact,
    /// One JSON object per event.
    Json,
}

impl FromStr for OutputFormat {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(OutputFormat::Pretty),
            "compact" => Ok(OutputFormat::Compact),
            "json" => Ok(OutputFormat::Json),
            other => Err(ScanError::Configuration(format!(
                "Invalid log format '{other}'. Must be one of: pretty, compact, json"
            ))),
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level used when `RUST_LOG` is not set.
    pub level: Level,
    /// Line layout.
    pub format: OutputFormat,
    /// Tag events with their source location.
    pub with_file_and_line: bool,
    /// Tag events with the emitting thread's name.
    pub with_thread_names: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Compact,
            with_file_and_line: false,
            with_thread_names: true,
        }
    }
}

impl TracingConfig {
    /// Settings for the level named in `[application]`.
    pub fn from_scan_config(config: &ScanConfig) -> ScanResult<Self> {
        Ok(Self {
            level: parse_log_level(&config.application.log_level)?,
            ..Default::default()
        })
    }

    /// Replace the line layout.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = fmt::layer()
            .with_file(self.with_file_and_line)
            .with_line_number(self.with_file_and_line)
            .with_thread_names(self.with_thread_names);
        match self.format {
            OutputFormat::Pretty => base.pretty().boxed(),
            OutputFormat::Compact => base.compact().with_ansi(false).boxed(),
            OutputFormat::Json => base.json().with_ansi(false).boxed(),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(self.level).into())
            .from_env_lossy()
    }
}

/// Install the global subscriber for the level in `config`.
pub fn init_from_config(config: &ScanConfig) -> ScanResult<()> {
    init(TracingConfig::from_scan_config(config)?)
}

/// Install the global subscriber.
///
/// Does nothing if one is already installed, so tests and embedders may call it freely.
pub fn init(config: TracingConfig) -> ScanResult<()> {
    if tracing::dispatcher::has_been_set() {
        tracing::debug!("Global subscriber already installed");
        return Ok(());
    }
    let layer = config.fmt_layer().with_filter(config.env_filter());
    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|err| ScanError::Configuration(format!("Failed to initialize tracing: {err}")))
}

fn parse_log_level(level: &str) -> ScanResult<Level> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(ScanError::Configuration(format!(
            "Invalid log level '{level}'. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}
