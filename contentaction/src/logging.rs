//! src/logging.rs
//! ============================================================================
//! # Logging: JSON-lines file log plus optional stderr output
//!
//! Installs the global `tracing` subscriber once per process:
//! - a JSON layer writing through a rolling, non-blocking file appender
//! - an optional compact stderr layer (the CLI's `-v` output)
//!
//! Both layers share one level filter built from `RUST_LOG` and the
//! configured level. Keep the returned [`WorkerGuard`] alive until exit so
//! buffered lines get flushed.

use std::{
    path::{Component, Path, PathBuf},
    str::FromStr,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use compact_str::CompactString;
use directories::ProjectDirs;
use serde::Deserialize;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Layer, filter::Directive, fmt::time::ChronoUtc, layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub log_dir: PathBuf,

    pub log_file_prefix: CompactString,

    /// `info`, `debug`, or any `EnvFilter` directive such as `contentaction=trace`.
    pub log_level: CompactString,

    pub rotation: LogRotation,

    pub max_log_files: usize,

    /// Mirror events to stderr in compact form.
    pub stderr: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Never,

    Hourly,

    Daily,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let log_dir = ProjectDirs::from("org", "contentaction", "contentaction")
            .map(|dirs| dirs.data_local_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("./logs"));

        Self {
            log_dir,
            log_file_prefix: CompactString::const_new("contentaction"),
            log_level: CompactString::const_new("info"),
            rotation: LogRotation::Daily,
            max_log_files: 7,
            stderr: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Logger already initialized")]
    AlreadyInitialized,

    #[error("Invalid log directory: {0}")]
    InvalidLogDirectory(String),

    #[error("Failed to create log directory: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

static INITIALIZED: AtomicBool = AtomicBool::new(false);

pub struct LoggerBuilder {
    config: LoggerConfig,
}

impl LoggerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: LoggerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: LoggerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: &str) -> Self {
        self.config.log_level = CompactString::new(level);
        self
    }

    #[must_use]
    pub const fn with_stderr(mut self, stderr: bool) -> Self {
        self.config.stderr = stderr;
        self
    }

    pub fn build(self) -> Result<WorkerGuard> {
        validate_config(&self.config)?;

        if INITIALIZED.swap(true, Ordering::AcqRel) {
            return Err(LoggingError::AlreadyInitialized.into());
        }

        let installed = self.install();
        if installed.is_err() {
            INITIALIZED.store(false, Ordering::Release);
        }
        installed
    }

    fn install(&self) -> Result<WorkerGuard> {
        let config = &self.config;

        std::fs::create_dir_all(&config.log_dir).map_err(LoggingError::from)?;

        let rotation = match config.rotation {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
        };

        let file_appender = RollingFileAppender::builder()
            .rotation(rotation)
            .filename_prefix(config.log_file_prefix.as_str())
            .filename_suffix("jsonl")
            .max_log_files(config.max_log_files.max(1))
            .build(&config.log_dir)
            .context("Failed to create file appender")?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(non_blocking)
            .with_filter(make_filter(&config.log_level)?);

        let stderr_layer = config.stderr.then(|| {
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr)
        });

        tracing_subscriber::registry()
            .with(json_layer)
            .with(stderr_layer.with_filter(make_filter(&config.log_level)?))
            .try_init()
            .context("Failed to install global tracing subscriber")?;

        Ok(guard)
    }
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn make_filter(level: &str) -> Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive(Directive::from_str(level).context("Invalid log level in config")?))
}

fn validate_config(config: &LoggerConfig) -> Result<()> {
    if config.log_file_prefix.trim().is_empty() {
        return Err(
            LoggingError::ConfigError("Log file prefix must not be empty".to_string()).into(),
        );
    }

    validate_log_directory(&config.log_dir)?;
    Ok(())
}

fn validate_log_directory(path: &Path) -> Result<()> {
    if path.components().count() == 0 {
        return Err(LoggingError::InvalidLogDirectory("Empty path".to_string()).into());
    }

    if path.components().any(|c| c == Component::ParentDir) {
        return Err(LoggingError::InvalidLogDirectory(format!(
            "Parent directory components are not allowed: {}",
            path.display()
        ))
        .into());
    }

    Ok(())
}

pub fn init_logging_with_config(config: LoggerConfig) -> Result<WorkerGuard> {
    LoggerBuilder::new().with_config(config).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory_validation() {
        assert!(validate_log_directory(Path::new("")).is_err());
        assert!(validate_log_directory(Path::new("/var/log/../etc")).is_err());
        assert!(validate_log_directory(Path::new("/tmp/contentaction/logs")).is_ok());
    }

    #[test]
    fn test_config_from_toml_with_defaults() {
        let config: LoggerConfig =
            toml::from_str("log_level = \"debug\"\nrotation = \"hourly\"\n").unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.rotation, LogRotation::Hourly);
        assert_eq!(config.log_file_prefix, "contentaction");
        assert!(!config.stderr);
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let config = LoggerConfig {
            log_file_prefix: CompactString::const_new(" "),
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_level_rejected() {
        assert!(make_filter("contentaction=loudest").is_err());
        assert!(make_filter("contentaction=debug").is_ok());
    }
}
