//! Logging setup shared by the strun binaries.
//!
//! Log output goes to stderr (human-readable or JSON) and optionally to a
//! JSON log file written through a non-blocking appender. The returned
//! [`LoggingGuards`] must be kept alive for the file writer to flush.

use crate::config::{EnvError, EnvParser, Sourced};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Output format for stderr logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected pretty or json)")),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `strun=debug,info`.
    pub level: String,
    pub format: LogFormat,
    /// Optional JSON log file.
    pub file: Option<PathBuf>,
    /// Whether to log to stderr.
    pub stderr: bool,
}

impl LogConfig {
    /// Build a configuration from `STRUN_LOG_LEVEL`, `STRUN_LOG_FORMAT` and
    /// `STRUN_LOG_FILE`.
    pub fn from_env(default_level: &str) -> Result<Self, LoggingError> {
        Self::from_parser(&mut EnvParser::new(), default_level)
    }

    /// Invalid variables are reported together instead of silently ignored.
    pub fn from_parser(parser: &mut EnvParser, default_level: &str) -> Result<Self, LoggingError> {
        let level = parser.get_log_level("LOG_LEVEL", default_level).into_value();
        let format = parser
            .get_optional_parsed("LOG_FORMAT", "pretty or json", |raw| raw.parse::<LogFormat>().ok())
            .map(Sourced::into_value)
            .unwrap_or_default();
        let file = parser.get_optional_path("LOG_FILE").map(Sourced::into_value);

        let errors = parser.take_errors();
        if !errors.is_empty() {
            return Err(LoggingError::Environment {
                messages: errors.iter().map(EnvError::to_string).collect(),
            });
        }
        Ok(Self {
            level,
            format,
            file,
            stderr: false,
        })
    }

    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    #[must_use]
    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }
}

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{directive}': {reason}")]
    Filter { directive: String, reason: String },

    #[error("failed to open log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid logging environment: {}", messages.join("; "))]
    Environment { messages: Vec<String> },

    #[error("global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Keeps background log writers alive.
#[must_use = "dropping the guards stops file logging"]
pub struct LoggingGuards {
    _file: Option<WorkerGuard>,
}

/// Install the global tracing subscriber described by `config`.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards, LoggingError> {
    let filter = EnvFilter::try_new(&config.level).map_err(|e| LoggingError::Filter {
        directive: config.level.clone(),
        reason: e.to_string(),
    })?;

    let (file_layer, file_guard) = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| LoggingError::File {
                    path: path.clone(),
                    source,
                })?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::File {
                    path: path.clone(),
                    source,
                })?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_current_span(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let pretty_layer = (config.stderr && config.format == LogFormat::Pretty)
        .then(|| fmt::layer().with_writer(std::io::stderr).with_target(false));
    let json_layer = (config.stderr && config.format == LogFormat::Json)
        .then(|| fmt::layer().json().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(pretty_layer)
        .with(json_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(LoggingGuards { _file: file_guard })
}
