//! Error catalog and configuration errors.
//!
//! Every error surfaced by strun carries a stable code so CI logs can be
//! grepped and remediation documented per code.
//!
//! # Error Code Ranges
//!
//! | Range      | Category    | Description                               |
//! |------------|-------------|-------------------------------------------|
//! | E001-E099  | Config      | Suites file and environment configuration |
//! | E200-E299  | Scheduling  | Suite/configuration consistency           |
//! | E500-E599  | Internal    | Scheduler invariant violations            |

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Subsystem an error code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Config,
    Scheduling,
    Internal,
}

/// Stable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    ConfigRead,
    ConfigParse,
    ConfigUnsupportedFormat,
    ConflictingConstraint,
    MissingConstraint,
    DuplicateName,
    MissingLauncher,
    UnknownSuite,
    InvalidEnvironment,
    ConfigurationNotFound,
    NoEligibleConfiguration,
    DuplicateSuite,
    LaunchFailed,
    ProtocolViolation,
    InvalidTransition,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigRead => "E001",
            Self::ConfigParse => "E002",
            Self::ConfigUnsupportedFormat => "E003",
            Self::ConflictingConstraint => "E010",
            Self::MissingConstraint => "E011",
            Self::DuplicateName => "E012",
            Self::MissingLauncher => "E013",
            Self::UnknownSuite => "E014",
            Self::InvalidEnvironment => "E020",
            Self::ConfigurationNotFound => "E200",
            Self::NoEligibleConfiguration => "E201",
            Self::DuplicateSuite => "E202",
            Self::LaunchFailed => "E210",
            Self::ProtocolViolation => "E500",
            Self::InvalidTransition => "E501",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigRead
            | Self::ConfigParse
            | Self::ConfigUnsupportedFormat
            | Self::ConflictingConstraint
            | Self::MissingConstraint
            | Self::DuplicateName
            | Self::MissingLauncher
            | Self::UnknownSuite
            | Self::InvalidEnvironment => ErrorCategory::Config,
            Self::ConfigurationNotFound
            | Self::NoEligibleConfiguration
            | Self::DuplicateSuite
            | Self::LaunchFailed => ErrorCategory::Scheduling,
            Self::ProtocolViolation | Self::InvalidTransition => ErrorCategory::Internal,
        }
    }

    /// One-line remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::ConfigRead => "Check that the suites file exists and is readable.",
            Self::ConfigParse => "Fix the syntax error reported for the suites file.",
            Self::ConfigUnsupportedFormat => "Use a .toml, .yaml or .yml suites file.",
            Self::ConflictingConstraint => {
                "Declare either `requires` or `configuration` for the suite, not both."
            }
            Self::MissingConstraint => "Declare `requires` tags or a fixed `configuration`.",
            Self::DuplicateName => "Give every suite and configuration a unique name.",
            Self::MissingLauncher => "Set `[launcher] command` or a per-suite `command`.",
            Self::UnknownSuite => "Check the names passed with --only or STRUN_SUITES.",
            Self::InvalidEnvironment => "Fix the STRUN_* environment variables listed.",
            Self::ConfigurationNotFound => "Define the referenced configuration or fix its name.",
            Self::NoEligibleConfiguration => {
                "Add a configuration offering every tag the suite requires."
            }
            Self::DuplicateSuite => "Give every suite a unique name.",
            Self::LaunchFailed => "Check the launcher command and the suite work directory.",
            Self::ProtocolViolation | Self::InvalidTransition => {
                "This is a scheduler bug; please report it with the run log."
            }
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised while loading and validating a suites file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read suites file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("unsupported suites file format: {path}")]
    UnsupportedFormat { path: PathBuf },

    #[error("suite '{suite}' has both \"requires\" and \"configuration\" set")]
    ConflictingConstraint { suite: String },

    #[error("suite '{suite}' does not have \"requires\" or \"configuration\" specified")]
    MissingConstraint { suite: String },

    #[error("{kind} '{name}' is defined more than once")]
    DuplicateName { kind: &'static str, name: String },

    #[error("suite '{suite}' has no launcher command")]
    MissingLauncher { suite: String },

    #[error("unknown suite(s) selected: {}", names.join(", "))]
    UnknownSuite { names: Vec<String> },

    #[error("invalid environment configuration: {}", messages.join("; "))]
    InvalidEnvironment { messages: Vec<String> },
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } => ErrorCode::ConfigRead,
            Self::Toml { .. } | Self::Yaml { .. } => ErrorCode::ConfigParse,
            Self::UnsupportedFormat { .. } => ErrorCode::ConfigUnsupportedFormat,
            Self::ConflictingConstraint { .. } => ErrorCode::ConflictingConstraint,
            Self::MissingConstraint { .. } => ErrorCode::MissingConstraint,
            Self::DuplicateName { .. } => ErrorCode::DuplicateName,
            Self::MissingLauncher { .. } => ErrorCode::MissingLauncher,
            Self::UnknownSuite { .. } => ErrorCode::UnknownSuite,
            Self::InvalidEnvironment { .. } => ErrorCode::InvalidEnvironment,
        }
    }
}
