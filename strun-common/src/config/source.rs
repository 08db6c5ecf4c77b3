//! Source tracking for layered configuration values.

use serde::Serialize;

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigSource {
    /// Built-in default.
    Default,
    /// The suites file.
    File,
    /// An environment variable.
    Environment { var: String },
    /// A command-line flag.
    Cli,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::File => write!(f, "suites file"),
            Self::Environment { var } => write!(f, "env {var}"),
            Self::Cli => write!(f, "command line"),
        }
    }
}

/// A value paired with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> Sourced<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    pub fn default_value(value: T) -> Self {
        Self::new(value, ConfigSource::Default)
    }

    pub fn from_env(value: T, var: impl Into<String>) -> Self {
        Self::new(value, ConfigSource::Environment { var: var.into() })
    }

    pub fn from_file(value: T) -> Self {
        Self::new(value, ConfigSource::File)
    }

    pub fn from_cli(value: T) -> Self {
        Self::new(value, ConfigSource::Cli)
    }

    /// Replace this value when a higher-precedence layer provides one.
    #[must_use]
    pub fn override_with(self, other: Option<Sourced<T>>) -> Self {
        other.unwrap_or(self)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        Sourced {
            value: f(self.value),
            source: self.source,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}
