//! Environment variable parsing with type safety.
//!
//! Reads `STRUN_*` variables with validation, error collection, and source
//! tracking. Values are read through a lookup function so callers (and
//! tests) can substitute the process environment.

use super::source::Sourced;
use std::path::PathBuf;
use thiserror::Error;

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Type-safe environment variable parser.
///
/// Collects errors during parsing so all issues can be reported at once.
pub struct EnvParser {
    prefix: &'static str,
    lookup: Lookup,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Create a parser over the process environment with the `STRUN_` prefix.
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Create a parser over a custom variable source.
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            prefix: "STRUN_",
            lookup: Box::new(lookup),
            errors: Vec::new(),
        }
    }

    /// Take ownership of errors.
    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn read(&self, var_name: &str) -> Option<String> {
        (self.lookup)(var_name)
    }

    /// Get an optional string; empty values count as unset.
    pub fn get_optional_string(&mut self, name: &str) -> Option<Sourced<String>> {
        let var_name = self.var_name(name);
        self.read(&var_name)
            .filter(|value| !value.is_empty())
            .map(|value| Sourced::from_env(value, var_name))
    }

    /// Get a boolean value with default.
    ///
    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off, "" (for false)
    pub fn get_bool(&mut self, name: &str, default: bool) -> Sourced<bool> {
        let var_name = self.var_name(name);
        let Some(value) = self.read(&var_name) else {
            return Sourced::default_value(default);
        };
        match parse_bool(&value) {
            Some(parsed) => Sourced::from_env(parsed, var_name),
            None => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "boolean (true/false/1/0/yes/no)".to_string(),
                    value,
                });
                Sourced::default_value(default)
            }
        }
    }

    /// Get an optional u64 within `min..=max`.
    ///
    /// Unset variables yield `None`; invalid ones record an error and also
    /// yield `None` so the next configuration layer applies.
    pub fn get_optional_u64_range(&mut self, name: &str, min: u64, max: u64) -> Option<Sourced<u64>> {
        let var_name = self.var_name(name);
        let value = self.read(&var_name).filter(|v| !v.trim().is_empty())?;
        match value.trim().parse::<u64>() {
            Ok(n) if (min..=max).contains(&n) => Some(Sourced::from_env(n, var_name)),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var_name,
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                None
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "unsigned 64-bit integer".to_string(),
                    value,
                });
                None
            }
        }
    }

    /// Get an optional value converted by `parse`.
    ///
    /// A value `parse` rejects records an `InvalidValue` error naming
    /// `expected` and yields `None`.
    pub fn get_optional_parsed<T>(
        &mut self,
        name: &str,
        expected: &str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Option<Sourced<T>> {
        let raw = self.get_optional_string(name)?;
        match parse(raw.value.trim()) {
            Some(parsed) => Some(raw.map(|_| parsed)),
            None => {
                let var = self.var_name(name);
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected: expected.to_string(),
                    value: raw.value,
                });
                None
            }
        }
    }

    /// Get an optional path, expanding `~` and `$VAR`.
    pub fn get_optional_path(&mut self, name: &str) -> Option<Sourced<PathBuf>> {
        self.get_optional_string(name)
            .map(|sourced| sourced.map(|raw| expand_path(&raw)))
    }

    /// Get a log level (trace, debug, info, warn, error, off).
    pub fn get_log_level(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        let Some(value) = self.read(&var_name) else {
            return Sourced::default_value(default.to_string());
        };
        match parse_log_level(&value) {
            Some(level) => Sourced::from_env(level, var_name),
            None => {
                self.errors.push(EnvError::InvalidLogLevel {
                    var: var_name,
                    value,
                });
                Sourced::default_value(default.to_string())
            }
        }
    }

    /// Get a comma or whitespace separated list.
    pub fn get_string_list(&mut self, name: &str, default: Vec<String>) -> Sourced<Vec<String>> {
        let var_name = self.var_name(name);
        match self.read(&var_name) {
            Some(value) => Sourced::from_env(parse_string_list(&value), var_name),
            None => Sourced::default_value(default),
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn parse_log_level(value: &str) -> Option<String> {
    let lower = value.trim().to_lowercase();
    VALID_LOG_LEVELS.contains(&lower.as_str()).then_some(lower)
}

fn parse_string_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Expand `~` and environment variables in a path, leaving it untouched
/// when expansion fails.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(raw),
    }
}
