//! Suites file loading and structural validation.
//!
//! A suites file declares the environment configurations available to a run
//! and the suites to schedule onto them. TOML and YAML are accepted; both
//! use arrays so that suite order in the file is the scheduling order.
//!
//! Only structural problems are rejected here. Whether a fixed configuration
//! exists, or whether a tag set can be satisfied at all, is decided by the
//! scheduler when it is constructed.

use crate::errors::ConfigError;
use crate::types::{Constraint, EnvironmentConfiguration, SuiteDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk format of a suites file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Toml,
    Yaml,
}

impl FileFormat {
    /// Detect the format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// Default launcher shared by every suite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherConfig {
    #[serde(default)]
    pub command: Vec<String>,
}

/// Optional scheduler settings carried in the suites file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSection {
    /// Seconds between scheduler ticks.
    pub interval_secs: Option<u64>,
    /// Schedule fixed-configuration suites ahead of tag-matched ones.
    pub optimize: Option<bool>,
    /// Root directory for per-suite work directories.
    pub work_dir: Option<PathBuf>,
    /// Directory collected reports are copied into.
    pub reports_dir: Option<PathBuf>,
}

/// A suite as written in the suites file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteEntry {
    pub name: String,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub configuration: Option<String>,
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl SuiteEntry {
    fn constraint(&self) -> Result<Constraint, ConfigError> {
        match (self.configuration.as_deref(), self.requires.is_empty()) {
            (Some(_), false) => Err(ConfigError::ConflictingConstraint {
                suite: self.name.clone(),
            }),
            (Some(name), true) if !name.is_empty() => Ok(Constraint::fixed(name)),
            (_, false) => Ok(Constraint::tags(self.requires.iter().cloned())),
            _ => Err(ConfigError::MissingConstraint {
                suite: self.name.clone(),
            }),
        }
    }
}

/// Raw contents of a suites file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuitesFile {
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub launcher: LauncherConfig,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub configurations: Vec<EnvironmentConfiguration>,
    #[serde(default)]
    pub suites: Vec<SuiteEntry>,
}

impl SuitesFile {
    /// Parse file contents in the given format.
    pub fn parse(content: &str, format: FileFormat, origin: &Path) -> Result<Self, ConfigError> {
        match format {
            FileFormat::Toml => toml::from_str(content).map_err(|source| ConfigError::Toml {
                path: origin.to_path_buf(),
                source,
            }),
            FileFormat::Yaml => {
                serde_yaml_ng::from_str(content).map_err(|source| ConfigError::Yaml {
                    path: origin.to_path_buf(),
                    source,
                })
            }
        }
    }

    /// Check structure and resolve every suite's constraint and launcher.
    pub fn validate(self) -> Result<SuiteCatalog, ConfigError> {
        let mut seen = HashSet::new();
        for configuration in &self.configurations {
            if !seen.insert(configuration.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "configuration",
                    name: configuration.name.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        let mut suites = Vec::with_capacity(self.suites.len());
        for entry in self.suites {
            if !seen.insert(entry.name.clone()) {
                return Err(ConfigError::DuplicateName {
                    kind: "suite",
                    name: entry.name,
                });
            }
            let constraint = entry.constraint()?;
            let command = entry
                .command
                .clone()
                .filter(|command| !command.is_empty())
                .unwrap_or_else(|| self.launcher.command.clone());
            if command.is_empty() {
                return Err(ConfigError::MissingLauncher { suite: entry.name });
            }
            suites.push(SuiteDefinition {
                name: entry.name,
                constraint,
                command,
                properties: entry.properties,
            });
        }

        Ok(SuiteCatalog {
            variables: self.variables,
            scheduler: self.scheduler,
            configurations: self.configurations,
            suites,
        })
    }
}

/// Validated suites and configurations ready for scheduling.
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteCatalog {
    pub variables: serde_json::Map<String, serde_json::Value>,
    pub scheduler: SchedulerSection,
    pub configurations: Vec<EnvironmentConfiguration>,
    pub suites: Vec<SuiteDefinition>,
}

impl SuiteCatalog {
    /// Keep only the named suites, preserving file order.
    ///
    /// An empty selection keeps every suite. Unknown names are rejected.
    pub fn select(&mut self, names: &[String]) -> Result<(), ConfigError> {
        if names.is_empty() {
            return Ok(());
        }
        let known: HashSet<&str> = self.suites.iter().map(|s| s.name.as_str()).collect();
        let unknown: Vec<String> = names
            .iter()
            .filter(|name| !known.contains(name.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(ConfigError::UnknownSuite { names: unknown });
        }
        self.suites.retain(|suite| names.contains(&suite.name));
        debug!(selected = self.suites.len(), "Filtered suites by selection");
        Ok(())
    }
}

/// Read, parse and validate a suites file.
pub fn load_suites(path: &Path) -> Result<SuiteCatalog, ConfigError> {
    let format = FileFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let catalog = SuitesFile::parse(&content, format, path)?.validate()?;
    debug!(
        path = %path.display(),
        suites = catalog.suites.len(),
        configurations = catalog.configurations.len(),
        "Loaded suites file"
    );
    Ok(catalog)
}
