//! Common types used across strun components.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier of an execution environment.
///
/// Two configurations that share an identifier describe the same physical
/// environment and can never be held at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvId(pub String);

impl EnvId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EnvId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named, tagged environment a suite can run in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfiguration {
    /// Unique configuration name.
    pub name: String,
    /// Environment identifier used for mutual exclusion.
    pub env: EnvId,
    /// Capability tags offered by this configuration.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl EnvironmentConfiguration {
    pub fn new(name: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env: EnvId::new(env),
            tags: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Whether every tag in `required` is offered by this configuration.
    pub fn offers(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.tags)
    }
}

/// Placement requirement declared by a suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// Run only on the named configuration.
    Fixed(String),
    /// Run on any configuration offering all of these tags.
    Tags(BTreeSet<String>),
}

impl Constraint {
    pub fn fixed(name: impl Into<String>) -> Self {
        Self::Fixed(name.into())
    }

    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Tags(tags.into_iter().map(Into::into).collect())
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed(_))
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(name) => write!(f, "configuration={name}"),
            Self::Tags(tags) => {
                let joined: Vec<&str> = tags.iter().map(String::as_str).collect();
                write!(f, "requires=[{}]", joined.join(", "))
            }
        }
    }
}

/// Scheduling view of one test suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteDefinition {
    /// Unique suite name.
    pub name: String,
    /// Where the suite may run.
    pub constraint: Constraint,
    /// Launcher argv. Empty when the suite is driven by an in-process runnable.
    #[serde(default)]
    pub command: Vec<String>,
    /// Free-form suite properties forwarded to the launcher.
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl SuiteDefinition {
    pub fn new(name: impl Into<String>, constraint: Constraint) -> Self {
        Self {
            name: name.into(),
            constraint,
            command: Vec::new(),
            properties: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}
