//! Constraint matching between suites and environment configurations.

use std::collections::BTreeMap;
use strun_common::{Constraint, EnvironmentConfiguration, ErrorCode};
use thiserror::Error;

/// A suite whose constraint cannot be satisfied by the known configurations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("suite '{suite}' requires configuration '{configuration}' which is not defined")]
    ConfigurationNotFound { suite: String, configuration: String },

    #[error(
        "cannot find a matching configuration for suite '{suite}' (requires: {})",
        required.join(", ")
    )]
    NoEligibleConfiguration { suite: String, required: Vec<String> },
}

impl MatchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ConfigurationNotFound { .. } => ErrorCode::ConfigurationNotFound,
            Self::NoEligibleConfiguration { .. } => ErrorCode::NoEligibleConfiguration,
        }
    }
}

/// Eligible configurations for one suite, keyed by configuration name.
pub type Eligible<'a> = BTreeMap<&'a str, &'a EnvironmentConfiguration>;

/// Computes which configurations may host a suite.
#[derive(Debug, Clone, Default)]
pub struct ConstraintMatcher {
    configurations: BTreeMap<String, EnvironmentConfiguration>,
}

impl ConstraintMatcher {
    /// Build a matcher. A later configuration with an already seen name
    /// replaces the earlier one; callers reject duplicates beforehand.
    pub fn new(configurations: impl IntoIterator<Item = EnvironmentConfiguration>) -> Self {
        Self {
            configurations: configurations
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&EnvironmentConfiguration> {
        self.configurations.get(name)
    }

    /// All configurations in name order.
    pub fn configurations(&self) -> impl Iterator<Item = &EnvironmentConfiguration> {
        self.configurations.values()
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    /// Configurations eligible to host `suite` under `constraint`.
    ///
    /// A fixed constraint yields exactly the named configuration whatever its
    /// tags. A tag constraint yields every configuration offering all of the
    /// required tags. The result is never empty.
    pub fn matches(&self, suite: &str, constraint: &Constraint) -> Result<Eligible<'_>, MatchError> {
        match constraint {
            Constraint::Fixed(name) => {
                let (name, configuration) = self.configurations.get_key_value(name).ok_or_else(|| {
                    MatchError::ConfigurationNotFound {
                        suite: suite.to_string(),
                        configuration: name.clone(),
                    }
                })?;
                Ok(BTreeMap::from([(name.as_str(), configuration)]))
            }
            Constraint::Tags(required) => {
                let eligible: Eligible<'_> = self
                    .configurations
                    .iter()
                    .filter(|(_, configuration)| configuration.offers(required))
                    .map(|(name, configuration)| (name.as_str(), configuration))
                    .collect();
                if eligible.is_empty() {
                    return Err(MatchError::NoEligibleConfiguration {
                        suite: suite.to_string(),
                        required: required.iter().cloned().collect(),
                    });
                }
                Ok(eligible)
            }
        }
    }
}
