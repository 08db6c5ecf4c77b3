//! Admission and reclamation loop.
//!
//! Each tick first tries to admit every pending suite onto a free eligible
//! environment, then reclaims every suite whose run was already in progress
//! when the tick began and has since finished. A suite admitted in a tick is
//! never reclaimed in that same tick.
//!
//! The loop is single threaded. Suite runs proceed out of process, so the
//! only waiting done here is the sleep between ticks.

use crate::completion::{CompletionHandler, SuiteCompletion};
use crate::matcher::{ConstraintMatcher, MatchError};
use crate::ordering::{ConfigurationOrder, RandomOrder, SuiteOrder};
use crate::pool::{EnvironmentPool, PoolError};
use crate::runnable::{SuiteExit, SuiteRunnable};
use crate::summary::RunSummary;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use strun_common::{EnvId, EnvironmentConfiguration, ErrorCode, SuiteDefinition};
use thiserror::Error;
use tracing::{debug, error, info, warn};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// Suite state
// ============================================================================

/// Scheduling state of one suite. States only ever advance to their successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteState {
    Pending,
    Assigned,
    Running,
    Terminated,
}

impl SuiteState {
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Assigned),
            Self::Assigned => Some(Self::Running),
            Self::Running => Some(Self::Terminated),
            Self::Terminated => None,
        }
    }

    /// Whether a suite in this state holds its environment.
    pub fn holds_environment(self) -> bool {
        matches!(self, Self::Assigned | Self::Running)
    }
}

impl std::fmt::Display for SuiteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Running => "running",
            Self::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

/// Configuration a suite was admitted onto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub configuration: String,
    pub env: EnvId,
}

/// A suite tracked by the scheduler.
pub struct TestSuite {
    definition: SuiteDefinition,
    runnable: Box<dyn SuiteRunnable>,
    state: SuiteState,
    binding: Option<Binding>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl TestSuite {
    pub fn new(definition: SuiteDefinition, runnable: impl SuiteRunnable + 'static) -> Self {
        Self::boxed(definition, Box::new(runnable))
    }

    pub fn boxed(definition: SuiteDefinition, runnable: Box<dyn SuiteRunnable>) -> Self {
        Self {
            definition,
            runnable,
            state: SuiteState::Pending,
            binding: None,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &SuiteDefinition {
        &self.definition
    }

    pub fn state(&self) -> SuiteState {
        self.state
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    fn advance(&mut self, to: SuiteState) -> Result<(), SchedulerError> {
        if self.state.successor() != Some(to) {
            return Err(SchedulerError::InvalidTransition {
                suite: self.definition.name.clone(),
                from: self.state,
                to,
            });
        }
        debug!(suite = %self.definition.name, from = %self.state, %to, "Suite state changed");
        self.state = to;
        Ok(())
    }
}

impl std::fmt::Debug for TestSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSuite")
            .field("name", &self.definition.name)
            .field("state", &self.state)
            .field("binding", &self.binding)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Options, reports and errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Sleep between ticks.
    pub interval: Duration,
    /// Order in which suites are considered within a tick.
    pub order: SuiteOrder,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            order: SuiteOrder::default(),
        }
    }
}

/// A suite admitted during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub suite: String,
    pub configuration: String,
    pub environment: EnvId,
}

/// A state change observed during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub suite: String,
    pub to: SuiteState,
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub admitted: Vec<Admission>,
    /// Pending suites that found no free eligible environment.
    pub waiting: Vec<String>,
    /// Suites terminated and released.
    pub reclaimed: Vec<String>,
    /// Every state change in the order it happened.
    pub transitions: Vec<Transition>,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Protocol(#[from] PoolError),

    #[error("suite '{suite}' is defined more than once")]
    DuplicateSuite { suite: String },

    #[error("configuration '{configuration}' is defined more than once")]
    DuplicateConfiguration { configuration: String },

    #[error("suite '{suite}' cannot move from {from} to {to}")]
    InvalidTransition {
        suite: String,
        from: SuiteState,
        to: SuiteState,
    },

    #[error("suite '{suite}' finished without a bound configuration")]
    MissingBinding { suite: String },
}

impl SchedulerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Match(err) => err.code(),
            Self::Protocol(err) => err.code(),
            Self::DuplicateSuite { .. } => ErrorCode::DuplicateSuite,
            Self::DuplicateConfiguration { .. } => ErrorCode::DuplicateName,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::MissingBinding { .. } => ErrorCode::ProtocolViolation,
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct Scheduler {
    suites: Vec<TestSuite>,
    matcher: ConstraintMatcher,
    pool: EnvironmentPool,
    order: Box<dyn ConfigurationOrder>,
    handler: Option<Box<dyn CompletionHandler>>,
    options: SchedulerOptions,
    summary: RunSummary,
    ticks: u64,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("suites", &self.suites)
            .field("pool", &self.pool)
            .field("options", &self.options)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Validate suites against configurations and arrange them for scheduling.
    ///
    /// Fails before anything runs if a name is duplicated, a fixed
    /// configuration is unknown, or a tag set is offered by no configuration.
    pub fn new(
        mut suites: Vec<TestSuite>,
        configurations: Vec<EnvironmentConfiguration>,
        options: SchedulerOptions,
    ) -> Result<Self, SchedulerError> {
        let mut seen = HashSet::new();
        for configuration in &configurations {
            if !seen.insert(configuration.name.as_str()) {
                return Err(SchedulerError::DuplicateConfiguration {
                    configuration: configuration.name.clone(),
                });
            }
        }
        let matcher = ConstraintMatcher::new(configurations);

        let mut seen = HashSet::new();
        for suite in &suites {
            if !seen.insert(suite.name()) {
                return Err(SchedulerError::DuplicateSuite {
                    suite: suite.name().to_string(),
                });
            }
            matcher.matches(suite.name(), &suite.definition.constraint)?;
        }

        options
            .order
            .apply(&mut suites, |suite| &suite.definition.constraint);

        for suite in &suites {
            match serde_json::to_string(&suite.definition) {
                Ok(json) => info!(suite = %suite.name(), definition = %json, "Test suite"),
                Err(err) => warn!(suite = %suite.name(), error = %err, "Failed to serialize suite"),
            }
        }
        info!(
            suites = suites.len(),
            configurations = matcher.len(),
            order = ?options.order,
            "Scheduler ready"
        );

        Ok(Self {
            suites,
            matcher,
            pool: EnvironmentPool::new(),
            order: Box::new(RandomOrder::new()),
            handler: None,
            options,
            summary: RunSummary::default(),
            ticks: 0,
        })
    }

    /// Replace the random tie-break among eligible configurations.
    #[must_use]
    pub fn with_configuration_order(mut self, order: impl ConfigurationOrder + 'static) -> Self {
        self.order = Box::new(order);
        self
    }

    #[must_use]
    pub fn with_completion_handler(mut self, handler: impl CompletionHandler + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn pool(&self) -> &EnvironmentPool {
        &self.pool
    }

    pub fn matcher(&self) -> &ConstraintMatcher {
        &self.matcher
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Suites not yet terminated, in scheduling order.
    pub fn suites(&self) -> &[TestSuite] {
        &self.suites
    }

    pub fn suite(&self, name: &str) -> Option<&TestSuite> {
        self.suites.iter().find(|suite| suite.name() == name)
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// True once every suite has terminated.
    pub fn is_finished(&self) -> bool {
        self.suites.is_empty()
    }

    /// Eligible configuration names per suite, in scheduling order.
    pub fn eligibility(&self) -> Vec<(String, Vec<String>)> {
        self.suites
            .iter()
            .map(|suite| {
                let names = self
                    .matcher
                    .matches(suite.name(), &suite.definition.constraint)
                    .map(|eligible| eligible.keys().map(|name| name.to_string()).collect())
                    .unwrap_or_default();
                (suite.name().to_string(), names)
            })
            .collect()
    }

    /// Run one admission pass followed by one reclamation pass.
    pub fn tick(&mut self) -> Result<TickReport, SchedulerError> {
        self.ticks += 1;
        let mut report = TickReport::default();

        for suite in &self.suites {
            debug!(
                tick = self.ticks,
                suite = %suite.name(),
                state = %suite.state,
                started = suite.started_at.is_some(),
                "Working set"
            );
        }

        // Only suites already running before admission are eligible for reclamation.
        let running_before: Vec<bool> = self
            .suites
            .iter()
            .map(|suite| suite.state == SuiteState::Running)
            .collect();

        for index in 0..self.suites.len() {
            if self.suites[index].state == SuiteState::Pending {
                self.admit(index, &mut report)?;
            }
        }

        for (index, was_running) in running_before.into_iter().enumerate() {
            if was_running {
                self.reclaim(index, &mut report)?;
            }
        }

        self.suites
            .retain(|suite| suite.state != SuiteState::Terminated);

        if !report.admitted.is_empty() || !report.reclaimed.is_empty() {
            info!(
                tick = self.ticks,
                admitted = report.admitted.len(),
                reclaimed = report.reclaimed.len(),
                waiting = report.waiting.len(),
                remaining = self.suites.len(),
                "Scheduler tick"
            );
        }
        Ok(report)
    }

    fn admit(&mut self, index: usize, report: &mut TickReport) -> Result<(), SchedulerError> {
        let suite = &mut self.suites[index];
        let eligible = self
            .matcher
            .matches(&suite.definition.name, &suite.definition.constraint)?;

        let mut names: Vec<&str> = eligible
            .keys()
            .copied()
            .filter(|name| {
                suite
                    .binding
                    .as_ref()
                    .is_none_or(|binding| binding.configuration == *name)
            })
            .collect();
        self.order.arrange(&mut names);

        let Some(configuration) = names
            .into_iter()
            .filter_map(|name| eligible.get(name).copied())
            .find(|configuration| self.pool.try_lock(&configuration.env))
        else {
            info!(
                suite = %suite.definition.name,
                constraint = %suite.definition.constraint,
                "No eligible environment free, suite stays pending"
            );
            report.waiting.push(suite.definition.name.clone());
            return Ok(());
        };

        suite.binding = Some(Binding {
            configuration: configuration.name.clone(),
            env: configuration.env.clone(),
        });
        advance(suite, SuiteState::Assigned, report)?;
        info!(
            suite = %suite.definition.name,
            configuration = %configuration.name,
            env = %configuration.env,
            "Suite assigned"
        );

        if let Err(err) = suite.runnable.start(configuration) {
            // Observed as finished on the next reclamation pass.
            warn!(
                suite = %suite.definition.name,
                code = %err.code(),
                error = %err,
                "Suite failed to start"
            );
        }
        advance(suite, SuiteState::Running, report)?;
        suite.started_at = Some(Utc::now());

        report.admitted.push(Admission {
            suite: suite.definition.name.clone(),
            configuration: configuration.name.clone(),
            environment: configuration.env.clone(),
        });
        Ok(())
    }

    fn reclaim(&mut self, index: usize, report: &mut TickReport) -> Result<(), SchedulerError> {
        let suite = &mut self.suites[index];
        if suite.runnable.is_running() {
            return Ok(());
        }

        advance(suite, SuiteState::Terminated, report)?;
        let ended_at = Utc::now();
        suite.ended_at = Some(ended_at);

        if let Err(err) = suite.runnable.terminate() {
            warn!(suite = %suite.definition.name, error = %err, "Suite cleanup failed");
        }

        let binding = suite
            .binding
            .clone()
            .ok_or_else(|| SchedulerError::MissingBinding {
                suite: suite.definition.name.clone(),
            })?;
        let completion = SuiteCompletion {
            suite: suite.definition.name.clone(),
            configuration: binding.configuration,
            environment: binding.env.clone(),
            started_at: suite.started_at.unwrap_or(ended_at),
            ended_at,
            exit: suite
                .runnable
                .exit_status()
                .unwrap_or(SuiteExit::Failed { code: None }),
        };
        info!(
            suite = %completion.suite,
            configuration = %completion.configuration,
            exit = %completion.exit,
            "Suite finished"
        );

        if let Some(handler) = self.handler.as_mut()
            && let Err(err) = handler.on_suite_completed(&completion)
        {
            error!(suite = %completion.suite, error = %format!("{err:#}"), "Completion handler failed");
        }

        self.pool.release(&binding.env)?;
        debug!(suite = %completion.suite, env = %binding.env, "Environment released");

        report.reclaimed.push(completion.suite.clone());
        self.summary.push(completion);
        Ok(())
    }

    /// Tick until every suite has terminated, sleeping `interval` between ticks.
    pub async fn run(mut self) -> Result<RunSummary, SchedulerError> {
        info!(
            suites = self.suites.len(),
            interval_ms = self.options.interval.as_millis() as u64,
            "Scheduler started"
        );
        loop {
            self.tick()?;
            if self.is_finished() {
                break;
            }
            tokio::time::sleep(self.options.interval).await;
        }
        info!(
            ticks = self.ticks,
            suites = self.summary.len(),
            failed = self.summary.failed().count(),
            "Scheduler finished"
        );
        Ok(self.summary)
    }
}

fn advance(
    suite: &mut TestSuite,
    to: SuiteState,
    report: &mut TickReport,
) -> Result<(), SchedulerError> {
    suite.advance(to)?;
    report.transitions.push(Transition {
        suite: suite.definition.name.clone(),
        to,
    });
    Ok(())
}
