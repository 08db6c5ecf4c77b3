//! Suite execution: the runnable contract and its process-backed implementation.
//!
//! A runnable is driven exclusively by the scheduler: `start` once, then
//! `is_running` polled every tick until it reports `false`, then `terminate`.
//! None of these calls may block for long; a runnable that blocks stalls the
//! scheduling of every other suite.

use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use strun_common::{EnvironmentConfiguration, ErrorCode, SuiteDefinition};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const ENV_SUITE_NAME: &str = "STRUN_SUITE_NAME";
pub const ENV_CONFIGURATION: &str = "STRUN_CONFIGURATION";
pub const ENV_ENVIRONMENT_ID: &str = "STRUN_ENVIRONMENT_ID";
pub const ENV_CONFIGURATION_TAGS: &str = "STRUN_CONFIGURATION_TAGS";
pub const ENV_WORK_DIR: &str = "STRUN_WORK_DIR";
pub const ENV_REPORTS_DIR: &str = "STRUN_REPORTS_DIR";
pub const ENV_SUITE: &str = "STRUN_SUITE";
pub const ENV_VARIABLES: &str = "STRUN_VARIABLES";

const REPORTS_SUBDIR: &str = "reports";
const LOG_FILE: &str = "suite.log";

/// How a suite's external run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SuiteExit {
    Success,
    /// Non-zero exit. `code` is absent when the process was killed by a signal.
    Failed { code: Option<i32> },
    /// The run could not be launched at all.
    LaunchFailed { reason: String },
}

impl SuiteExit {
    pub fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            Self::Success
        } else {
            Self::Failed {
                code: status.code(),
            }
        }
    }

    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            Self::Success
        } else {
            Self::Failed { code: Some(code) }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for SuiteExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "exit code 0"),
            Self::Failed { code: Some(code) } => write!(f, "exit code {code}"),
            Self::Failed { code: None } => write!(f, "terminated by signal"),
            Self::LaunchFailed { reason } => write!(f, "launch failed: {reason}"),
        }
    }
}

/// Errors from launching or cleaning up a suite run.
#[derive(Debug, Error)]
pub enum RunnableError {
    #[error("suite '{suite}' has an empty launcher command")]
    EmptyCommand { suite: String },

    #[error("failed to {action} for suite '{suite}': {source}")]
    Io {
        suite: String,
        action: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl RunnableError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::LaunchFailed
    }
}

/// One suite's external run.
pub trait SuiteRunnable: Send {
    /// Launch the run against `configuration` without waiting for it.
    ///
    /// After an `Err`, `is_running` must return `false` and `exit_status`
    /// must describe the failure.
    fn start(&mut self, configuration: &EnvironmentConfiguration) -> Result<(), RunnableError>;

    /// Whether the run is still observably in progress. Never blocks.
    fn is_running(&mut self) -> bool;

    /// Terminal status, once `is_running` has returned `false`.
    fn exit_status(&self) -> Option<SuiteExit>;

    /// Best-effort cleanup after the run finished. Errors are only logged.
    fn terminate(&mut self) -> Result<(), RunnableError>;
}

/// Runs a suite as a child process of the launcher command.
pub struct ProcessRunnable {
    suite: String,
    command: Vec<String>,
    properties: serde_json::Value,
    variables: Arc<serde_json::Value>,
    work_dir: PathBuf,
    child: Option<Child>,
    exit: Option<SuiteExit>,
}

impl ProcessRunnable {
    /// Prepare a runnable whose work directory is `<work_root>/<suite>`.
    ///
    /// The directory is made absolute against the current directory, since
    /// the child runs inside it and receives it through `STRUN_WORK_DIR`.
    pub fn new(
        definition: &SuiteDefinition,
        work_root: &Path,
        variables: Arc<serde_json::Value>,
    ) -> Self {
        let work_dir = work_root.join(&definition.name);
        let work_dir = std::path::absolute(&work_dir).unwrap_or(work_dir);
        Self {
            suite: definition.name.clone(),
            command: definition.command.clone(),
            properties: serde_json::Value::Object(definition.properties.clone()),
            variables,
            work_dir,
            child: None,
            exit: None,
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.work_dir.join(REPORTS_SUBDIR)
    }

    pub fn log_path(&self) -> PathBuf {
        self.work_dir.join(LOG_FILE)
    }

    fn io_error(&self, action: &'static str) -> impl FnOnce(std::io::Error) -> RunnableError + '_ {
        move |source| RunnableError::Io {
            suite: self.suite.clone(),
            action,
            source,
        }
    }

    fn open_log(&self) -> Result<File, RunnableError> {
        std::fs::create_dir_all(self.reports_dir()).map_err(self.io_error("create work directory"))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .map_err(self.io_error("open suite log"))
    }

    fn spawn(&self, configuration: &EnvironmentConfiguration) -> Result<Child, RunnableError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| RunnableError::EmptyCommand {
                suite: self.suite.clone(),
            })?;
        let log = self.open_log()?;
        let stderr = log.try_clone().map_err(self.io_error("open suite log"))?;
        let tags: Vec<&str> = configuration.tags.iter().map(String::as_str).collect();

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(stderr))
            .env(ENV_SUITE_NAME, &self.suite)
            .env(ENV_CONFIGURATION, &configuration.name)
            .env(ENV_ENVIRONMENT_ID, configuration.env.as_str())
            .env(ENV_CONFIGURATION_TAGS, tags.join(","))
            .env(ENV_WORK_DIR, &self.work_dir)
            .env(ENV_REPORTS_DIR, self.reports_dir())
            .env(ENV_SUITE, self.properties.to_string())
            .env(ENV_VARIABLES, self.variables.to_string());

        cmd.spawn().map_err(self.io_error("spawn launcher"))
    }
}

impl SuiteRunnable for ProcessRunnable {
    fn start(&mut self, configuration: &EnvironmentConfiguration) -> Result<(), RunnableError> {
        info!(
            suite = %self.suite,
            configuration = %configuration.name,
            work_dir = %self.work_dir.display(),
            "Starting suite"
        );
        match self.spawn(configuration) {
            Ok(child) => {
                debug!(suite = %self.suite, pid = child.id(), "Suite process spawned");
                self.child = Some(child);
                Ok(())
            }
            Err(err) => {
                error!(suite = %self.suite, error = %err, "Failed to start suite");
                self.exit = Some(SuiteExit::LaunchFailed {
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn is_running(&mut self) -> bool {
        if self.exit.is_some() {
            return false;
        }
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.exit = Some(SuiteExit::from_status(status));
                false
            }
            Err(err) => {
                warn!(suite = %self.suite, error = %err, "Failed to poll suite process");
                self.exit = Some(SuiteExit::Failed { code: None });
                false
            }
        }
    }

    fn exit_status(&self) -> Option<SuiteExit> {
        self.exit.clone()
    }

    fn terminate(&mut self) -> Result<(), RunnableError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(suite = %self.suite, ?status, "Suite process reaped");
                Ok(())
            }
            Ok(None) => {
                warn!(suite = %self.suite, pid = child.id(), "Killing suite process still running");
                child.kill().map_err(self.io_error("kill suite process"))?;
                // Returns promptly once the kill is delivered.
                let status = child.wait().map_err(self.io_error("reap suite process"))?;
                debug!(suite = %self.suite, ?status, "Suite process killed and reaped");
                self.exit.get_or_insert(SuiteExit::from_status(status));
                Ok(())
            }
            Err(err) => {
                let _ = child.kill();
                Err(self.io_error("poll suite process")(err))
            }
        }
    }
}

/// Remove a stale work root and create it empty.
pub fn reset_work_root(work_root: &Path) -> std::io::Result<()> {
    if work_root.exists() {
        info!(path = %work_root.display(), "Removing previous suite work directories");
        std::fs::remove_dir_all(work_root)?;
    }
    std::fs::create_dir_all(work_root)
}
