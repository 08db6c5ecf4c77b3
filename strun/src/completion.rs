//! Suite completion events and the handlers that consume them.

use crate::runnable::SuiteExit;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use strun_common::EnvId;
use tracing::{debug, info};

const REPORT_EXTENSION: &str = "xml";

/// Emitted once per suite when its run has been observed to finish.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteCompletion {
    pub suite: String,
    pub configuration: String,
    pub environment: EnvId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub exit: SuiteExit,
}

impl SuiteCompletion {
    pub fn duration(&self) -> chrono::Duration {
        self.ended_at - self.started_at
    }
}

/// Reacts to finished suites. Called before the suite's environment is
/// released; an `Err` is logged by the scheduler and otherwise ignored.
pub trait CompletionHandler: Send {
    fn on_suite_completed(&mut self, completion: &SuiteCompletion) -> anyhow::Result<()>;
}

impl<F> CompletionHandler for F
where
    F: FnMut(&SuiteCompletion) -> anyhow::Result<()> + Send,
{
    fn on_suite_completed(&mut self, completion: &SuiteCompletion) -> anyhow::Result<()> {
        self(completion)
    }
}

/// Runs several handlers in order.
#[derive(Default)]
pub struct HandlerChain {
    handlers: Vec<Box<dyn CompletionHandler>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl CompletionHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl CompletionHandler for HandlerChain {
    /// Every handler runs even if an earlier one failed; the first error wins.
    fn on_suite_completed(&mut self, completion: &SuiteCompletion) -> anyhow::Result<()> {
        let mut first_error = None;
        for handler in &mut self.handlers {
            if let Err(err) = handler.on_suite_completed(completion)
                && first_error.is_none()
            {
                first_error = Some(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Copies each suite's XML reports into one shared directory.
#[derive(Debug, Clone)]
pub struct ReportCollector {
    work_root: PathBuf,
    reports_dir: PathBuf,
}

impl ReportCollector {
    pub fn new(work_root: impl Into<PathBuf>, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
            reports_dir: reports_dir.into(),
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Create the shared reports directory, removing reports of a previous run.
    pub fn prepare(&self) -> anyhow::Result<()> {
        if self.reports_dir.exists() {
            std::fs::remove_dir_all(&self.reports_dir).with_context(|| {
                format!("failed to clear reports dir {}", self.reports_dir.display())
            })?;
        }
        std::fs::create_dir_all(&self.reports_dir).with_context(|| {
            format!("failed to create reports dir {}", self.reports_dir.display())
        })?;
        debug!(path = %self.reports_dir.display(), "Reports directory ready");
        Ok(())
    }

    /// Copy `*.xml` files of one suite. Returns the copied file names.
    pub fn collect(&self, suite: &str) -> anyhow::Result<Vec<String>> {
        let source = self.work_root.join(suite).join("reports");
        let entries = std::fs::read_dir(&source)
            .with_context(|| format!("failed to read reports of suite '{suite}' in {}", source.display()))?;

        let mut copied = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some(REPORT_EXTENSION)
            {
                continue;
            }
            let Some(name) = path.file_name() else {
                continue;
            };
            std::fs::copy(&path, self.reports_dir.join(name))
                .with_context(|| format!("failed to copy report {}", path.display()))?;
            copied.push(name.to_string_lossy().into_owned());
        }
        copied.sort();
        Ok(copied)
    }
}

impl CompletionHandler for ReportCollector {
    fn on_suite_completed(&mut self, completion: &SuiteCompletion) -> anyhow::Result<()> {
        let copied = self.collect(&completion.suite)?;
        info!(
            suite = %completion.suite,
            reports = ?copied,
            destination = %self.reports_dir.display(),
            "Copied suite reports"
        );
        Ok(())
    }
}
