//! Outcome of a complete scheduler run.

use crate::completion::SuiteCompletion;
use serde::Serialize;
use tracing::{error, info};

/// Per-suite outcomes in termination order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub suites: Vec<SuiteCompletion>,
}

impl RunSummary {
    pub fn push(&mut self, completion: SuiteCompletion) {
        self.suites.push(completion);
    }

    pub fn len(&self) -> usize {
        self.suites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }

    pub fn get(&self, suite: &str) -> Option<&SuiteCompletion> {
        self.suites.iter().find(|c| c.suite == suite)
    }

    /// Suites whose run did not exit successfully.
    pub fn failed(&self) -> impl Iterator<Item = &SuiteCompletion> {
        self.suites.iter().filter(|c| !c.exit.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    /// Process exit code for the driver: 0 if every suite succeeded, else 1.
    pub fn exit_code(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn log(&self) {
        for completion in &self.suites {
            info!(
                suite = %completion.suite,
                configuration = %completion.configuration,
                env = %completion.environment,
                duration_secs = completion.duration().num_seconds(),
                exit = %completion.exit,
                "Suite finished"
            );
        }
        let failed: Vec<&SuiteCompletion> = self.failed().collect();
        if failed.is_empty() {
            info!(suites = self.len(), "All test suites passed");
            return;
        }
        error!(failed = failed.len(), total = self.len(), "Failed test suites:");
        for completion in failed {
            error!(suite = %completion.suite, exit = %completion.exit, "  failed");
        }
    }
}
