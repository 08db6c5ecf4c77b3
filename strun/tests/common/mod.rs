//! Shared fixtures for strun integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use strun::{RunnableError, SuiteExit, SuiteRunnable, TestSuite};
use strun_common::{Constraint, EnvironmentConfiguration, SuiteDefinition};
use tracing_subscriber::{EnvFilter, fmt};

pub fn init_test_logging() {
    let _ = fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env().add_directive("strun=debug".parse().unwrap()))
        .try_init();
}

#[derive(Debug, Default)]
struct FakeState {
    started_on: Option<String>,
    start_count: usize,
    exit: Option<SuiteExit>,
    terminated: bool,
}

/// A runnable whose lifetime is scripted through its [`FakeHandle`].
pub struct FakeRunnable {
    state: Arc<Mutex<FakeState>>,
}

/// Test-side view of a [`FakeRunnable`].
#[derive(Clone)]
pub struct FakeHandle {
    state: Arc<Mutex<FakeState>>,
}

impl FakeHandle {
    /// Make the run observably finished with `exit`.
    pub fn finish(&self, exit: SuiteExit) {
        self.state.lock().unwrap().exit = Some(exit);
    }

    pub fn succeed(&self) {
        self.finish(SuiteExit::Success);
    }

    pub fn started_on(&self) -> Option<String> {
        self.state.lock().unwrap().started_on.clone()
    }

    pub fn start_count(&self) -> usize {
        self.state.lock().unwrap().start_count
    }

    pub fn is_started(&self) -> bool {
        self.start_count() > 0
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().unwrap().terminated
    }
}

impl SuiteRunnable for FakeRunnable {
    fn start(&mut self, configuration: &EnvironmentConfiguration) -> Result<(), RunnableError> {
        let mut state = self.state.lock().unwrap();
        state.started_on = Some(configuration.name.clone());
        state.start_count += 1;
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        let state = self.state.lock().unwrap();
        state.start_count > 0 && state.exit.is_none()
    }

    fn exit_status(&self) -> Option<SuiteExit> {
        self.state.lock().unwrap().exit.clone()
    }

    fn terminate(&mut self) -> Result<(), RunnableError> {
        self.state.lock().unwrap().terminated = true;
        Ok(())
    }
}

pub fn fake() -> (FakeRunnable, FakeHandle) {
    let state = Arc::new(Mutex::new(FakeState::default()));
    (
        FakeRunnable {
            state: Arc::clone(&state),
        },
        FakeHandle { state },
    )
}

pub fn suite(name: &str, constraint: Constraint) -> (TestSuite, FakeHandle) {
    let (runnable, handle) = fake();
    (TestSuite::new(SuiteDefinition::new(name, constraint), runnable), handle)
}

pub fn config(name: &str, env: &str, tags: &[&str]) -> EnvironmentConfiguration {
    EnvironmentConfiguration::new(name, env).with_tags(tags.iter().copied())
}
