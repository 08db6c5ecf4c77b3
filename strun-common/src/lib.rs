//! Shared types and utilities for the suite test runner.
//!
//! This crate holds everything the scheduler and its driver agree on:
//! the scheduling data model, the suites-file loader, environment
//! configuration parsing, logging setup, and the test logging helpers.

pub mod config;
pub mod errors;
pub mod logging;
pub mod testing;
pub mod types;

pub use config::{
    ConfigSource, EnvError, EnvParser, FileFormat, LauncherConfig, SchedulerSection,
    SuiteCatalog, SuiteEntry, SuitesFile, Sourced, load_suites,
};
pub use errors::{ConfigError, ErrorCategory, ErrorCode};
pub use logging::{LogConfig, LogFormat, LoggingError, LoggingGuards, init_logging};
pub use types::{Constraint, EnvId, EnvironmentConfiguration, SuiteDefinition};
