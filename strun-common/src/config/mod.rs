//! Configuration system for strun.
//!
//! - Suites file loading and structural validation
//! - `STRUN_*` environment variable parsing with type safety
//! - Source tracking so the effective value of each setting can be explained

pub mod env;
pub mod source;
pub mod suites;

pub use env::{EnvError, EnvParser};
pub use source::{ConfigSource, Sourced};
pub use suites::{
    FileFormat, LauncherConfig, SchedulerSection, SuiteCatalog, SuiteEntry, SuitesFile,
    load_suites,
};
