//! Test helpers shared across strun crates.

pub mod log;

pub use log::{TestGuard, TestLogEntry, TestPhase, init_global_test_logging};
