#[path = "../common/mod.rs"]
mod common;

mod cli_tests;
mod scheduler_properties;
mod scheduler_scenarios;
