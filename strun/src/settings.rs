//! Run settings layered from CLI flags, `STRUN_*` variables, the suites
//! file and built-in defaults, in that order of precedence.

use crate::ordering::SuiteOrder;
use crate::scheduler::SchedulerOptions;
use clap::ValueEnum;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strun_common::config::env::expand_path;
use strun_common::{ConfigError, EnvError, EnvParser, SchedulerSection, Sourced};
use tracing::debug;

pub const DEFAULT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_WORK_DIR: &str = "suite-envs";
pub const DEFAULT_REPORTS_DIR: &str = "xunit-reports";
/// Ticks are at least a second apart so the loop never spins.
pub const MIN_INTERVAL_SECS: u64 = 1;
pub const MAX_INTERVAL_SECS: u64 = 3600;

/// Values given on the command line. `None` means not given.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub interval_secs: Option<u64>,
    pub order: Option<SuiteOrder>,
    pub seed: Option<u64>,
    pub work_dir: Option<PathBuf>,
    pub reports_dir: Option<PathBuf>,
    pub only: Vec<String>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSettings {
    pub interval_secs: Sourced<u64>,
    pub order: Sourced<SuiteOrder>,
    pub seed: Option<Sourced<u64>>,
    pub work_dir: Sourced<PathBuf>,
    pub reports_dir: Sourced<PathBuf>,
    pub only: Sourced<Vec<String>>,
}

impl RunSettings {
    pub fn resolve(
        overrides: RunOverrides,
        file: &SchedulerSection,
        env: &mut EnvParser,
    ) -> Result<Self, ConfigError> {
        let mut messages = Vec::new();
        let file_interval =
            checked_interval("scheduler.interval_secs", file.interval_secs, &mut messages);
        let cli_interval = checked_interval("--interval", overrides.interval_secs, &mut messages);
        let interval_secs = Sourced::default_value(DEFAULT_INTERVAL_SECS)
            .override_with(file_interval.map(Sourced::from_file))
            .override_with(env.get_optional_u64_range(
                "INTERVAL_SECS",
                MIN_INTERVAL_SECS,
                MAX_INTERVAL_SECS,
            ))
            .override_with(cli_interval.map(Sourced::from_cli));

        let order = Sourced::default_value(SuiteOrder::FixedFirst)
            .override_with(file.optimize.map(|optimize| {
                Sourced::from_file(if optimize {
                    SuiteOrder::FixedFirst
                } else {
                    SuiteOrder::Insertion
                })
            }))
            .override_with(env.get_optional_parsed("ORDER", "insertion or fixed-first", |raw| {
                SuiteOrder::from_str(raw, true).ok()
            }))
            .override_with(overrides.order.map(Sourced::from_cli));

        let env_seed = env.get_optional_u64_range("SEED", 0, u64::MAX);
        let seed = overrides.seed.map(Sourced::from_cli).or(env_seed);

        let work_dir = layered_path(
            DEFAULT_WORK_DIR,
            file.work_dir.as_deref(),
            env.get_optional_path("WORK_DIR"),
            overrides.work_dir,
        );
        let reports_dir = layered_path(
            DEFAULT_REPORTS_DIR,
            file.reports_dir.as_deref(),
            env.get_optional_path("REPORTS_DIR"),
            overrides.reports_dir,
        );

        let mut only = env.get_string_list("SUITES", Vec::new());
        if !overrides.only.is_empty() {
            only = Sourced::from_cli(overrides.only);
        }

        messages.extend(env.take_errors().iter().map(EnvError::to_string));
        if !messages.is_empty() {
            return Err(ConfigError::InvalidEnvironment { messages });
        }

        let settings = Self {
            interval_secs,
            order,
            seed,
            work_dir,
            reports_dir,
            only,
        };
        debug!(settings = ?settings, "Resolved run settings");
        Ok(settings)
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            interval: Duration::from_secs(self.interval_secs.value),
            order: self.order.value,
        }
    }
}

fn checked_interval(label: &str, secs: Option<u64>, messages: &mut Vec<String>) -> Option<u64> {
    let secs = secs?;
    if (MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&secs) {
        return Some(secs);
    }
    messages.push(format!(
        "{label}: value {secs} out of range [{MIN_INTERVAL_SECS}, {MAX_INTERVAL_SECS}]"
    ));
    None
}

fn layered_path(
    default: &str,
    file: Option<&Path>,
    env: Option<Sourced<PathBuf>>,
    cli: Option<PathBuf>,
) -> Sourced<PathBuf> {
    Sourced::default_value(PathBuf::from(default))
        .override_with(file.map(|path| Sourced::from_file(expand_path(&path.to_string_lossy()))))
        .override_with(env)
        .override_with(cli.map(Sourced::from_cli))
}
