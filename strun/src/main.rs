//! strun - Suite Test Runner
//!
//! Loads a suites file, schedules every suite onto an exclusive environment
//! and exits non-zero if any suite failed.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use strun::{
    ProcessRunnable, RandomOrder, ReportCollector, RunOverrides, RunSettings, Scheduler,
    SchedulerError, SchedulerOptions, SuiteOrder, TestSuite, reset_work_root,
};
use strun_common::{
    ConfigError, EnvParser, ErrorCode, LogConfig, LogFormat, SuiteCatalog, init_logging,
    load_suites,
};
use tracing::{error, info};

/// Exit code for configuration and validation errors.
const EXIT_CONFIG_ERROR: u8 = 2;

#[derive(Parser)]
#[command(name = "strun")]
#[command(author, version, about = "Suite test runner - schedules test suites onto exclusive environments")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format (pretty or json)
    #[arg(long, global = true, env = "STRUN_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every suite to completion
    Run(RunArgs),

    /// Validate a suites file without running anything
    Validate {
        /// Suites file (.toml, .yaml or .yml)
        #[arg(short, long)]
        suites: PathBuf,
    },

    /// List suites and configurations
    List {
        /// Suites file (.toml, .yaml or .yml)
        #[arg(short, long)]
        suites: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Suites file (.toml, .yaml or .yml)
    #[arg(short, long)]
    suites: PathBuf,

    /// Seconds between scheduler ticks, 1 to 3600 [default: 30]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    interval: Option<u64>,

    /// Order in which suites are considered [default: fixed-first]
    #[arg(long, value_enum)]
    order: Option<SuiteOrder>,

    /// Seed for the configuration shuffle
    #[arg(long)]
    seed: Option<u64>,

    /// Root of per-suite work directories [default: suite-envs]
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Directory collected reports are copied into [default: xunit-reports]
    #[arg(long)]
    reports_dir: Option<PathBuf>,

    /// Only run these suites (comma separated)
    #[arg(long, value_delimiter = ',')]
    only: Vec<String>,
}

impl From<RunArgs> for RunOverrides {
    fn from(args: RunArgs) -> Self {
        Self {
            interval_secs: args.interval,
            order: args.order,
            seed: args.seed,
            work_dir: args.work_dir,
            reports_dir: args.reports_dir,
            only: args.only,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = match LogConfig::from_env("info") {
        Ok(config) => config.with_stderr(),
        Err(err) => {
            eprintln!("strun: {err}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    if let Some(format) = cli.log_format {
        log_config = log_config.with_format(format);
    }
    let _logging_guards = match init_logging(&log_config) {
        Ok(guards) => guards,
        Err(err) => {
            eprintln!("strun: {err}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match dispatch(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            match error_code(&err) {
                Some(code) => error!(
                    code = %code,
                    remediation = code.remediation(),
                    "{err:#}"
                ),
                None => error!("{err:#}"),
            }
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

async fn dispatch(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Run(args) => run(args).await,
        Commands::Validate { suites } => validate(&suites),
        Commands::List { suites } => list(&suites),
    }
}

fn error_code(err: &anyhow::Error) -> Option<ErrorCode> {
    if let Some(err) = err.downcast_ref::<ConfigError>() {
        return Some(err.code());
    }
    err.downcast_ref::<SchedulerError>().map(SchedulerError::code)
}

fn build_suites(catalog: &SuiteCatalog, work_root: &Path) -> Vec<TestSuite> {
    let variables = Arc::new(serde_json::Value::Object(catalog.variables.clone()));
    catalog
        .suites
        .iter()
        .map(|definition| {
            let runnable = ProcessRunnable::new(definition, work_root, Arc::clone(&variables));
            TestSuite::new(definition.clone(), runnable)
        })
        .collect()
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let suites_path = args.suites.clone();
    let mut catalog = load_suites(&suites_path)?;
    let settings = RunSettings::resolve(args.into(), &catalog.scheduler, &mut EnvParser::new())?;
    catalog.select(&settings.only.value)?;

    info!(
        suites_file = %suites_path.display(),
        suites = catalog.suites.len(),
        configurations = catalog.configurations.len(),
        interval_secs = settings.interval_secs.value,
        interval_source = %settings.interval_secs.source,
        order = ?settings.order.value,
        work_dir = %settings.work_dir.value.display(),
        reports_dir = %settings.reports_dir.value.display(),
        "Starting test run"
    );

    let work_root = settings.work_dir.value.clone();
    reset_work_root(&work_root)
        .with_context(|| format!("failed to prepare work directory {}", work_root.display()))?;
    let collector = ReportCollector::new(&work_root, &settings.reports_dir.value);
    collector.prepare()?;

    let suites = build_suites(&catalog, &work_root);
    let mut scheduler = Scheduler::new(suites, catalog.configurations, settings.scheduler_options())?
        .with_completion_handler(collector);
    if let Some(seed) = &settings.seed {
        info!(seed = seed.value, "Using seeded configuration shuffle");
        scheduler = scheduler.with_configuration_order(RandomOrder::seeded(seed.value));
    }

    let summary = scheduler.run().await?;
    summary.log();
    Ok(ExitCode::from(summary.exit_code()))
}

fn validate(path: &Path) -> Result<ExitCode> {
    let catalog = load_suites(path)?;
    let suites = build_suites(&catalog, Path::new(""));
    let scheduler = Scheduler::new(suites, catalog.configurations, SchedulerOptions::default())?;

    for (suite, configurations) in scheduler.eligibility() {
        println!("{suite}: {}", configurations.join(", "));
    }
    println!(
        "OK: {} suites, {} configurations",
        scheduler.suites().len(),
        scheduler.matcher().len()
    );
    Ok(ExitCode::SUCCESS)
}

fn list(path: &Path) -> Result<ExitCode> {
    let catalog = load_suites(path)?;

    println!("Configurations:");
    for configuration in &catalog.configurations {
        let tags: Vec<&str> = configuration.tags.iter().map(String::as_str).collect();
        println!(
            "  {} (env: {}) [{}]",
            configuration.name,
            configuration.env,
            tags.join(", ")
        );
    }
    println!("Suites:");
    for suite in &catalog.suites {
        println!("  {} ({})", suite.name, suite.constraint);
    }
    Ok(ExitCode::SUCCESS)
}
