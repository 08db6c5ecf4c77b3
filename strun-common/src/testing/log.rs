//! Structured test logging for CI debugging.
//!
//! Every test that opens with `let _guard = test_guard!();` gets a JSONL
//! file under `target/test-logs/` recording start, free-form messages and
//! the pass/fail verdict. Logging is enabled with `STRUN_TEST_LOGGING=1`
//! or when `CI` is set; otherwise the guard is a no-op.

use crate::config::EnvParser;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, Once};
use std::time::Instant;

/// Test execution phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPhase {
    Setup,
    Execute,
    Verify,
    Teardown,
}

impl std::fmt::Display for TestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Setup => "setup",
            Self::Execute => "execute",
            Self::Verify => "verify",
            Self::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

/// One line of a test log file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestLogEntry {
    pub timestamp: String,
    pub test_name: String,
    pub phase: TestPhase,
    pub message: String,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

static GLOBAL_LOGGING_INIT: Once = Once::new();

/// Install a test-writer subscriber once per process.
///
/// The filter comes from `STRUN_TEST_LOG_LEVEL` (default `info`) and applies
/// to the strun crates only.
pub fn init_global_test_logging() {
    GLOBAL_LOGGING_INIT.call_once(|| {
        let level = std::env::var("STRUN_TEST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let filter =
            tracing_subscriber::EnvFilter::try_new(format!("strun={level},strun_common={level}"))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(filter)
            .compact()
            .try_init();
    });
}

fn test_log_dir() -> PathBuf {
    if let Ok(target_dir) = std::env::var("CARGO_TARGET_DIR") {
        return PathBuf::from(target_dir).join("test-logs");
    }
    let mut cwd = std::env::current_dir().unwrap_or_default();
    loop {
        let target = cwd.join("target");
        if target.is_dir() {
            return target.join("test-logs");
        }
        if !cwd.pop() {
            return PathBuf::from("target/test-logs");
        }
    }
}

struct TestLogger {
    test_name: String,
    started: Instant,
    file: Option<Mutex<std::fs::File>>,
}

impl TestLogger {
    fn for_test(test_name: &str) -> Self {
        let dir = test_log_dir();
        let safe_name = test_name.replace("::", "_").replace(['/', '\\'], "_");
        let file = std::fs::create_dir_all(&dir)
            .and_then(|()| std::fs::File::create(dir.join(format!("{safe_name}.jsonl"))))
            .ok()
            .map(Mutex::new);
        let logger = Self {
            test_name: test_name.to_string(),
            started: Instant::now(),
            file,
        };
        logger.write(TestPhase::Setup, "TEST START", None);
        logger
    }

    fn write(&self, phase: TestPhase, message: &str, data: Option<serde_json::Value>) {
        let entry = TestLogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            test_name: self.test_name.clone(),
            phase,
            message: message.to_string(),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            data,
        };
        if let Some(file) = &self.file
            && let Ok(mut f) = file.lock()
            && let Ok(json) = serde_json::to_string(&entry)
        {
            let _ = writeln!(f, "{json}");
        }
        tracing::info!(
            test = %self.test_name,
            phase = %entry.phase,
            elapsed_ms = entry.elapsed_ms,
            "{}",
            entry.message
        );
    }
}

/// Logs TEST PASS on drop, or TEST FAIL when dropped during a panic.
pub struct TestGuard {
    inner: Option<TestLogger>,
}

impl TestGuard {
    pub fn new(test_name: &str) -> Self {
        let inner = Self::is_enabled().then(|| {
            init_global_test_logging();
            TestLogger::for_test(test_name)
        });
        Self { inner }
    }

    fn is_enabled() -> bool {
        Self::enabled_by(&mut EnvParser::new(), std::env::var_os("CI").is_some())
    }

    /// `STRUN_TEST_LOGGING` decides when set to a boolean; otherwise CI does.
    fn enabled_by(env: &mut EnvParser, ci: bool) -> bool {
        env.get_bool("TEST_LOGGING", ci).value
    }

    pub fn log(&self, phase: TestPhase, message: impl AsRef<str>) {
        if let Some(logger) = &self.inner {
            logger.write(phase, message.as_ref(), None);
        }
    }

    pub fn log_with_data(&self, phase: TestPhase, message: impl AsRef<str>, data: serde_json::Value) {
        if let Some(logger) = &self.inner {
            logger.write(phase, message.as_ref(), Some(data));
        }
    }
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        if let Some(logger) = self.inner.take() {
            if std::thread::panicking() {
                logger.write(TestPhase::Verify, "TEST FAIL", None);
            } else {
                logger.write(TestPhase::Verify, "TEST PASS", None);
            }
        }
    }
}

/// Create a [`TestGuard`] named after the enclosing test function.
#[macro_export]
macro_rules! test_guard {
    () => {{
        fn _f() {}
        fn _type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = _type_name_of(_f);
        let name = name.strip_suffix("::_f").unwrap_or(name);
        let name = name.rsplit("::").next().unwrap_or(name);
        $crate::testing::TestGuard::new(name)
    }};
}
