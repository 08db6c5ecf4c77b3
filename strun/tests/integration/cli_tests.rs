use std::path::Path;
use std::process::{Command, Output};
use strun_common::test_guard;
use tempfile::TempDir;

fn strun(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_strun"))
        .args(args)
        .current_dir(dir)
        .env_remove("STRUN_SUITES")
        .env_remove("STRUN_INTERVAL_SECS")
        .env_remove("STRUN_WORK_DIR")
        .env_remove("STRUN_REPORTS_DIR")
        .env("STRUN_LOG_LEVEL", "debug")
        .output()
        .expect("failed to run strun")
}

fn write_suites(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

const VALID: &str = r#"
[launcher]
command = ["sh", "-c", "echo '<testsuite/>' > \"$STRUN_REPORTS_DIR/$STRUN_SUITE_NAME.xml\""]

[[configurations]]
name = "c1"
env = "env-1"
tags = ["x"]

[[configurations]]
name = "c2"
env = "env-2"
tags = ["x", "y"]

[[suites]]
name = "smoke"
requires = ["x"]

[[suites]]
name = "pinned"
configuration = "c1"

[[suites]]
name = "wide"
requires = ["y"]
"#;

#[test]
fn version_flag_prints_version() {
    let _guard = test_guard!();
    let dir = TempDir::new().unwrap();
    let output = strun(dir.path(), &["--version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn validate_prints_eligible_configurations() {
    let _guard = test_guard!();
    let dir = TempDir::new().unwrap();
    let suites = write_suites(&dir, "suites.toml", VALID);

    let output = strun(dir.path(), &["validate", "--suites", &suites]);
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("smoke: c1, c2"), "{stdout}");
    assert!(stdout.contains("pinned: c1"), "{stdout}");
    assert!(stdout.contains("wide: c2"), "{stdout}");
}

#[test]
fn validate_rejects_unsatisfiable_suite() {
    let _guard = test_guard!();
    let dir = TempDir::new().unwrap();
    let suites = write_suites(
        &dir,
        "suites.toml",
        r#"
[launcher]
command = ["true"]

[[configurations]]
name = "c1"
env = "env-1"
tags = ["x"]

[[suites]]
name = "needs-gpu"
requires = ["gpu"]
"#,
    );

    let output = strun(dir.path(), &["validate", "--suites", &suites]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("needs-gpu"));
}

#[test]
fn validate_rejects_conflicting_constraint() {
    let _guard = test_guard!();
    let dir = TempDir::new().unwrap();
    let suites = write_suites(
        &dir,
        "suites.yaml",
        r#"
launcher:
  command: ["true"]
configurations:
  - name: c1
    env: env-1
suites:
  - name: both
    requires: [x]
    configuration: c1
"#,
    );

    let output = strun(dir.path(), &["validate", "--suites", &suites]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("E010"));
}

#[test]
fn list_shows_suites_and_configurations() {
    let _guard = test_guard!();
    let dir = TempDir::new().unwrap();
    let suites = write_suites(&dir, "suites.toml", VALID);

    let output = strun(dir.path(), &["list", "--suites", &suites]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("c2 (env: env-2) [x, y]"), "{stdout}");
    assert!(stdout.contains("pinned (configuration=c1)"), "{stdout}");
}

#[cfg(unix)]
#[test]
fn run_collects_reports_and_succeeds() {
    let _guard = test_guard!();
    let dir = TempDir::new().unwrap();
    let suites = write_suites(&dir, "suites.toml", VALID);

    let output = strun(
        dir.path(),
        &["run", "--suites", &suites, "--interval", "1", "--seed", "1"],
    );
    assert_eq!(output.status.code(), Some(0), "{output:?}");

    let reports = dir.path().join("xunit-reports");
    for name in ["smoke.xml", "pinned.xml", "wide.xml"] {
        assert!(reports.join(name).is_file(), "missing report {name}");
    }
    assert!(dir.path().join("suite-envs").join("smoke").join("suite.log").is_file());
}

#[cfg(unix)]
#[test]
fn run_exits_one_when_a_suite_fails() {
    let _guard = test_guard!();
    let dir = TempDir::new().unwrap();
    let suites = write_suites(
        &dir,
        "suites.toml",
        r#"
[launcher]
command = ["sh", "-c", "mkdir -p \"$STRUN_REPORTS_DIR\"; exit 0"]

[[configurations]]
name = "c1"
env = "env-1"

[[suites]]
name = "passes"
configuration = "c1"

[[suites]]
name = "fails"
configuration = "c1"
command = ["sh", "-c", "exit 3"]
"#,
    );

    let output = strun(
        dir.path(),
        &["run", "--suites", &suites, "--interval", "1", "--reports-dir", "out"],
    );
    assert_eq!(output.status.code(), Some(1), "{output:?}");
    assert!(String::from_utf8_lossy(&output.stderr).contains("fails"));
    assert!(dir.path().join("out").is_dir());
}

#[cfg(unix)]
#[test]
fn run_only_selected_suites() {
    let _guard = test_guard!();
    let dir = TempDir::new().unwrap();
    let suites = write_suites(&dir, "suites.toml", VALID);

    let output = strun(
        dir.path(),
        &["run", "--suites", &suites, "--interval", "1", "--only", "wide"],
    );
    assert_eq!(output.status.code(), Some(0), "{output:?}");
    let reports: Vec<String> = std::fs::read_dir(dir.path().join("xunit-reports"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(reports, ["wide.xml"]);
}

#[test]
fn run_rejects_unknown_selection() {
    let _guard = test_guard!();
    let dir = TempDir::new().unwrap();
    let suites = write_suites(&dir, "suites.toml", VALID);

    let output = strun(dir.path(), &["run", "--suites", &suites, "--only", "ghost"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(!dir.path().join("suite-envs").exists());
}

#[test]
fn run_rejects_zero_interval() {
    let _guard = test_guard!();
    let dir = TempDir::new().unwrap();
    let suites = write_suites(&dir, "suites.toml", VALID);

    let output = strun(dir.path(), &["run", "--suites", &suites, "--interval", "0"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--interval"));
    assert!(!dir.path().join("suite-envs").exists());
}
