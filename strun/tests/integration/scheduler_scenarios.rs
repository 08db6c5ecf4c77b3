use std::sync::{Arc, Mutex};
use strun::{
    Scheduler, SchedulerError, SchedulerOptions, SortedOrder, SuiteCompletion, SuiteExit,
    SuiteOrder, SuiteState,
};
use strun_common::{Constraint, EnvId, ErrorCode, test_guard};

use crate::common::{config, init_test_logging, suite};

fn options(order: SuiteOrder) -> SchedulerOptions {
    SchedulerOptions {
        order,
        ..SchedulerOptions::default()
    }
}

#[test]
fn two_suites_share_tag_but_never_a_configuration() {
    let _guard = test_guard!();
    init_test_logging();

    let (s1, h1) = suite("s1", Constraint::tags(["x"]));
    let (s2, h2) = suite("s2", Constraint::tags(["x"]));
    let (s3, h3) = suite("s3", Constraint::tags(["x"]));
    let configs = vec![config("c1", "env-1", &["x"]), config("c2", "env-2", &["x"])];
    let mut scheduler = Scheduler::new(vec![s1, s2, s3], configs, SchedulerOptions::default())
        .unwrap()
        .with_configuration_order(SortedOrder);

    let report = scheduler.tick().unwrap();
    assert_eq!(report.admitted.len(), 2);
    assert_eq!(report.waiting, ["s3"]);
    let first = h1.started_on().unwrap();
    let second = h2.started_on().unwrap();
    assert_ne!(first, second);
    assert!(!h3.is_started());
    assert_eq!(scheduler.pool().len(), 2);

    h1.succeed();
    let report = scheduler.tick().unwrap();
    // Admission runs before reclamation, so s3 still waits in this tick.
    assert_eq!(report.waiting, ["s3"]);
    assert_eq!(report.reclaimed, ["s1"]);
    assert!(h1.is_terminated());
    assert!(!scheduler.pool().is_locked(&EnvId::new("env-1")));

    let report = scheduler.tick().unwrap();
    assert_eq!(report.admitted.len(), 1);
    assert_eq!(h3.started_on(), Some(first));
}

#[test]
fn fixed_suite_waits_for_holder_to_release() {
    let _guard = test_guard!();
    let (holder, holder_handle) = suite("t", Constraint::fixed("c"));
    let (waiter, waiter_handle) = suite("s", Constraint::fixed("c"));
    let configs = vec![config("c", "env-c", &[]), config("other", "env-o", &["y"])];
    let mut scheduler =
        Scheduler::new(vec![holder, waiter], configs, options(SuiteOrder::Insertion)).unwrap();

    for _ in 0..3 {
        let report = scheduler.tick().unwrap();
        assert_eq!(report.waiting, ["s"]);
        assert_eq!(
            scheduler.suite("s").map(|s| s.state()),
            Some(SuiteState::Pending)
        );
    }
    assert!(!waiter_handle.is_started());

    holder_handle.succeed();
    scheduler.tick().unwrap();
    assert!(scheduler.suite("t").is_none());

    let report = scheduler.tick().unwrap();
    assert_eq!(report.admitted.len(), 1);
    assert_eq!(report.admitted[0].suite, "s");
    assert_eq!(waiter_handle.started_on().as_deref(), Some("c"));
}

#[test]
fn failing_handler_does_not_block_release_or_admission() {
    let _guard = test_guard!();
    let (s1, h1) = suite("s1", Constraint::fixed("c1"));
    let (s2, h2) = suite("s2", Constraint::fixed("c1"));
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    let mut scheduler = Scheduler::new(
        vec![s1, s2],
        vec![config("c1", "env-1", &[])],
        SchedulerOptions::default(),
    )
    .unwrap()
    .with_completion_handler(move |c: &SuiteCompletion| -> anyhow::Result<()> {
        sink.lock().unwrap().push(c.suite.clone());
        anyhow::bail!("report collection failed for {}", c.suite)
    });

    scheduler.tick().unwrap();
    h1.finish(SuiteExit::Failed { code: Some(1) });
    let report = scheduler.tick().unwrap();
    assert_eq!(report.reclaimed, ["s1"]);
    assert!(scheduler.pool().is_empty());

    scheduler.tick().unwrap();
    assert_eq!(h2.started_on().as_deref(), Some("c1"));
    h2.succeed();
    scheduler.tick().unwrap();

    assert!(scheduler.is_finished());
    assert_eq!(*calls.lock().unwrap(), ["s1", "s2"]);
    assert!(!scheduler.summary().is_success());
    assert_eq!(scheduler.summary().exit_code(), 1);
}

#[test]
fn unknown_fixed_configuration_fails_before_anything_runs() {
    let _guard = test_guard!();
    let (good, good_handle) = suite("good", Constraint::tags(["x"]));
    let (bad, _) = suite("bad", Constraint::fixed("nope"));

    let err = Scheduler::new(
        vec![good, bad],
        vec![config("c1", "env-1", &["x"])],
        SchedulerOptions::default(),
    )
    .unwrap_err();

    assert!(matches!(err, SchedulerError::Match(_)));
    assert_eq!(err.code(), ErrorCode::ConfigurationNotFound);
    assert!(!good_handle.is_started());
}

#[test]
fn configurations_sharing_an_environment_exclude_each_other() {
    let _guard = test_guard!();
    let (a, ha) = suite("a", Constraint::fixed("left"));
    let (b, hb) = suite("b", Constraint::fixed("right"));
    let configs = vec![
        config("left", "shared-box", &[]),
        config("right", "shared-box", &[]),
    ];
    let mut scheduler = Scheduler::new(vec![a, b], configs, SchedulerOptions::default()).unwrap();

    let report = scheduler.tick().unwrap();
    assert_eq!(report.admitted.len(), 1);
    assert_eq!(report.waiting, ["b"]);
    assert!(!hb.is_started());

    ha.succeed();
    scheduler.tick().unwrap();
    scheduler.tick().unwrap();
    assert_eq!(hb.started_on().as_deref(), Some("right"));
}

#[test]
fn fixed_first_order_protects_pinned_suites() {
    let _guard = test_guard!();
    let configs = || vec![config("gpu", "env-gpu", &["x"])];

    let (greedy, greedy_handle) = suite("greedy", Constraint::tags(["x"]));
    let (pinned, pinned_handle) = suite("pinned", Constraint::fixed("gpu"));
    let mut scheduler =
        Scheduler::new(vec![greedy, pinned], configs(), options(SuiteOrder::FixedFirst)).unwrap();
    scheduler.tick().unwrap();
    assert!(pinned_handle.is_started());
    assert!(!greedy_handle.is_started());

    let (greedy, greedy_handle) = suite("greedy", Constraint::tags(["x"]));
    let (pinned, pinned_handle) = suite("pinned", Constraint::fixed("gpu"));
    let mut scheduler =
        Scheduler::new(vec![greedy, pinned], configs(), options(SuiteOrder::Insertion)).unwrap();
    scheduler.tick().unwrap();
    assert!(greedy_handle.is_started());
    assert!(!pinned_handle.is_started());
}

#[test]
fn state_sequence_follows_lifecycle() {
    let _guard = test_guard!();
    let (s, handle) = suite("s", Constraint::tags(["x"]));
    let mut scheduler = Scheduler::new(
        vec![s],
        vec![config("c1", "env-1", &["x"])],
        SchedulerOptions::default(),
    )
    .unwrap();

    let mut observed = vec![SuiteState::Pending];
    let report = scheduler.tick().unwrap();
    observed.extend(report.transitions.iter().map(|t| t.to));
    assert_eq!(
        scheduler.suite("s").and_then(|s| s.binding()).map(|b| b.env.clone()),
        Some(EnvId::new("env-1"))
    );

    for _ in 0..2 {
        let report = scheduler.tick().unwrap();
        assert!(report.transitions.is_empty());
    }

    handle.succeed();
    let report = scheduler.tick().unwrap();
    observed.extend(report.transitions.iter().map(|t| t.to));

    assert_eq!(
        observed,
        [
            SuiteState::Pending,
            SuiteState::Assigned,
            SuiteState::Running,
            SuiteState::Terminated
        ]
    );
    assert_eq!(handle.start_count(), 1);
    assert!(scheduler.is_finished());
}

#[test]
fn summary_records_outcomes_in_termination_order() {
    let _guard = test_guard!();
    let (a, ha) = suite("a", Constraint::tags(["x"]));
    let (b, hb) = suite("b", Constraint::tags(["x"]));
    let configs = vec![config("c1", "env-1", &["x"]), config("c2", "env-2", &["x"])];
    let mut scheduler = Scheduler::new(vec![a, b], configs, SchedulerOptions::default()).unwrap();

    scheduler.tick().unwrap();
    hb.finish(SuiteExit::Failed { code: Some(3) });
    scheduler.tick().unwrap();
    ha.succeed();
    scheduler.tick().unwrap();

    let summary = scheduler.summary();
    let order: Vec<&str> = summary.suites.iter().map(|c| c.suite.as_str()).collect();
    assert_eq!(order, ["b", "a"]);
    let failed: Vec<&str> = summary.failed().map(|c| c.suite.as_str()).collect();
    assert_eq!(failed, ["b"]);
}

#[tokio::test]
async fn run_drives_suites_to_completion() {
    let _guard = test_guard!();
    let (a, ha) = suite("a", Constraint::tags(["x"]));
    let (b, hb) = suite("b", Constraint::tags(["x"]));
    ha.succeed();
    hb.succeed();
    let options = SchedulerOptions {
        interval: std::time::Duration::from_millis(1),
        ..SchedulerOptions::default()
    };

    let summary = Scheduler::new(vec![a, b], vec![config("only", "env-1", &["x"])], options)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.len(), 2);
    assert!(summary.is_success());
    assert!(ha.is_terminated() && hb.is_terminated());
}
