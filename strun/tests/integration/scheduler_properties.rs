//! Randomized scheduling simulations checking the pool and lifecycle invariants.

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use strun::{RandomOrder, Scheduler, SchedulerOptions, SuiteOrder, SuiteState, TestSuite};
use strun_common::{Constraint, EnvId, EnvironmentConfiguration};

use crate::common::{FakeHandle, suite};

const TAGS: [&str; 3] = ["a", "b", "c"];

#[derive(Debug, Clone)]
struct ConfigSpec {
    env: usize,
    tags: Vec<bool>,
}

#[derive(Debug, Clone)]
struct SuiteSpec {
    /// Configuration the constraint is derived from.
    anchor: usize,
    fixed: bool,
    /// Which of the anchor's tags are required.
    keep: Vec<bool>,
    duration: u32,
}

fn config_spec() -> impl Strategy<Value = ConfigSpec> {
    (0usize..3, proptest::collection::vec(any::<bool>(), TAGS.len()))
        .prop_map(|(env, tags)| ConfigSpec { env, tags })
}

fn suite_spec() -> impl Strategy<Value = SuiteSpec> {
    (
        0usize..8,
        any::<bool>(),
        proptest::collection::vec(any::<bool>(), TAGS.len()),
        0u32..5,
    )
        .prop_map(|(anchor, fixed, keep, duration)| SuiteSpec {
            anchor,
            fixed,
            keep,
            duration,
        })
}

fn build_configs(specs: &[ConfigSpec]) -> Vec<EnvironmentConfiguration> {
    specs
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let tags = TAGS
                .iter()
                .zip(&spec.tags)
                .filter(|(_, on)| **on)
                .map(|(tag, _)| *tag);
            EnvironmentConfiguration::new(format!("c{i}"), format!("env-{}", spec.env))
                .with_tags(tags)
        })
        .collect()
}

/// Every generated constraint is satisfiable by its anchor configuration.
fn constraint_for(spec: &SuiteSpec, configs: &[EnvironmentConfiguration]) -> Constraint {
    let anchor = &configs[spec.anchor % configs.len()];
    if spec.fixed {
        return Constraint::fixed(anchor.name.clone());
    }
    let required: Vec<String> = anchor
        .tags
        .iter()
        .zip(&spec.keep)
        .filter(|(_, keep)| **keep)
        .map(|(tag, _)| tag.clone())
        .collect();
    if required.is_empty() {
        // An empty tag set is rejected when loading; pin instead.
        Constraint::fixed(anchor.name.clone())
    } else {
        Constraint::tags(required)
    }
}

fn active_bindings(scheduler: &Scheduler) -> Vec<EnvId> {
    scheduler
        .suites()
        .iter()
        .filter(|s| s.state().holds_environment())
        .filter_map(|s| s.binding().map(|b| b.env.clone()))
        .collect()
}

fn is_lifecycle_prefix(states: &[SuiteState]) -> bool {
    const LIFECYCLE: [SuiteState; 4] = [
        SuiteState::Pending,
        SuiteState::Assigned,
        SuiteState::Running,
        SuiteState::Terminated,
    ];
    states.len() <= LIFECYCLE.len() && states == &LIFECYCLE[..states.len()]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pool_matches_bindings_and_lifecycles_are_monotonic(
        config_specs in proptest::collection::vec(config_spec(), 1..5),
        suite_specs in proptest::collection::vec(suite_spec(), 1..10),
        seed in any::<u64>(),
        fixed_first in any::<bool>(),
    ) {
        let configs = build_configs(&config_specs);
        let mut handles: BTreeMap<String, (FakeHandle, u32)> = BTreeMap::new();
        let mut suites: Vec<TestSuite> = Vec::new();
        for (i, spec) in suite_specs.iter().enumerate() {
            let name = format!("s{i}");
            let (test_suite, handle) = suite(&name, constraint_for(spec, &configs));
            suites.push(test_suite);
            handles.insert(name, (handle, spec.duration));
        }
        let options = SchedulerOptions {
            order: if fixed_first { SuiteOrder::FixedFirst } else { SuiteOrder::Insertion },
            ..SchedulerOptions::default()
        };
        let mut scheduler = Scheduler::new(suites, configs, options)
            .unwrap()
            .with_configuration_order(RandomOrder::seeded(seed));

        let mut history: BTreeMap<String, Vec<SuiteState>> = handles
            .keys()
            .map(|name| (name.clone(), vec![SuiteState::Pending]))
            .collect();
        let max_ticks = 10 * (suite_specs.len() as u32 + 1) * 6;
        let mut ticks = 0;

        while !scheduler.is_finished() {
            ticks += 1;
            prop_assert!(ticks <= max_ticks, "scheduler did not finish in {max_ticks} ticks");

            let report = scheduler.tick().unwrap();
            for transition in &report.transitions {
                history.get_mut(&transition.suite).unwrap().push(transition.to);
            }

            // Locked set equals the environments bound to active suites.
            let bound = active_bindings(&scheduler);
            let unique: BTreeSet<EnvId> = bound.iter().cloned().collect();
            prop_assert_eq!(unique.len(), bound.len(), "environment held twice");
            let locked: BTreeSet<EnvId> = scheduler.pool().locked().into_iter().collect();
            prop_assert_eq!(locked, unique);

            // Advance scripted runs by one tick.
            for (handle, remaining) in handles.values_mut() {
                if handle.is_started() && !handle.is_terminated() {
                    if *remaining == 0 {
                        handle.succeed();
                    } else {
                        *remaining -= 1;
                    }
                }
            }
        }

        prop_assert!(scheduler.pool().is_empty());
        prop_assert_eq!(scheduler.summary().len(), suite_specs.len());
        for (name, states) in &history {
            prop_assert!(is_lifecycle_prefix(states), "{name}: {states:?}");
            prop_assert_eq!(states.last(), Some(&SuiteState::Terminated));
        }
        for (handle, _) in handles.values() {
            prop_assert_eq!(handle.start_count(), 1);
            prop_assert!(handle.is_terminated());
        }
    }
}
