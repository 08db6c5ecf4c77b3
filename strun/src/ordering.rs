//! Ordering policies: tie-breaking among eligible configurations, and the
//! order in which suites are considered within a tick.

use serde::Serialize;
use strun_common::Constraint;

/// Decides the order in which eligible configurations are tried.
///
/// The scheduler hands over configuration names in name order. Production
/// runs shuffle them so no configuration is favored; tests substitute a
/// deterministic order.
pub trait ConfigurationOrder: Send {
    fn arrange(&mut self, names: &mut [&str]);
}

impl<F> ConfigurationOrder for F
where
    F: FnMut(&mut [&str]) + Send,
{
    fn arrange(&mut self, names: &mut [&str]) {
        self(names)
    }
}

/// Uniform random shuffle.
#[derive(Debug, Clone)]
pub struct RandomOrder {
    rng: fastrand::Rng,
}

impl RandomOrder {
    pub fn new() -> Self {
        Self {
            rng: fastrand::Rng::new(),
        }
    }

    /// Reproducible shuffle for replaying a run.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
        }
    }
}

impl Default for RandomOrder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationOrder for RandomOrder {
    fn arrange(&mut self, names: &mut [&str]) {
        self.rng.shuffle(names);
    }
}

/// Keeps configurations in name order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortedOrder;

impl ConfigurationOrder for SortedOrder {
    fn arrange(&mut self, names: &mut [&str]) {
        names.sort_unstable();
    }
}

/// Order in which suites are considered within a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SuiteOrder {
    /// Input order.
    #[default]
    Insertion,
    /// Suites pinned to a fixed configuration first, then tag-matched suites,
    /// each group in input order. A heuristic: pinned suites have a single
    /// eligible configuration and are easily starved otherwise.
    FixedFirst,
}

impl SuiteOrder {
    /// Stable-sort `items` according to this policy.
    pub fn apply<T>(self, items: &mut [T], constraint: impl Fn(&T) -> &Constraint) {
        if self == Self::FixedFirst {
            items.sort_by_key(|item| !constraint(item).is_fixed());
        }
    }
}
