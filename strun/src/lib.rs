//! Suite test runner.
//!
//! Schedules test suites onto exclusive execution environments: each suite
//! declares either a fixed configuration or a set of required tags, each
//! configuration owns one environment identifier, and no environment is ever
//! held by two suites at once. Suites run as external processes; the
//! scheduler polls them, collects their reports and releases their
//! environments as they finish.

pub mod completion;
pub mod matcher;
pub mod ordering;
pub mod pool;
pub mod runnable;
pub mod scheduler;
pub mod settings;
pub mod summary;

pub use completion::{CompletionHandler, HandlerChain, ReportCollector, SuiteCompletion};
pub use matcher::{ConstraintMatcher, Eligible, MatchError};
pub use ordering::{ConfigurationOrder, RandomOrder, SortedOrder, SuiteOrder};
pub use pool::{EnvironmentPool, PoolError};
pub use runnable::{ProcessRunnable, RunnableError, SuiteExit, SuiteRunnable, reset_work_root};
pub use scheduler::{
    Admission, Binding, Scheduler, SchedulerError, SchedulerOptions, SuiteState, TestSuite,
    TickReport, Transition,
};
pub use settings::{RunOverrides, RunSettings};
pub use summary::RunSummary;
