//! Fixed-cadence job scheduler with dependency gating.
//!
//! Every tick the scheduler walks its [`RecurringJob`]s and starts each one
//! that is not already running, whose upstream jobs have completed at least
//! once and are idle, and whose interval has elapsed since its last run.
//! Started jobs run as independent tokio tasks; the tick loop never waits on
//! them.

pub mod job;
pub mod metrics;
pub mod runner;
pub mod types;

pub use job::{FnProcessor, RecurringJob, StageError, StageProcessor, StageReport};
pub use metrics::SchedulerMetrics;
pub use runner::Scheduler;
pub use types::{Eligibility, JobStatus, SchedulerError};
