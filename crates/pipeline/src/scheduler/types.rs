use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Errors raised by scheduler registration and lifecycle calls.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Job already registered: {0}")]
    DuplicateJobName(String),
    #[error("Scheduler already started")]
    AlreadyStarted,
}

/// Mutable per-job bookkeeping, guarded by the scheduler's state lock.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct JobState {
    /// When the most recent execution was started. Set when it finishes,
    /// whatever the outcome.
    pub last_run: Option<Instant>,
    pub is_running: bool,
}

/// Why a job was or was not started on a given tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Ready,
    AlreadyRunning,
    NotDue,
    /// Upstream job has never completed, or is running right now.
    WaitingOn(String),
    /// Upstream job name is not registered.
    MissingDependency(String),
}

/// Point-in-time view of a registered job.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub name: String,
    pub interval: Duration,
    pub dependencies: Vec<String>,
    pub is_running: bool,
    /// Time since the last execution started, if it ever ran.
    pub since_last_run: Option<Duration>,
}
