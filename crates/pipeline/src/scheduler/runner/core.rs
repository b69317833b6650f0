use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

use crate::scheduler::job::RecurringJob;
use crate::scheduler::metrics::SchedulerMetrics;
use crate::scheduler::types::{JobState, JobStatus, SchedulerError};

pub(super) type SharedJobStates = Arc<Mutex<HashMap<String, JobState>>>;
pub(super) type SharedMetrics = Arc<RwLock<SchedulerMetrics>>;

const MIN_TICK: Duration = Duration::from_millis(1);

/// Lock a std mutex, recovering the guard if a previous holder panicked.
///
/// Job state is only mutated by plain field writes, so a poisoned guard
/// still holds consistent data.
pub(super) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single-process scheduler for [`RecurringJob`]s.
pub struct Scheduler {
    pub(super) tick: Duration,
    /// Registered jobs in registration order.
    pub(super) jobs: Vec<Arc<RecurringJob>>,
    /// Per-job `last_run` / `is_running`, claimed atomically each tick.
    pub(super) states: SharedJobStates,
    pub(super) metrics: SharedMetrics,
    pub(super) started: AtomicBool,
    /// Handle of the spawned tick loop while the scheduler is running.
    pub(super) loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a scheduler that evaluates its jobs every `tick`.
    pub fn new(tick: Duration) -> Self {
        Self {
            tick: tick.max(MIN_TICK),
            jobs: Vec::new(),
            states: Arc::new(Mutex::new(HashMap::new())),
            metrics: Arc::new(RwLock::new(SchedulerMetrics::default())),
            started: AtomicBool::new(false),
            loop_handle: Mutex::new(None),
        }
    }

    /// Register a job. Names must be unique and registration closes once the
    /// scheduler has started.
    pub fn register(&mut self, job: RecurringJob) -> Result<(), SchedulerError> {
        if self.started.load(Ordering::Acquire) {
            return Err(SchedulerError::AlreadyStarted);
        }
        if self.jobs.iter().any(|j| j.name == job.name) {
            return Err(SchedulerError::DuplicateJobName(job.name));
        }

        info!(
            job = %job.name,
            interval_ms = job.interval.as_millis() as u64,
            dependencies = ?job.dependencies,
            "Registered job"
        );
        lock(&self.states).insert(job.name.clone(), JobState::default());
        self.jobs.push(Arc::new(job));
        Ok(())
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of a single job's state, if registered.
    pub fn job_status(&self, name: &str) -> Option<JobStatus> {
        let job = self.jobs.iter().find(|j| j.name == name)?;
        let state = lock(&self.states).get(name).copied().unwrap_or_default();
        Some(JobStatus {
            name: job.name.clone(),
            interval: job.interval,
            dependencies: job.dependencies.clone(),
            is_running: state.is_running,
            since_last_run: state.last_run.map(|t| Instant::now().saturating_duration_since(t)),
        })
    }

    /// Names of the registered jobs, in registration order.
    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name.as_str()).collect()
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Whether an execution of `name` is in flight.
    pub fn is_running(&self, name: &str) -> bool {
        lock(&self.states).get(name).is_some_and(|s| s.is_running)
    }

    /// Start instant of the last finished execution of `name`.
    pub fn last_run(&self, name: &str) -> Option<Instant> {
        lock(&self.states).get(name).and_then(|s| s.last_run)
    }

    /// Whether the tick loop is currently alive.
    pub fn is_ticking(&self) -> bool {
        lock(&self.loop_handle).is_some()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
