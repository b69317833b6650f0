use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError};

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::scheduler::job::RecurringJob;
use crate::scheduler::types::SchedulerError;

use super::core::{lock, SharedJobStates, SharedMetrics};
use super::scheduling::claim_runnable;
use super::Scheduler;

impl Scheduler {
    /// Start the tick loop.
    ///
    /// Runs one evaluation pass immediately, then one per tick on a spawned
    /// task. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), SchedulerError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SchedulerError::AlreadyStarted);
        }

        info!(
            "Scheduler starting with {} jobs, tick {:?}",
            self.jobs.len(),
            self.tick
        );

        let jobs: Arc<[Arc<RecurringJob>]> = self.jobs.clone().into();
        let states = Arc::clone(&self.states);
        let metrics = Arc::clone(&self.metrics);
        let tick = self.tick;

        dispatch_pass(&jobs, &states, &metrics);

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + tick, tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                dispatch_pass(&jobs, &states, &metrics);
            }
        });

        *lock(&self.loop_handle) = Some(handle);
        Ok(())
    }

    /// Halt the tick loop. Executions already in flight run to completion.
    /// Calling this more than once is a no-op.
    pub fn stop(&self) {
        if let Some(handle) = lock(&self.loop_handle).take() {
            handle.abort();
            info!("Scheduler stopped");
        }
    }

    /// Run a single evaluation pass outside the tick loop. Returns how many
    /// jobs were started.
    pub fn run_pending(&self) -> usize {
        dispatch_pass(&self.jobs, &self.states, &self.metrics)
    }
}

fn dispatch_pass(
    jobs: &[Arc<RecurringJob>],
    states: &SharedJobStates,
    metrics: &SharedMetrics,
) -> usize {
    let now = Instant::now();
    let claimed = claim_runnable(jobs, states, now);
    let count = claimed.len();
    for job in claimed {
        spawn_job(job, Arc::clone(states), Arc::clone(metrics), now);
    }
    count
}

/// Execute a claimed job on its own task and release the claim afterwards.
///
/// The processor runs on a nested task so a panic surfaces as a `JoinError`
/// here instead of unwinding past the bookkeeping.
fn spawn_job(
    job: Arc<RecurringJob>,
    states: SharedJobStates,
    metrics: SharedMetrics,
    claimed_at: Instant,
) {
    tokio::spawn(async move {
        debug!(job = %job.name, "Job started");
        let started = Instant::now();
        let processor = Arc::clone(&job.processor);
        let outcome = tokio::spawn(async move { processor.run().await }).await;
        let duration = started.elapsed();

        {
            let mut m = metrics.write().unwrap_or_else(PoisonError::into_inner);
            match &outcome {
                Ok(Ok(report)) => {
                    debug!(
                        job = %job.name,
                        processed = report.processed,
                        failed = report.failed,
                        "Job completed in {:?}",
                        duration
                    );
                    m.record_success(&job.name, duration, report);
                }
                Ok(Err(e)) => {
                    error!(job = %job.name, error = %e, "Job failed");
                    m.record_failure(&job.name, duration, e.to_string());
                }
                Err(join_err) => {
                    error!(job = %job.name, error = %join_err, "Job panicked");
                    m.record_failure(&job.name, duration, join_err.to_string());
                }
            }
        }

        let mut states = lock(&states);
        if let Some(state) = states.get_mut(&job.name) {
            state.last_run = Some(claimed_at);
            state.is_running = false;
        }
    });
}
