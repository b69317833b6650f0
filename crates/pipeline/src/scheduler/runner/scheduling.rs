use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{error, trace};

use crate::scheduler::job::RecurringJob;
use crate::scheduler::types::{Eligibility, JobState};

use super::core::{lock, SharedJobStates};
use super::Scheduler;

/// Decide whether `job` may start at `now`, given every job's current state.
pub(super) fn evaluate(
    job: &RecurringJob,
    states: &HashMap<String, JobState>,
    now: Instant,
) -> Eligibility {
    let own = states.get(&job.name).copied().unwrap_or_default();
    if own.is_running {
        return Eligibility::AlreadyRunning;
    }

    for dep in &job.dependencies {
        match states.get(dep) {
            None => return Eligibility::MissingDependency(dep.clone()),
            Some(upstream) if upstream.last_run.is_none() || upstream.is_running => {
                return Eligibility::WaitingOn(dep.clone());
            }
            Some(_) => {}
        }
    }

    match own.last_run {
        Some(last) if now.saturating_duration_since(last) < job.interval => Eligibility::NotDue,
        _ => Eligibility::Ready,
    }
}

/// Evaluate all jobs and mark the ready ones as running, under one lock.
///
/// Claiming inside the same critical section that evaluates eligibility is
/// what keeps a job from being started twice by overlapping passes.
pub(super) fn claim_runnable(
    jobs: &[Arc<RecurringJob>],
    states: &SharedJobStates,
    now: Instant,
) -> Vec<Arc<RecurringJob>> {
    let mut states = lock(states);
    let mut claimed = Vec::new();

    for job in jobs {
        match evaluate(job, &states, now) {
            Eligibility::Ready => {
                if let Some(state) = states.get_mut(&job.name) {
                    state.is_running = true;
                }
                claimed.push(Arc::clone(job));
            }
            Eligibility::MissingDependency(dep) => {
                error!(job = %job.name, dependency = %dep, "Dependency is not a registered job");
            }
            other => trace!(job = %job.name, eligibility = ?other, "Job not started"),
        }
    }

    claimed
}

impl Scheduler {
    /// Current eligibility of a registered job, without claiming it.
    pub fn eligibility(&self, name: &str) -> Option<Eligibility> {
        let job = self.jobs.iter().find(|j| j.name == name)?;
        let states = lock(&self.states);
        Some(evaluate(job, &states, Instant::now()))
    }
}
