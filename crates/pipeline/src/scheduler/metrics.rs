use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::job::StageReport;

/// Scheduler operational counters, keyed by job name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Total executions by job name, successful or not.
    pub executions: HashMap<String, u64>,
    /// Executions that returned an error or panicked.
    pub failures: HashMap<String, u64>,
    /// Items completed by job name, summed over all runs.
    pub items_processed: HashMap<String, u64>,
    /// Average execution duration by job name.
    pub avg_duration: HashMap<String, Duration>,
    /// Wall-clock time of the last finished execution.
    pub last_run: HashMap<String, DateTime<Utc>>,
    /// Message of the most recent failure.
    pub last_error: HashMap<String, String>,
}

impl SchedulerMetrics {
    /// Record a successful execution.
    pub fn record_success(&mut self, job: &str, duration: Duration, report: &StageReport) {
        self.record_execution(job, duration);
        *self.items_processed.entry(job.to_string()).or_default() += report.processed as u64;
    }

    /// Record an execution that failed or panicked.
    pub fn record_failure(&mut self, job: &str, duration: Duration, error: impl Into<String>) {
        self.record_execution(job, duration);
        *self.failures.entry(job.to_string()).or_default() += 1;
        self.last_error.insert(job.to_string(), error.into());
    }

    pub fn execution_count(&self, job: &str) -> u64 {
        self.executions.get(job).copied().unwrap_or_default()
    }

    pub fn failure_count(&self, job: &str) -> u64 {
        self.failures.get(job).copied().unwrap_or_default()
    }

    fn record_execution(&mut self, job: &str, duration: Duration) {
        *self.executions.entry(job.to_string()).or_default() += 1;
        self.last_run.insert(job.to_string(), Utc::now());

        let count = self.executions[job];
        let prev_avg = self.avg_duration.get(job).copied().unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_duration.insert(job.to_string(), new_avg);
    }
}
