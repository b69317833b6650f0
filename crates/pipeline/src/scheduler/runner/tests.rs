use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::scheduler::job::{RecurringJob, StageError, StageReport};
use crate::scheduler::runner::Scheduler;
use crate::scheduler::types::{Eligibility, JobState, SchedulerError};

use super::scheduling::evaluate;

fn counting_job(name: &str, interval: Duration, counter: Arc<AtomicUsize>) -> RecurringJob {
    RecurringJob::from_fn(name, interval, move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, StageError>(StageReport::default())
        }
    })
}

fn noop_job(name: &str, interval: Duration) -> RecurringJob {
    counting_job(name, interval, Arc::new(AtomicUsize::new(0)))
}

fn states(entries: &[(&str, JobState)]) -> HashMap<String, JobState> {
    entries
        .iter()
        .map(|(name, state)| (name.to_string(), *state))
        .collect()
}

fn completed_at(at: Instant) -> JobState {
    JobState {
        last_run: Some(at),
        is_running: false,
    }
}

#[test]
fn register_rejects_duplicate_name() {
    let mut scheduler = Scheduler::default();
    scheduler
        .register(noop_job("discover-documents", Duration::from_secs(5)))
        .unwrap();

    let err = scheduler
        .register(noop_job("discover-documents", Duration::from_secs(1)))
        .unwrap_err();
    assert_eq!(err, SchedulerError::DuplicateJobName("discover-documents".into()));
    assert_eq!(scheduler.job_names(), vec!["discover-documents"]);
}

#[test]
fn zero_tick_is_clamped() {
    let scheduler = Scheduler::new(Duration::ZERO);
    assert!(scheduler.tick() > Duration::ZERO);
}

#[test]
fn evaluate_never_run_job_is_ready() {
    let job = noop_job("a", Duration::from_secs(60));
    let now = Instant::now();
    assert_eq!(evaluate(&job, &states(&[("a", JobState::default())]), now), Eligibility::Ready);
}

#[test]
fn evaluate_respects_interval() {
    let job = noop_job("a", Duration::from_secs(5));
    let now = Instant::now();
    let recent = states(&[("a", completed_at(now - Duration::from_secs(4)))]);
    assert_eq!(evaluate(&job, &recent, now), Eligibility::NotDue);

    let due = states(&[("a", completed_at(now - Duration::from_secs(5)))]);
    assert_eq!(evaluate(&job, &due, now), Eligibility::Ready);
}

#[test]
fn evaluate_running_job_is_not_restarted() {
    let job = noop_job("a", Duration::ZERO);
    let running = JobState {
        last_run: None,
        is_running: true,
    };
    assert_eq!(
        evaluate(&job, &states(&[("a", running)]), Instant::now()),
        Eligibility::AlreadyRunning
    );
}

#[test]
fn evaluate_waits_on_upstream_that_never_ran() {
    let job = noop_job("b", Duration::ZERO).depends_on("a");
    let s = states(&[("a", JobState::default()), ("b", JobState::default())]);
    assert_eq!(evaluate(&job, &s, Instant::now()), Eligibility::WaitingOn("a".into()));
}

#[test]
fn evaluate_waits_on_running_upstream() {
    let now = Instant::now();
    let job = noop_job("b", Duration::ZERO).depends_on("a");
    let upstream = JobState {
        last_run: Some(now - Duration::from_secs(30)),
        is_running: true,
    };
    let s = states(&[("a", upstream), ("b", JobState::default())]);
    assert_eq!(evaluate(&job, &s, now), Eligibility::WaitingOn("a".into()));
}

#[test]
fn evaluate_flags_missing_dependency() {
    let job = noop_job("b", Duration::ZERO).depends_on("ghost");
    let s = states(&[("b", JobState::default())]);
    assert_eq!(
        evaluate(&job, &s, Instant::now()),
        Eligibility::MissingDependency("ghost".into())
    );
}

#[test]
fn evaluate_ready_once_upstream_completed() {
    let now = Instant::now();
    let job = noop_job("b", Duration::ZERO).depends_on("a");
    let s = states(&[("a", completed_at(now)), ("b", JobState::default())]);
    assert_eq!(evaluate(&job, &s, now), Eligibility::Ready);
}

#[tokio::test(start_paused = true)]
async fn start_runs_every_job_immediately() {
    let a = Arc::new(AtomicUsize::new(0));
    let b = Arc::new(AtomicUsize::new(0));
    let mut scheduler = Scheduler::new(Duration::from_secs(1));
    scheduler
        .register(counting_job("a", Duration::from_secs(60), Arc::clone(&a)))
        .unwrap();
    scheduler
        .register(counting_job("b", Duration::from_secs(60), Arc::clone(&b)))
        .unwrap();

    scheduler.start().unwrap();
    sleep(Duration::from_millis(10)).await;

    assert_eq!(a.load(Ordering::SeqCst), 1);
    assert_eq!(b.load(Ordering::SeqCst), 1);
    assert!(scheduler.job_status("a").unwrap().since_last_run.is_some());
    scheduler.stop();
}

#[tokio::test]
async fn register_and_start_after_start_are_rejected() {
    let mut scheduler = Scheduler::new(Duration::from_secs(1));
    scheduler
        .register(noop_job("a", Duration::from_secs(60)))
        .unwrap();
    scheduler.start().unwrap();

    assert_eq!(scheduler.start().unwrap_err(), SchedulerError::AlreadyStarted);
    assert_eq!(
        scheduler
            .register(noop_job("b", Duration::from_secs(60)))
            .unwrap_err(),
        SchedulerError::AlreadyStarted
    );
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn failed_job_updates_last_run_and_keeps_interval() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let mut scheduler = Scheduler::new(Duration::from_secs(1));
    scheduler
        .register(RecurringJob::from_fn(
            "flaky",
            Duration::from_secs(5),
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<StageReport, _>(StageError::Failed("boom".into()))
                }
            },
        ))
        .unwrap();

    scheduler.start().unwrap();
    sleep(Duration::from_secs(12)).await;
    scheduler.stop();

    // t = 0, 5, 10
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    let metrics = scheduler.metrics();
    assert_eq!(metrics.failure_count("flaky"), 3);
    assert!(metrics.last_error["flaky"].contains("boom"));
    assert!(!scheduler.is_running("flaky"));
    assert!(scheduler.last_run("flaky").is_some());
}

#[tokio::test(start_paused = true)]
async fn panicking_job_is_contained() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let healthy = Arc::new(AtomicUsize::new(0));
    let mut scheduler = Scheduler::new(Duration::from_secs(1));
    scheduler
        .register(RecurringJob::from_fn(
            "panics",
            Duration::from_secs(5),
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if counter.load(Ordering::SeqCst) > 0 {
                        panic!("job blew up");
                    }
                    Ok::<_, StageError>(StageReport::default())
                }
            },
        ))
        .unwrap();
    scheduler
        .register(counting_job("healthy", Duration::from_secs(1), Arc::clone(&healthy)))
        .unwrap();

    scheduler.start().unwrap();
    sleep(Duration::from_secs(12)).await;
    scheduler.stop();

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(scheduler.metrics().failure_count("panics"), 3);
    assert!(!scheduler.job_status("panics").unwrap().is_running);
    assert!(healthy.load(Ordering::SeqCst) >= 10);
}

#[tokio::test(start_paused = true)]
async fn slow_job_never_overlaps_itself() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let runs = Arc::new(AtomicUsize::new(0));

    let (a, p, r) = (Arc::clone(&active), Arc::clone(&peak), Arc::clone(&runs));
    let mut scheduler = Scheduler::new(Duration::from_secs(1));
    scheduler
        .register(RecurringJob::from_fn("slow", Duration::ZERO, move || {
            let (active, peak, runs) = (Arc::clone(&a), Arc::clone(&p), Arc::clone(&r));
            async move {
                let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now_active, Ordering::SeqCst);
                runs.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_secs(3)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, StageError>(StageReport::default())
            }
        }))
        .unwrap();

    scheduler.start().unwrap();
    sleep(Duration::from_secs(10)).await;
    scheduler.stop();

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    let runs = runs.load(Ordering::SeqCst);
    assert!((3..=4).contains(&runs), "expected 3-4 runs, got {runs}");
}

#[tokio::test(start_paused = true)]
async fn dependent_never_runs_while_upstream_never_completed() {
    let downstream = Arc::new(AtomicUsize::new(0));
    let mut scheduler = Scheduler::new(Duration::from_secs(1));
    scheduler
        .register(RecurringJob::from_fn("upstream", Duration::from_secs(1), || async {
            std::future::pending::<()>().await;
            Ok::<_, StageError>(StageReport::default())
        }))
        .unwrap();
    scheduler
        .register(
            counting_job("downstream", Duration::from_secs(1), Arc::clone(&downstream))
                .depends_on("upstream"),
        )
        .unwrap();

    scheduler.start().unwrap();
    sleep(Duration::from_secs(30)).await;
    scheduler.stop();

    assert_eq!(downstream.load(Ordering::SeqCst), 0);
    assert_eq!(
        scheduler.eligibility("downstream"),
        Some(Eligibility::WaitingOn("upstream".into()))
    );
}

#[tokio::test(start_paused = true)]
async fn dependent_runs_after_upstream_completes() {
    let upstream = Arc::new(AtomicUsize::new(0));
    let downstream = Arc::new(AtomicUsize::new(0));
    let mut scheduler = Scheduler::new(Duration::from_secs(1));
    scheduler
        .register(counting_job("upstream", Duration::from_secs(60), Arc::clone(&upstream)))
        .unwrap();
    scheduler
        .register(
            counting_job("downstream", Duration::from_secs(60), Arc::clone(&downstream))
                .depends_on("upstream"),
        )
        .unwrap();

    scheduler.start().unwrap();
    sleep(Duration::from_millis(2500)).await;
    scheduler.stop();

    assert_eq!(upstream.load(Ordering::SeqCst), 1);
    assert_eq!(downstream.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_dependency_skips_only_that_job() {
    let orphan = Arc::new(AtomicUsize::new(0));
    let other = Arc::new(AtomicUsize::new(0));
    let mut scheduler = Scheduler::new(Duration::from_secs(1));
    scheduler
        .register(
            counting_job("orphan", Duration::from_secs(1), Arc::clone(&orphan)).depends_on("ghost"),
        )
        .unwrap();
    scheduler
        .register(counting_job("other", Duration::from_secs(1), Arc::clone(&other)))
        .unwrap();

    scheduler.start().unwrap();
    sleep(Duration::from_millis(3500)).await;
    scheduler.stop();

    assert_eq!(orphan.load(Ordering::SeqCst), 0);
    assert!(other.load(Ordering::SeqCst) >= 3);
}

#[tokio::test(start_paused = true)]
async fn stop_halts_tick_loop_and_is_idempotent() {
    let runs = Arc::new(AtomicUsize::new(0));
    let mut scheduler = Scheduler::new(Duration::from_secs(1));
    scheduler
        .register(counting_job("a", Duration::from_secs(1), Arc::clone(&runs)))
        .unwrap();

    scheduler.start().unwrap();
    assert!(scheduler.is_ticking());
    sleep(Duration::from_millis(2500)).await;

    scheduler.stop();
    scheduler.stop();
    assert!(!scheduler.is_ticking());
    let after_stop = runs.load(Ordering::SeqCst);
    assert!(after_stop >= 3);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(runs.load(Ordering::SeqCst), after_stop);
}

#[tokio::test(start_paused = true)]
async fn run_pending_claims_each_job_once() {
    let mut scheduler = Scheduler::new(Duration::from_secs(1));
    scheduler
        .register(RecurringJob::from_fn("slow", Duration::ZERO, || async {
            sleep(Duration::from_secs(5)).await;
            Ok::<_, StageError>(StageReport::default())
        }))
        .unwrap();

    assert_eq!(scheduler.run_pending(), 1);
    assert_eq!(scheduler.run_pending(), 0);
    assert_eq!(scheduler.eligibility("slow"), Some(Eligibility::AlreadyRunning));
    assert!(scheduler.is_running("slow"));
    assert_eq!(scheduler.last_run("slow"), None);
}
