//! Named recurring jobs on cron expressions in a fixed timezone.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{Error, Result};

/// Future returned by a job callback.
pub type JobFuture = BoxFuture<'static, Result<()>>;

/// Callback invoked on every tick.
pub type JobCallback = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Wrap an async closure as a [`JobCallback`].
pub fn job_callback<F, Fut>(f: F) -> JobCallback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Lifecycle state of a registered job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Stopped,
    Scheduled,
}

/// Snapshot of one job, as reported by [`Scheduler::status`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub name: String,
    pub expression: String,
    pub state: JobState,
    /// A callback invocation is currently executing.
    pub in_flight: bool,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub runs: u64,
    pub failures: u64,
}

impl JobStatus {
    pub fn is_running(&self) -> bool {
        self.state == JobState::Scheduled
    }
}

/// Run bookkeeping shared by every incarnation of a job name, so a
/// rescheduled job never overlaps a still-running callback of its predecessor.
#[derive(Default)]
struct JobRuns {
    in_flight: AtomicBool,
    runs: AtomicU64,
    failures: AtomicU64,
    last_run: Mutex<Option<DateTime<Utc>>>,
}

/// Clears the in-flight flag when the callback task ends, even by panic.
struct InFlightGuard(Arc<JobRuns>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}

struct JobEntry {
    expression: String,
    schedule: Arc<cron::Schedule>,
    callback: JobCallback,
    runs: Arc<JobRuns>,
    /// `Some` while the timer task is alive.
    token: Option<CancellationToken>,
    next_run: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl JobEntry {
    fn state(&self) -> JobState {
        match &self.token {
            Some(token) if !token.is_cancelled() => JobState::Scheduled,
            _ => JobState::Stopped,
        }
    }

    fn halt(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        *self.next_run.lock() = None;
    }
}

/// Cron scheduler.
///
/// Each job runs its own timer task; a tick launches the callback in a
/// separate task. Ticks of the same job never overlap: a tick that arrives
/// while the previous invocation is still running is skipped. Callback
/// errors and panics are logged and the job keeps its schedule.
///
/// Must be used from within a Tokio runtime.
pub struct Scheduler {
    timezone: Tz,
    jobs: Mutex<HashMap<String, JobEntry>>,
    cancellation_token: CancellationToken,
}

impl Scheduler {
    pub fn new(timezone: Tz) -> Self {
        Self::with_cancellation(timezone, CancellationToken::new())
    }

    /// Create a scheduler whose jobs are children of `parent`.
    pub fn with_cancellation(timezone: Tz, parent: CancellationToken) -> Self {
        Self {
            timezone,
            jobs: Mutex::new(HashMap::new()),
            cancellation_token: parent.child_token(),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Register `name`, replacing and stopping any job with the same name.
    ///
    /// Five-field expressions are minute-level and get a `0` seconds field.
    /// An invalid expression is rejected and any existing job is kept.
    pub fn schedule(&self, name: &str, expression: &str, callback: JobCallback) -> Result<()> {
        let normalized = normalize_expression(expression);
        let schedule = cron::Schedule::from_str(&normalized).map_err(|e| {
            warn!(job = %name, expression = %expression, error = %e, "Rejected cron expression");
            Error::invalid_cron(expression, e.to_string())
        })?;
        if self.cancellation_token.is_cancelled() {
            return Err(Error::config("scheduler has been shut down"));
        }

        let mut jobs = self.jobs.lock();
        let runs = match jobs.remove(name) {
            Some(mut previous) => {
                previous.halt();
                debug!(job = %name, previous = %previous.expression, "Replacing scheduled job");
                previous.runs
            }
            None => Arc::new(JobRuns::default()),
        };

        let mut entry = JobEntry {
            expression: normalized,
            schedule: Arc::new(schedule),
            callback,
            runs,
            token: None,
            next_run: Arc::new(Mutex::new(None)),
        };
        self.start(name, &mut entry);
        info!(job = %name, expression = %entry.expression, timezone = %self.timezone, "Job scheduled");
        jobs.insert(name.to_string(), entry);
        Ok(())
    }

    /// Halt and remove `name`. Returns whether the job existed.
    ///
    /// An in-flight invocation is allowed to finish.
    pub fn stop(&self, name: &str) -> bool {
        match self.jobs.lock().remove(name) {
            Some(mut entry) => {
                entry.halt();
                info!(job = %name, "Job stopped");
                true
            }
            None => false,
        }
    }

    /// Halt every job but keep them registered as stopped.
    pub fn stop_all(&self) {
        let mut jobs = self.jobs.lock();
        for entry in jobs.values_mut() {
            entry.halt();
        }
        info!(jobs = jobs.len(), "All jobs stopped");
    }

    /// Restart every stopped job with its current expression.
    pub fn restart_all(&self) {
        if self.cancellation_token.is_cancelled() {
            warn!("Scheduler has been shut down, not restarting jobs");
            return;
        }
        let mut jobs = self.jobs.lock();
        let mut restarted = 0usize;
        for (name, entry) in jobs.iter_mut() {
            if entry.state() == JobState::Stopped {
                self.start(name, entry);
                restarted += 1;
            }
        }
        info!(restarted, "Jobs restarted");
    }

    /// Run `name` now, outside its schedule.
    ///
    /// Returns `false` if the previous invocation is still running.
    pub fn trigger(&self, name: &str) -> Result<bool> {
        let jobs = self.jobs.lock();
        let entry = jobs.get(name).ok_or_else(|| Error::not_found("job", name))?;
        Ok(fire(name, &entry.callback, &entry.runs))
    }

    /// Every registered job, sorted by name.
    pub fn status(&self) -> Vec<JobStatus> {
        let jobs = self.jobs.lock();
        let mut status: Vec<JobStatus> = jobs
            .iter()
            .map(|(name, entry)| JobStatus {
                name: name.clone(),
                expression: entry.expression.clone(),
                state: entry.state(),
                in_flight: entry.runs.in_flight.load(Ordering::Acquire),
                next_run: *entry.next_run.lock(),
                last_run: *entry.runs.last_run.lock(),
                runs: entry.runs.runs.load(Ordering::Relaxed),
                failures: entry.runs.failures.load(Ordering::Relaxed),
            })
            .collect();
        status.sort_by(|a, b| a.name.cmp(&b.name));
        status
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.jobs
            .lock()
            .get(name)
            .is_some_and(|e| e.state() == JobState::Scheduled)
    }

    /// Stop every job and refuse further scheduling.
    pub fn shutdown(&self) {
        self.stop_all();
        self.cancellation_token.cancel();
        info!("Scheduler shut down");
    }

    fn start(&self, name: &str, entry: &mut JobEntry) {
        let token = self.cancellation_token.child_token();
        entry.token = Some(token.clone());
        entry.next_run = Arc::new(Mutex::new(None));

        tokio::spawn(run_timer(
            name.to_string(),
            self.timezone,
            entry.schedule.clone(),
            entry.callback.clone(),
            entry.runs.clone(),
            entry.next_run.clone(),
            token,
        ));
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

/// Prepend a seconds field to classic five-field expressions.
pub fn normalize_expression(expression: &str) -> String {
    let expression = expression.trim();
    if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    }
}

async fn run_timer(
    name: String,
    timezone: Tz,
    schedule: Arc<cron::Schedule>,
    callback: JobCallback,
    runs: Arc<JobRuns>,
    next_run: Arc<Mutex<Option<DateTime<Utc>>>>,
    token: CancellationToken,
) {
    let mut cursor = Utc::now().with_timezone(&timezone);
    loop {
        let Some(next) = schedule.after(&cursor).next() else {
            info!(job = %name, "No upcoming fire time, timer finished");
            break;
        };
        let next_utc = next.with_timezone(&Utc);
        *next_run.lock() = Some(next_utc);

        let wait = (next_utc - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        fire(&name, &callback, &runs);

        // Skip ticks missed while the process was suspended.
        let now = Utc::now().with_timezone(&timezone);
        cursor = if now > next { now } else { next };
    }
    *next_run.lock() = None;
    debug!(job = %name, "Job timer exited");
}

/// Launch one invocation unless the previous one is still running.
fn fire(name: &str, callback: &JobCallback, runs: &Arc<JobRuns>) -> bool {
    if runs.in_flight.swap(true, Ordering::AcqRel) {
        warn!(job = %name, "Previous run still in progress, skipping tick");
        return false;
    }
    *runs.last_run.lock() = Some(Utc::now());
    runs.runs.fetch_add(1, Ordering::Relaxed);

    let name = name.to_string();
    let callback = callback.clone();
    let runs = runs.clone();
    tokio::spawn(async move {
        let _guard = InFlightGuard(runs.clone());
        debug!(job = %name, "Job run started");
        let outcome = AssertUnwindSafe(async { callback().await })
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => debug!(job = %name, "Job run finished"),
            Ok(Err(e)) => {
                runs.failures.fetch_add(1, Ordering::Relaxed);
                warn!(job = %name, error = %e, "Job run failed");
            }
            Err(_) => {
                runs.failures.fetch_add(1, Ordering::Relaxed);
                error!(job = %name, "Job run panicked");
            }
        }
    });
    true
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::Notify;

    use super::*;

    fn counter_callback(counter: Arc<AtomicUsize>) -> JobCallback {
        job_callback(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    fn noop() -> JobCallback {
        job_callback(|| async { Ok(()) })
    }

    async fn wait_idle(scheduler: &Scheduler, name: &str) {
        for _ in 0..200 {
            let idle = scheduler
                .status()
                .iter()
                .any(|s| s.name == name && !s.in_flight);
            if idle {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {name} never became idle");
    }

    #[test]
    fn test_normalize_expression() {
        assert_eq!(normalize_expression("*/5 * * * *"), "0 */5 * * * *");
        assert_eq!(normalize_expression(" 0 0 8 * * * "), "0 0 8 * * *");
        assert_eq!(normalize_expression("0 0 9 * * MON 2030"), "0 0 9 * * MON 2030");
    }

    #[tokio::test]
    async fn test_schedule_and_status() {
        let scheduler = Scheduler::new(chrono_tz::Europe::Berlin);
        scheduler.schedule("daily", "0 8 * * *", noop()).unwrap();

        let status = scheduler.status();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].expression, "0 0 8 * * *");
        assert!(status[0].is_running());
        assert!(scheduler.is_scheduled("daily"));
    }

    #[tokio::test]
    async fn test_invalid_expression_keeps_other_jobs() {
        let scheduler = Scheduler::new(chrono_tz::UTC);
        scheduler.schedule("health", "0 */30 * * * *", noop()).unwrap();

        let err = scheduler.schedule("daily", "every morning", noop()).unwrap_err();
        assert!(matches!(err, Error::InvalidCron { .. }));

        let err = scheduler.schedule("health", "61 * * * *", noop());
        assert!(err.is_err());

        let status = scheduler.status();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].name, "health");
        assert_eq!(status[0].expression, "0 */30 * * * *");
        assert!(status[0].is_running());
    }

    #[tokio::test]
    async fn test_reschedule_replaces_job() {
        let scheduler = Scheduler::new(chrono_tz::UTC);
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        scheduler
            .schedule("x", "* * * * * *", counter_callback(first.clone()))
            .unwrap();
        scheduler
            .schedule("x", "* * * * * *", counter_callback(second.clone()))
            .unwrap();

        assert_eq!(scheduler.status().len(), 1);

        tokio::time::timeout(Duration::from_secs(5), async {
            while second.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_removes_job() {
        let scheduler = Scheduler::new(chrono_tz::UTC);
        scheduler.schedule("x", "0 0 * * * *", noop()).unwrap();
        assert!(scheduler.stop("x"));
        assert!(!scheduler.stop("x"));
        assert!(scheduler.status().is_empty());
    }

    #[tokio::test]
    async fn test_stop_all_and_restart_all() {
        let scheduler = Scheduler::new(chrono_tz::UTC);
        scheduler.schedule("a", "0 0 * * * *", noop()).unwrap();
        scheduler.schedule("b", "0 30 * * * *", noop()).unwrap();

        scheduler.stop_all();
        let status = scheduler.status();
        assert_eq!(status.len(), 2);
        assert!(status.iter().all(|s| s.state == JobState::Stopped));
        assert!(status.iter().all(|s| s.next_run.is_none()));

        scheduler.restart_all();
        assert!(scheduler.status().iter().all(|s| s.is_running()));
    }

    #[tokio::test]
    async fn test_overlapping_runs_are_skipped() {
        let scheduler = Scheduler::new(chrono_tz::UTC);
        let release = Arc::new(Notify::new());
        let started = Arc::new(AtomicUsize::new(0));

        let (r, s) = (release.clone(), started.clone());
        let callback = job_callback(move || {
            let release = r.clone();
            let started = s.clone();
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                release.notified().await;
                Ok(())
            }
        });
        scheduler.schedule("slow", "0 0 0 1 1 *", callback).unwrap();

        assert!(scheduler.trigger("slow").unwrap());
        assert!(!scheduler.trigger("slow").unwrap());

        release.notify_one();
        wait_idle(&scheduler, "slow").await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(scheduler.trigger("slow").unwrap());
    }

    #[tokio::test]
    async fn test_failing_callback_keeps_job() {
        let scheduler = Scheduler::new(chrono_tz::UTC);
        scheduler
            .schedule(
                "flaky",
                "0 0 0 1 1 *",
                job_callback(|| async { Err(Error::Other("boom".into())) }),
            )
            .unwrap();

        scheduler.trigger("flaky").unwrap();
        wait_idle(&scheduler, "flaky").await;
        scheduler.trigger("flaky").unwrap();
        wait_idle(&scheduler, "flaky").await;

        let status = &scheduler.status()[0];
        assert_eq!(status.runs, 2);
        assert_eq!(status.failures, 2);
        assert!(status.is_running());
    }

    #[tokio::test]
    async fn test_panicking_callback_is_contained() {
        let scheduler = Scheduler::new(chrono_tz::UTC);
        scheduler
            .schedule(
                "explodes",
                "0 0 0 1 1 *",
                job_callback(|| async { panic!("callback exploded") }),
            )
            .unwrap();

        scheduler.trigger("explodes").unwrap();
        wait_idle(&scheduler, "explodes").await;
        assert_eq!(scheduler.status()[0].failures, 1);
        assert!(scheduler.trigger("explodes").unwrap());
    }

    #[tokio::test]
    async fn test_trigger_unknown_job() {
        let scheduler = Scheduler::new(chrono_tz::UTC);
        assert!(matches!(
            scheduler.trigger("ghost"),
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_jobs() {
        let scheduler = Scheduler::new(chrono_tz::UTC);
        scheduler.schedule("a", "0 0 * * * *", noop()).unwrap();
        scheduler.shutdown();

        assert!(!scheduler.is_scheduled("a"));
        assert!(scheduler.schedule("b", "0 0 * * * *", noop()).is_err());
    }

    #[tokio::test]
    async fn test_next_run_is_computed_in_timezone() {
        let scheduler = Scheduler::new(chrono_tz::Asia::Tokyo);
        scheduler.schedule("morning", "0 0 8 * * *", noop()).unwrap();

        let next = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(next) = scheduler.status()[0].next_run {
                    return next;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        let local = next.with_timezone(&chrono_tz::Asia::Tokyo);
        assert_eq!(local.format("%H:%M:%S").to_string(), "08:00:00");
    }
}
