//! Scheduler module for recurring notification jobs.
//!
//! The Scheduler is responsible for:
//! - Running named jobs on cron expressions in a fixed timezone
//! - Replacing a job atomically when it is rescheduled under the same name
//! - Skipping ticks while the previous run of the same job is in flight
//! - Stopping every job on shutdown
//!
//! The built-in jobs (daily, weekly and monthly reports plus the channel
//! health check) live in [`jobs`].

pub mod jobs;
mod service;

pub use jobs::{JobContext, JobSchedule, SchedulesConfig, register_builtin_jobs};
pub use service::{
    JobCallback, JobFuture, JobState, JobStatus, Scheduler, job_callback, normalize_expression,
};
