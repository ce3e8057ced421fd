//! # Error types used by the pool runtime and jobs.
//!
//! This module defines two main error enums:
//!
//! - [`PoolError`] errors raised by pool management operations.
//! - [`JobError`] errors raised by individual job executions.
//!
//! Both types provide helper methods `as_label` for logs and metrics.

use std::time::Duration;

use thiserror::Error;

/// # Errors produced by pool management.
///
/// These represent failures of branch and workspace operations, not of the
/// user code they run.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PoolError {
    /// Asked a branch with no workers left to retire one.
    #[error("no worker left in the branch to retire")]
    EmptyBranch,
    /// A workspace handle referred to an object that has been detached.
    #[error("stale handle: the object it referred to was detached")]
    StaleHandle,
}

impl PoolError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PoolError::EmptyBranch => "pool_empty_branch",
            PoolError::StaleHandle => "pool_stale_handle",
        }
    }
}

/// # Errors produced by job execution and result retrieval.
///
/// The void submit path never surfaces these to the caller: failures are
/// logged and suppressed so a worker survives them. The result-bearing path
/// transports them through the [`JobHandle`](crate::JobHandle).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum JobError {
    /// An empty [`Job`](crate::Job) was invoked.
    #[error("empty job invoked")]
    EmptyJob,

    /// The user callable panicked while running.
    #[error("job panicked: {reason}")]
    Panicked { reason: String },

    /// The job was dropped before it ran, e.g. because its branch shut down
    /// with the job still queued.
    #[error("job dropped before it ran")]
    Dropped,

    /// Waiting for the job result exceeded the given timeout.
    #[error("timed out after {timeout:?} waiting for the job result")]
    Timeout { timeout: Duration },
}

impl JobError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            JobError::EmptyJob => "job_empty",
            JobError::Panicked { .. } => "job_panicked",
            JobError::Dropped => "job_dropped",
            JobError::Timeout { .. } => "job_timeout",
        }
    }

    /// Indicates whether the error carries a transported user failure.
    pub fn is_panic(&self) -> bool {
        matches!(self, JobError::Panicked { .. })
    }
}
