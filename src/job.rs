//! # Type-erased unit of work.
//!
//! [`Job`] is the currency workers deal in: any `FnOnce() + Send` closure
//! erased behind one allocation. A job runs at most once; the empty state
//! reports [`JobError::EmptyJob`] instead of executing.
//!
//! The crate-internal wrappers below package user callables for the three
//! submission paths. They own the panic boundary: a failure in user code is
//! either logged and suppressed (void path) or transported to the caller's
//! [`JobHandle`](crate::JobHandle) (result path), and never unwinds a
//! worker.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crossbeam_channel::bounded;

use crate::error::JobError;
use crate::handle::JobHandle;

/// A movable, single-shot unit of work.
///
/// ```
/// use workgrove::Job;
///
/// let job = Job::new(|| println!("hello"));
/// assert!(!job.is_empty());
/// job.invoke().unwrap();
///
/// // An empty job refuses to run.
/// assert!(Job::empty().invoke().is_err());
/// ```
pub struct Job {
    thunk: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Job {
    /// Erases `f` into a job.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            thunk: Some(Box::new(f)),
        }
    }

    /// A job holding nothing. Invoking it fails with [`JobError::EmptyJob`].
    pub fn empty() -> Self {
        Self { thunk: None }
    }

    pub fn is_empty(&self) -> bool {
        self.thunk.is_none()
    }

    /// Runs the job. Consuming `self` makes the at-most-once contract
    /// structural.
    pub fn invoke(self) -> Result<(), JobError> {
        match self.thunk {
            Some(thunk) => {
                thunk();
                Ok(())
            }
            None => Err(JobError::EmptyJob),
        }
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("empty", &self.is_empty())
            .finish()
    }
}

/// Renders a panic payload for logs and transported errors.
pub(crate) fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_owned()
    }
}

/// Wraps a void callable: a panic is logged to the diagnostic sink and
/// suppressed, so the worker that runs it survives.
pub(crate) fn shielded<F>(f: F) -> Job
where
    F: FnOnce() + Send + 'static,
{
    Job::new(move || {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
            tracing::error!(reason = %panic_reason(&*payload), "job panicked; worker continues");
        }
    })
}

/// Packages a group of jobs into one job that runs the members in
/// submission order on a single worker, with nothing interleaved between
/// them. A panicking or empty member abandons the rest of the group.
pub(crate) fn sequence(group: Vec<Job>) -> Job {
    Job::new(move || {
        let run = move || -> Result<(), JobError> {
            for member in group {
                member.invoke()?;
            }
            Ok(())
        };
        match panic::catch_unwind(AssertUnwindSafe(run)) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!(%err, "sequence member was empty; remainder abandoned");
            }
            Err(payload) => {
                tracing::error!(
                    reason = %panic_reason(&*payload),
                    "sequence member panicked; remainder abandoned",
                );
            }
        }
    })
}

/// Wraps a result-bearing callable. The returned job sends the outcome,
/// panic included, through a one-shot channel the handle reads.
pub(crate) fn with_result<F, R>(f: F) -> (Job, JobHandle<R>)
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = bounded(1);
    let job = Job::new(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
            JobError::Panicked {
                reason: panic_reason(&*payload),
            }
        });
        // The caller may have dropped the handle; the result just vanishes.
        let _ = tx.send(outcome);
    });
    (job, JobHandle::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_job_reports_bad_invocation() {
        let err = Job::empty().invoke().unwrap_err();
        assert!(matches!(err, JobError::EmptyJob));
    }

    #[test]
    fn job_runs_exactly_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let hits = Arc::new(AtomicUsize::new(0));
        let job = {
            let hits = Arc::clone(&hits);
            Job::new(move || {
                hits.fetch_add(1, Ordering::Relaxed);
            })
        };
        // `invoke` consumes the job, so a second run does not even compile.
        job.invoke().unwrap();
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn shielded_job_swallows_panics() {
        let job = shielded(|| panic!("boom"));
        // Must not unwind through `invoke`.
        job.invoke().unwrap();
    }

    #[test]
    fn result_job_transports_panics() {
        let (job, handle) = with_result(|| -> usize { panic!("kaput") });
        job.invoke().unwrap();
        let err = handle.join().unwrap_err();
        assert!(err.is_panic());
        assert!(err.to_string().contains("kaput"));
    }
}
