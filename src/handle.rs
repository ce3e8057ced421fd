//! # Result handles for jobs that return a value.
//!
//! A result-bearing submit hands back a [`JobHandle`]: a one-shot receiver
//! that resolves to the job's return value or its transported failure.
//! [`HandleSet`] collects several handles and joins them in order.

use std::collections::VecDeque;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::error::JobError;

/// Waitable handle to the result of one submitted job.
///
/// The job side sends exactly one message. If the branch shuts down with
/// the job still queued, the sender is dropped unexecuted and every wait
/// resolves to [`JobError::Dropped`].
pub struct JobHandle<R> {
    rx: Receiver<Result<R, JobError>>,
}

impl<R> JobHandle<R> {
    pub(crate) fn new(rx: Receiver<Result<R, JobError>>) -> Self {
        Self { rx }
    }

    /// Blocks until the job finishes, then returns its outcome.
    pub fn join(self) -> Result<R, JobError> {
        match self.rx.recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(JobError::Dropped),
        }
    }

    /// Like [`join`](JobHandle::join), but gives up after `timeout`.
    pub fn join_timeout(self, timeout: Duration) -> Result<R, JobError> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(JobError::Timeout { timeout }),
            Err(RecvTimeoutError::Disconnected) => Err(JobError::Dropped),
        }
    }

    /// Returns the outcome if it is already available, without blocking.
    ///
    /// Yields `Some` at most once; the value moves out on first success.
    pub fn try_join(&self) -> Option<Result<R, JobError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(JobError::Dropped)),
        }
    }
}

/// An ordered collection of [`JobHandle`]s.
///
/// ```
/// use workgrove::{HandleSet, WaitStrategy, WorkBranch};
///
/// let branch = WorkBranch::new(2, WaitStrategy::Blocking);
/// let mut set = HandleSet::new();
/// for i in 0..4usize {
///     set.add_back(branch.submit_with_result(move || i * i));
/// }
///
/// let squares: Vec<usize> = set.join_all().into_iter().map(Result::unwrap).collect();
/// assert_eq!(squares, vec![0, 1, 4, 9]);
/// ```
pub struct HandleSet<R> {
    handles: VecDeque<JobHandle<R>>,
}

impl<R> HandleSet<R> {
    pub fn new() -> Self {
        Self {
            handles: VecDeque::new(),
        }
    }

    /// Appends a handle at the back of the set.
    pub fn add_back(&mut self, handle: JobHandle<R>) {
        self.handles.push_back(handle);
    }

    /// Inserts a handle at the front of the set.
    pub fn add_front(&mut self, handle: JobHandle<R>) {
        self.handles.push_front(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Joins every handle in set order and collects the outcomes.
    pub fn join_all(self) -> Vec<Result<R, JobError>> {
        self.handles.into_iter().map(JobHandle::join).collect()
    }
}

impl<R> Default for HandleSet<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Extend<JobHandle<R>> for HandleSet<R> {
    fn extend<I: IntoIterator<Item = JobHandle<R>>>(&mut self, iter: I) {
        self.handles.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn dropped_sender_resolves_to_dropped() {
        let (tx, rx) = bounded::<Result<u32, JobError>>(1);
        drop(tx);
        let handle = JobHandle::new(rx);
        assert!(matches!(handle.join(), Err(JobError::Dropped)));
    }

    #[test]
    fn join_timeout_elapses_without_a_result() {
        let (_tx, rx) = bounded::<Result<u32, JobError>>(1);
        let handle = JobHandle::new(rx);
        let err = handle.join_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, JobError::Timeout { .. }));
    }

    #[test]
    fn handle_set_preserves_front_and_back_order() {
        let mut set = HandleSet::new();
        for value in [1u32, 2, 3] {
            let (tx, rx) = bounded(1);
            tx.send(Ok(value)).unwrap();
            if value == 3 {
                set.add_front(JobHandle::new(rx));
            } else {
                set.add_back(JobHandle::new(rx));
            }
        }
        let values: Vec<u32> = set.join_all().into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![3, 1, 2]);
    }
}
