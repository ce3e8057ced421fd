//! # WorkBranch: one auto-growable pool of workers.
//!
//! A branch owns a set of worker threads draining one shared
//! [`TaskQueue`](crate::TaskQueue). Workers are added eagerly and removed
//! cooperatively: [`del_worker`](WorkBranch::del_worker) files a retirement
//! request that some worker claims at its next safe point, so no thread is
//! ever killed mid-task.
//!
//! Submission comes in three classes:
//! - [`submit`](WorkBranch::submit): back of the queue, FIFO.
//! - [`submit_urgent`](WorkBranch::submit_urgent): head of the queue,
//!   best-effort head-of-line.
//! - [`submit_sequence`](WorkBranch::submit_sequence): a group that runs
//!   in order on one worker with nothing interleaved.
//!
//! [`wait_tasks`](WorkBranch::wait_tasks) is a two-phase barrier: it
//! returns once every queued task has drained and every worker has parked,
//! then releases the workers again.

mod core;

use std::sync::Arc;
use std::time::Duration;

use crate::error::PoolError;
use crate::handle::JobHandle;
use crate::job::{self, Job};
use crate::strategy::WaitStrategy;

pub(crate) use self::core::BranchCore;

const DEFAULT_NAME: &str = "grove";

/// A pool of worker threads sharing one double-ended task queue.
///
/// Dropping the branch shuts it down: every worker retires after finishing
/// the task it already holds, queued tasks that no worker reached are
/// dropped unexecuted, and the destructor does not return until no worker
/// thread is left alive. Call [`wait_tasks`](WorkBranch::wait_tasks) first
/// if the queue must drain.
pub struct WorkBranch {
    core: Arc<BranchCore>,
}

impl WorkBranch {
    /// Creates a branch with `max(workers, 1)` workers and the given wait
    /// strategy. The strategy is fixed for the branch's lifetime.
    pub fn new(workers: usize, strategy: WaitStrategy) -> Self {
        Self::named(DEFAULT_NAME, workers, strategy)
    }

    /// Like [`new`](WorkBranch::new), with a name used as the worker
    /// thread-name prefix (`<name>-worker-<n>`).
    pub fn named(name: impl Into<String>, workers: usize, strategy: WaitStrategy) -> Self {
        let branch = Self {
            core: Arc::new(BranchCore::new(name.into(), strategy)),
        };
        for _ in 0..workers.max(1) {
            branch.add_worker();
        }
        branch
    }

    /// A branch with one worker per available CPU core.
    pub fn per_core(strategy: WaitStrategy) -> Self {
        Self::new(num_cpus::get(), strategy)
    }

    /// Spawns one additional worker.
    pub fn add_worker(&self) {
        self.core.spawn_worker();
    }

    /// Requests that one worker retire. Some worker claims the request at
    /// its next safe point; this call does not wait for it.
    ///
    /// Fails with [`PoolError::EmptyBranch`] when the branch has no worker
    /// left.
    pub fn del_worker(&self) -> Result<(), PoolError> {
        self.core.request_retirement()
    }

    /// Number of live workers.
    pub fn num_workers(&self) -> usize {
        self.core.worker_count()
    }

    /// Number of tasks waiting in the queue.
    pub fn num_tasks(&self) -> usize {
        self.core.queue.len()
    }

    /// Enqueues a task at the back of the queue.
    ///
    /// A panic inside `f` is caught, logged, and suppressed; the worker
    /// running it survives.
    pub fn submit<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.core.enqueue_back(job::shielded(f));
    }

    /// Enqueues a task at the head of the queue, ahead of everything not
    /// yet popped. Tasks a worker already holds are not re-orderable.
    pub fn submit_urgent<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.core.enqueue_front(job::shielded(f));
    }

    /// Enqueues a group of jobs that runs as one task: in submission order,
    /// on a single worker, with no other task interleaved.
    ///
    /// ```
    /// use workgrove::{Job, WaitStrategy, WorkBranch};
    ///
    /// let branch = WorkBranch::new(1, WaitStrategy::Blocking);
    /// branch.submit_sequence([
    ///     Job::new(|| print!("a")),
    ///     Job::new(|| print!("b")),
    ///     Job::new(|| print!("c")),
    /// ]);
    /// branch.wait_tasks();
    /// ```
    pub fn submit_sequence<I>(&self, jobs: I)
    where
        I: IntoIterator<Item = Job>,
    {
        self.core.enqueue_back(job::sequence(jobs.into_iter().collect()));
    }

    /// Enqueues a result-bearing task at the back of the queue and returns
    /// the handle its outcome resolves through.
    pub fn submit_with_result<F, R>(&self, f: F) -> JobHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (job, handle) = job::with_result(f);
        self.core.enqueue_back(job);
        handle
    }

    /// Result-bearing variant of [`submit_urgent`](WorkBranch::submit_urgent).
    pub fn submit_urgent_with_result<F, R>(&self, f: F) -> JobHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (job, handle) = job::with_result(f);
        self.core.enqueue_front(job);
        handle
    }

    /// Blocks until every queued task has drained and every worker has
    /// reported idle, then releases the workers and returns `true`.
    ///
    /// Tasks submitted while the barrier holds stay queued until the
    /// workers resume.
    pub fn wait_tasks(&self) -> bool {
        self.core.quiesce_barrier(None)
    }

    /// Bounded [`wait_tasks`](WorkBranch::wait_tasks). Returns `false` when
    /// the workers did not all report idle within `timeout`; the branch
    /// keeps servicing submissions normally afterwards either way.
    pub fn wait_tasks_for(&self, timeout: Duration) -> bool {
        self.core.quiesce_barrier(Some(timeout))
    }

    pub(crate) fn core(&self) -> &Arc<BranchCore> {
        &self.core
    }
}

impl Drop for WorkBranch {
    fn drop(&mut self) {
        self.core.shut_down();
    }
}

impl std::fmt::Debug for WorkBranch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkBranch")
            .field("name", &self.core.name)
            .field("strategy", &self.core.strategy)
            .field("workers", &self.num_workers())
            .field("tasks", &self.num_tasks())
            .finish()
    }
}
