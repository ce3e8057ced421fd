//! # Shared branch state and the worker mission loop.
//!
//! One [`BranchCore`] is shared by the branch facade, its workers, and any
//! supervisor observing it. The public [`WorkBranch`](crate::WorkBranch)
//! wraps it in an `Arc`; each worker thread holds its own clone, so the
//! core outlives the facade exactly as long as workers are still winding
//! down.
//!
//! Locking rules: `state` is the only branch lock. The task queue keeps its
//! own lock and is never touched while `state` is held (queue depth is read
//! through the queue's committed atomic length instead).

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::PoolError;
use crate::job::Job;
use crate::queue::TaskQueue;
use crate::strategy::WaitStrategy;

/// Consecutive yields an idle `Balance` worker burns before it sleeps.
const MAX_SPIN: u32 = 10_000;
/// Sleep slice once the spin budget is exhausted. The point is to give the
/// time slice back, not to measure a nanosecond.
const SPIN_REST: Duration = Duration::from_nanos(1);

/// Branch state guarded by the single branch mutex.
pub(crate) struct BranchState {
    /// Live workers keyed by their thread identity.
    pub(crate) workers: HashMap<ThreadId, JoinHandle<()>>,
    /// Handles of workers that retired; joined when the branch shuts down.
    pub(crate) retired: Vec<JoinHandle<()>>,
    /// Workers that reported idle during quiesce phase one.
    pub(crate) idle_reported: usize,
    /// Parked workers that resumed during quiesce phase two.
    pub(crate) resumed: usize,
}

pub(crate) struct BranchCore {
    pub(crate) name: String,
    pub(crate) strategy: WaitStrategy,
    pub(crate) queue: TaskQueue<Job>,

    pub(crate) state: Mutex<BranchState>,
    /// Pending retirement requests. Decremented only under `state`; read
    /// lock-free on the worker hot path with acquire ordering.
    decline: AtomicUsize,
    /// Quiesce flag: workers that find the queue empty while this is set
    /// park and report idle instead of spinning.
    quiescing: AtomicBool,
    /// Shutdown flag: a standing retirement request for every worker.
    dropping: AtomicBool,

    /// Wakes `Blocking` sleepers when work arrives or state changes.
    work_cv: Condvar,
    /// Wakes the quiesce caller as workers report idle.
    idle_cv: Condvar,
    /// Parks quiesced workers; also signals the drop path as retirements
    /// complete.
    resume_cv: Condvar,
    /// Wakes the quiesce caller as parked workers resume.
    resumed_cv: Condvar,

    /// Monotonic worker number, used only for thread names.
    worker_seq: AtomicUsize,
}

impl BranchCore {
    pub(crate) fn new(name: String, strategy: WaitStrategy) -> Self {
        Self {
            name,
            strategy,
            queue: TaskQueue::new(),
            state: Mutex::new(BranchState {
                workers: HashMap::new(),
                retired: Vec::new(),
                idle_reported: 0,
                resumed: 0,
            }),
            decline: AtomicUsize::new(0),
            quiescing: AtomicBool::new(false),
            dropping: AtomicBool::new(false),
            work_cv: Condvar::new(),
            idle_cv: Condvar::new(),
            resume_cv: Condvar::new(),
            resumed_cv: Condvar::new(),
            worker_seq: AtomicUsize::new(0),
        }
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.state.lock().workers.len()
    }

    /// Spawns one worker and registers it under its thread identity.
    pub(crate) fn spawn_worker(self: &Arc<Self>) {
        let mut st = self.state.lock();
        if self.dropping.load(Ordering::Acquire) {
            return;
        }
        // Handles of workers that already exited carry no thread anymore.
        st.retired.retain(|h| !h.is_finished());

        let core = Arc::clone(self);
        let seq = self.worker_seq.fetch_add(1, Ordering::Relaxed);
        let handle = thread::Builder::new()
            .name(format!("{}-worker-{}", self.name, seq))
            .spawn(move || mission(core))
            .expect("failed to spawn worker thread");
        tracing::trace!(branch = %self.name, worker = seq, "worker spawned");
        st.workers.insert(handle.thread().id(), handle);
    }

    /// Files one retirement request. Some worker will claim it at its next
    /// safe point; this call does not wait for that to happen.
    pub(crate) fn request_retirement(&self) -> Result<(), PoolError> {
        let st = self.state.lock();
        if self.dropping.load(Ordering::Acquire) {
            // Teardown already retires everyone.
            return Ok(());
        }
        if st.workers.is_empty() {
            return Err(PoolError::EmptyBranch);
        }
        self.decline.fetch_add(1, Ordering::AcqRel);
        if self.strategy == WaitStrategy::Blocking {
            self.work_cv.notify_one();
        }
        Ok(())
    }

    pub(crate) fn enqueue_back(&self, job: Job) {
        self.queue.push_back(job);
        self.notify_work();
    }

    pub(crate) fn enqueue_front(&self, job: Job) {
        self.queue.push_front(job);
        self.notify_work();
    }

    /// Wakes one `Blocking` sleeper. Taking the state lock pairs the notify
    /// with the sleeper's predicate check, so the wakeup cannot fall into
    /// the gap between its last look at the queue and its park.
    fn notify_work(&self) {
        if self.strategy == WaitStrategy::Blocking {
            let _st = self.state.lock();
            self.work_cv.notify_one();
        }
    }

    fn wake_reason(&self) -> bool {
        !self.queue.is_empty()
            || self.quiescing.load(Ordering::Acquire)
            || self.dropping.load(Ordering::Acquire)
            || self.decline.load(Ordering::Acquire) > 0
    }

    /// Two-phase quiesce barrier.
    ///
    /// Phase one waits (optionally bounded) until every worker has reported
    /// idle over an empty queue. Phase two releases the parked workers and
    /// waits until each of them has resumed. Returns whether phase one
    /// completed before the deadline.
    pub(crate) fn quiesce_barrier(&self, timeout: Option<Duration>) -> bool {
        // A timeout too far out for `Instant` to represent waits unbounded.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        let parked;
        let drained;
        {
            let mut st = self.state.lock();
            self.quiescing.store(true, Ordering::Release);
            if self.strategy == WaitStrategy::Blocking {
                self.work_cv.notify_all();
            }
            drained = loop {
                if st.idle_reported >= st.workers.len() {
                    break true;
                }
                match deadline {
                    Some(d) => {
                        if Instant::now() >= d {
                            break false;
                        }
                        let _ = self.idle_cv.wait_until(&mut st, d);
                    }
                    None => self.idle_cv.wait(&mut st),
                }
            };
            // Phase two settles with exactly the workers that parked; a
            // timed-out phase one must not wait for workers that never
            // reported.
            parked = st.idle_reported;
            st.idle_reported = 0;
            self.quiescing.store(false, Ordering::Release);
        }
        self.resume_cv.notify_all();

        let mut st = self.state.lock();
        while st.resumed < parked {
            self.resumed_cv.wait(&mut st);
        }
        st.resumed = 0;
        drained
    }

    /// Shutdown protocol run by the branch destructor: turn every worker
    /// into a retiree, wait for the retirement count to drain, then join
    /// the exited threads so none outlives the branch.
    pub(crate) fn shut_down(&self) {
        let retired = {
            let mut st = self.state.lock();
            self.decline.store(st.workers.len(), Ordering::Release);
            self.dropping.store(true, Ordering::Release);
            if self.strategy == WaitStrategy::Blocking {
                self.work_cv.notify_all();
            }
            while self.decline.load(Ordering::Acquire) > 0 {
                self.resume_cv.wait(&mut st);
            }
            std::mem::take(&mut st.retired)
        };
        for handle in retired {
            if handle.join().is_err() {
                tracing::error!(branch = %self.name, "worker thread terminated by panic");
            }
        }
        tracing::debug!(branch = %self.name, "branch shut down");
    }
}

/// The worker loop. State precedence per iteration: execute, retire,
/// quiesce, idle.
fn mission(core: Arc<BranchCore>) {
    let mut spin = 0u32;
    loop {
        // Execute: work available and nobody asked us to leave.
        if core.decline.load(Ordering::Acquire) == 0 {
            if let Some(job) = core.queue.try_pop() {
                run_job(&core, job);
                spin = 0;
                continue;
            }
        }

        // Retire: claim one pending request, under the lock.
        if core.decline.load(Ordering::Acquire) > 0 {
            if retire(&core) {
                return;
            }
            continue;
        }

        // Quiesce: the queue is empty and a barrier is in progress.
        if core.quiescing.load(Ordering::Acquire) {
            park_for_quiesce(&core);
            continue;
        }

        idle(&core, &mut spin);
    }
}

/// Claims one retirement request. Returns `true` when this worker exits;
/// `false` when another worker claimed the request first.
fn retire(core: &BranchCore) -> bool {
    let mut st = core.state.lock();
    if core.decline.load(Ordering::Acquire) == 0 {
        return false;
    }
    core.decline.fetch_sub(1, Ordering::AcqRel);
    if let Some(handle) = st.workers.remove(&thread::current().id()) {
        st.retired.push(handle);
    }
    // A retiring worker counts as idle for a quiesce in progress, and as
    // progress for a drop waiting on the retirement count.
    if core.quiescing.load(Ordering::Acquire) {
        core.idle_cv.notify_one();
    }
    if core.dropping.load(Ordering::Acquire) {
        core.resume_cv.notify_one();
    }
    tracing::trace!(branch = %core.name, "worker retired");
    true
}

/// Reports idle for phase one, parks until the barrier lifts, then reports
/// resumed for phase two.
fn park_for_quiesce(core: &BranchCore) {
    let mut st = core.state.lock();
    // The flag may have been cleared between the lock-free check and here;
    // reporting idle after phase one ended would poison the next barrier.
    if !core.quiescing.load(Ordering::Acquire) {
        return;
    }
    st.idle_reported += 1;
    core.idle_cv.notify_one();
    while core.quiescing.load(Ordering::Acquire) {
        core.resume_cv.wait(&mut st);
    }
    st.resumed += 1;
    core.resumed_cv.notify_one();
}

fn idle(core: &BranchCore, spin: &mut u32) {
    match core.strategy {
        WaitStrategy::LowLatency => thread::yield_now(),
        WaitStrategy::Balance => {
            if *spin < MAX_SPIN {
                *spin += 1;
                thread::yield_now();
            } else {
                thread::sleep(SPIN_REST);
            }
        }
        WaitStrategy::Blocking => {
            let mut st = core.state.lock();
            while !core.wake_reason() {
                core.work_cv.wait(&mut st);
            }
        }
    }
}

fn run_job(core: &BranchCore, job: Job) {
    // Submission wrappers own the real panic boundary; this is a backstop
    // so a worker never dies to a payload it did not expect.
    match panic::catch_unwind(AssertUnwindSafe(|| job.invoke())) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::error!(branch = %core.name, %err, "worker popped an unrunnable job");
        }
        Err(_) => {
            tracing::error!(branch = %core.name, "job panicked past its own guard");
        }
    }
}
