//! # Supervisor: the auto-scaling control loop.
//!
//! A [`Supervisor`] runs one background thread that periodically sizes each
//! attached branch toward its backlog, inside `[wmin, wmax]`:
//!
//! - **Scale up** while tasks are queued: add `min(wmax − workers,
//!   tasks − workers)` workers in one tick, so expansion tracks the
//!   backlog immediately.
//! - **Scale down** while the queue is empty and `workers > wmin`: retire
//!   exactly one worker per tick.
//!
//! The asymmetry is deliberate: fast expansion bounded by backlog, slow
//! contraction one-per-tick, which keeps bursty load from oscillating the
//! pool size.
//!
//! The supervisor observes branches through weak references; it never owns
//! them and never keeps a dropped branch alive.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::branch::{BranchCore, WorkBranch};

/// Default control-loop period.
const DEFAULT_TICK: Duration = Duration::from_millis(500);

type TickCallback = Arc<dyn Fn() + Send + Sync + 'static>;

struct SupervisorState {
    stopping: bool,
    /// Current wait period. `None` while suspended indefinitely.
    period: Option<Duration>,
    on_tick: Option<TickCallback>,
    branches: Vec<Weak<BranchCore>>,
}

struct SupervisorCore {
    wmin: usize,
    wmax: usize,
    /// The constructed tick period; `proceed` restores exactly this.
    tick: Duration,
    state: Mutex<SupervisorState>,
    cv: Condvar,
}

/// Background auto-scaler for one or more branches.
///
/// Dropping the supervisor stops the control loop and joins its thread.
/// Attached branches are left at whatever size the last tick produced.
pub struct Supervisor {
    core: Arc<SupervisorCore>,
    thread: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Creates a supervisor with bounds `[wmin, wmax]` and the default
    /// 500 ms tick.
    ///
    /// # Panics
    ///
    /// Panics unless `wmax > wmin` and `wmax > 0`.
    pub fn new(wmin: usize, wmax: usize) -> Self {
        Self::with_tick(wmin, wmax, DEFAULT_TICK)
    }

    /// Creates a supervisor with an explicit tick period.
    ///
    /// # Panics
    ///
    /// Panics unless `wmax > wmin` and `wmax > 0`.
    pub fn with_tick(wmin: usize, wmax: usize, tick: Duration) -> Self {
        assert!(
            wmax > wmin && wmax > 0,
            "supervisor bounds must satisfy wmax > wmin and wmax > 0",
        );
        let core = Arc::new(SupervisorCore {
            wmin,
            wmax,
            tick,
            state: Mutex::new(SupervisorState {
                stopping: false,
                period: Some(tick),
                on_tick: None,
                branches: Vec::new(),
            }),
            cv: Condvar::new(),
        });
        let mission_core = Arc::clone(&core);
        let thread = thread::Builder::new()
            .name("grove-supervisor".to_owned())
            .spawn(move || mission(mission_core))
            .expect("failed to spawn supervisor thread");
        Self {
            core,
            thread: Some(thread),
        }
    }

    /// Starts monitoring `branch`. The supervisor holds only a weak
    /// observation; dropping the branch detaches it implicitly.
    pub fn attach(&self, branch: &WorkBranch) {
        let mut st = self.core.state.lock();
        st.branches.push(Arc::downgrade(branch.core()));
    }

    /// Suspends scaling indefinitely. Running work is never interrupted;
    /// ticks simply stop until [`proceed`](Supervisor::proceed).
    pub fn suspend(&self) {
        self.core.state.lock().period = None;
    }

    /// Stretches the tick period to `pause` until the next
    /// [`proceed`](Supervisor::proceed).
    pub fn suspend_for(&self, pause: Duration) {
        self.core.state.lock().period = Some(pause);
    }

    /// Restores the constructed tick period and wakes the control loop.
    pub fn proceed(&self) {
        {
            let mut st = self.core.state.lock();
            st.period = Some(self.core.tick);
        }
        self.core.cv.notify_one();
    }

    /// Whether the control loop is currently suspended indefinitely.
    pub fn is_suspended(&self) -> bool {
        self.core.state.lock().period.is_none()
    }

    /// The configured lower worker bound.
    pub fn wmin(&self) -> usize {
        self.core.wmin
    }

    /// The configured upper worker bound.
    pub fn wmax(&self) -> usize {
        self.core.wmax
    }

    /// The constructed tick period.
    pub fn tick(&self) -> Duration {
        self.core.tick
    }

    /// Replaces the per-tick callback. It runs outside the supervisor lock
    /// after every scaling pass; a panic inside it is logged and the loop
    /// continues.
    pub fn set_tick_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.core.state.lock().on_tick = Some(Arc::new(callback));
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        {
            let mut st = self.core.state.lock();
            st.stopping = true;
        }
        self.core.cv.notify_one();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("supervisor thread terminated by panic");
            }
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("wmin", &self.core.wmin)
            .field("wmax", &self.core.wmax)
            .field("tick", &self.core.tick)
            .finish()
    }
}

/// The control loop: scale every live branch, sleep up to the current
/// period, run the tick callback outside the lock, repeat.
fn mission(core: Arc<SupervisorCore>) {
    loop {
        let callback = {
            let mut st = core.state.lock();
            if st.stopping {
                return;
            }
            st.branches.retain(|weak| weak.strong_count() > 0);
            for weak in &st.branches {
                if let Some(branch) = weak.upgrade() {
                    scale(&core, &branch);
                }
            }
            if !st.stopping {
                match st.period {
                    Some(period) => {
                        let _ = core.cv.wait_for(&mut st, period);
                    }
                    None => core.cv.wait(&mut st),
                }
            }
            if st.stopping {
                return;
            }
            st.on_tick.clone()
        };
        if let Some(callback) = callback {
            // User code runs outside the lock; a panic inside it must not
            // take the control loop down.
            if panic::catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                tracing::error!("supervisor tick callback panicked");
            }
        }
    }
}

/// One scaling decision for one branch.
fn scale(core: &SupervisorCore, branch: &Arc<BranchCore>) {
    let tasks = branch.queue.len();
    let workers = branch.worker_count();

    if tasks > 0 {
        let shortfall = tasks.saturating_sub(workers);
        let room = core.wmax.saturating_sub(workers);
        let add = room.min(shortfall);
        for _ in 0..add {
            branch.spawn_worker();
        }
        if add > 0 {
            tracing::debug!(branch = %branch.name, added = add, backlog = tasks, "scaled up");
        }
    } else if workers > core.wmin {
        match branch.request_retirement() {
            Ok(()) => tracing::debug!(branch = %branch.name, workers, "scaled down by one"),
            Err(err) => tracing::warn!(branch = %branch.name, %err, "scale-down skipped"),
        }
    }
}
