//! # Idle-wait strategies for branch workers.
//!
//! [`WaitStrategy`] decides what a worker does when it has no task, no
//! retirement request, and no quiesce in progress. The choice trades wake-up
//! latency against idle CPU burn and is fixed for the lifetime of a branch.

/// How an idle worker waits for work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Spin on `yield_now`. Lowest wake-up latency, burns a core per idle
    /// worker.
    LowLatency,
    /// Yield up to a bounded spin budget, then sleep in the shortest slices
    /// the scheduler grants. Middle ground.
    Balance,
    /// Park on a condition variable until work arrives or the branch state
    /// changes. Cheapest idle, highest wake-up latency.
    Blocking,
}

impl Default for WaitStrategy {
    fn default() -> Self {
        WaitStrategy::LowLatency
    }
}
