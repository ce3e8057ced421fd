//! # workgrove
//!
//! **Workgrove** is a dynamic, auto-scaling thread-pool library.
//!
//! A [`WorkBranch`] is one pool: a set of worker threads draining a shared
//! double-ended queue. A [`Supervisor`] watches one or more branches from a
//! background thread and grows or shrinks them toward equilibrium. A
//! [`Workspace`] owns several branches and spreads submissions across them
//! with a rotating two-choice load balancer.
//!
//! | Area           | Description                                                    | Key types / traits                    |
//! |----------------|----------------------------------------------------------------|---------------------------------------|
//! | **Pools**      | Worker lifecycle: grow, cooperative retire, quiesce, shutdown. | [`WorkBranch`], [`WaitStrategy`]      |
//! | **Auto-scale** | Background control loop bounded by `[wmin, wmax]`.             | [`Supervisor`]                        |
//! | **Routing**    | Multi-pool ownership and 2-choice submission.                  | [`Workspace`], [`BranchId`]           |
//! | **Jobs**       | Type-erased single-shot units of work and result handles.      | [`Job`], [`JobHandle`], [`HandleSet`] |
//! | **Errors**     | Typed errors for pool management and job execution.            | [`PoolError`], [`JobError`]           |
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use workgrove::{WaitStrategy, WorkBranch};
//!
//! let branch = WorkBranch::new(2, WaitStrategy::Blocking);
//! let hits = Arc::new(AtomicUsize::new(0));
//!
//! for _ in 0..16 {
//!     let hits = Arc::clone(&hits);
//!     branch.submit(move || {
//!         hits.fetch_add(1, Ordering::Relaxed);
//!     });
//! }
//!
//! // Quiesce: every queued job has run and every worker sits idle.
//! assert!(branch.wait_tasks());
//! assert_eq!(hits.load(Ordering::Relaxed), 16);
//! ```
//!
//! ---

mod branch;
mod error;
mod handle;
mod job;
mod queue;
mod strategy;
mod supervisor;
mod workspace;

// ---- Public re-exports ----

pub use branch::WorkBranch;
pub use error::{JobError, PoolError};
pub use handle::{HandleSet, JobHandle};
pub use job::Job;
pub use queue::TaskQueue;
pub use strategy::WaitStrategy;
pub use supervisor::Supervisor;
pub use workspace::{BranchId, SupervisorId, Workspace};
