//! # Workspace: multi-branch ownership and routing.
//!
//! A [`Workspace`] exclusively owns a set of branches and supervisors.
//! Submissions are spread with a rotating cursor plus a local two-choice
//! comparison: look at the branch under the cursor, advance, compare queue
//! depths with the new position, and submit to the shorter queue (ties go
//! to the first). Rotation guarantees every branch gets sampled; the local
//! comparison approximates power-of-two-choices balancing at O(1) cost.
//!
//! [`BranchId`] and [`SupervisorId`] are weak handles: a slab index plus a
//! generation stamp. Using a handle after the object was detached fails
//! with [`PoolError::StaleHandle`] instead of reaching into freed state.
//!
//! A workspace is a single-threaded owner: every mutating operation takes
//! `&mut self`, so external serialization is part of the type, not a
//! footnote.

use crate::branch::WorkBranch;
use crate::error::PoolError;
use crate::handle::JobHandle;
use crate::job::Job;
use crate::supervisor::Supervisor;

/// Weak handle to a branch owned by a [`Workspace`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BranchId {
    index: usize,
    generation: u64,
}

/// Weak handle to a supervisor owned by a [`Workspace`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SupervisorId {
    index: usize,
    generation: u64,
}

/// One slab slot. The generation survives a vacated slot so stale handles
/// keep failing after the slot is reused.
struct Slot<T> {
    generation: u64,
    value: Option<T>,
}

/// Owner and router for a set of branches and supervisors.
///
/// ```
/// use workgrove::{WaitStrategy, WorkBranch, Workspace};
///
/// let mut space = Workspace::new();
/// let id = space.attach_branch(WorkBranch::new(2, WaitStrategy::Blocking));
/// space.submit(|| println!("routed"));
///
/// let branch = space.detach_branch(id).unwrap();
/// branch.wait_tasks();
/// assert!(space.branch(id).is_err()); // the handle went stale
/// ```
pub struct Workspace {
    branches: Vec<Slot<WorkBranch>>,
    supervisors: Vec<Slot<Supervisor>>,
    /// Slot index of the rotation cursor. Meaningful only while at least
    /// one branch is attached.
    cursor: usize,
    next_generation: u64,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            branches: Vec::new(),
            supervisors: Vec::new(),
            cursor: 0,
            next_generation: 0,
        }
    }

    // ---- attach / detach ----

    /// Takes ownership of `branch` and returns a weak handle to it. The
    /// rotation cursor resets to the first attached branch.
    pub fn attach_branch(&mut self, branch: WorkBranch) -> BranchId {
        let generation = self.bump_generation();
        let index = store(&mut self.branches, generation, branch);
        // Rotation restarts at the head after every attachment.
        self.cursor = first_occupied(&self.branches).unwrap_or(0);
        BranchId { index, generation }
    }

    /// Takes ownership of `supervisor` and returns a weak handle to it.
    pub fn attach_supervisor(&mut self, supervisor: Supervisor) -> SupervisorId {
        let generation = self.bump_generation();
        let index = store(&mut self.supervisors, generation, supervisor);
        SupervisorId { index, generation }
    }

    /// Transfers the branch behind `id` back to the caller. The cursor
    /// moves to the next occupied slot, wrapping around.
    pub fn detach_branch(&mut self, id: BranchId) -> Result<WorkBranch, PoolError> {
        let branch = take(&mut self.branches, id.index, id.generation)?;
        if self.cursor == id.index {
            self.cursor = next_occupied(&self.branches, id.index).unwrap_or(0);
        }
        Ok(branch)
    }

    /// Transfers the supervisor behind `id` back to the caller.
    pub fn detach_supervisor(&mut self, id: SupervisorId) -> Result<Supervisor, PoolError> {
        take(&mut self.supervisors, id.index, id.generation)
    }

    // ---- lookup ----

    /// Dereferences a branch handle in O(1).
    pub fn branch(&self, id: BranchId) -> Result<&WorkBranch, PoolError> {
        get(&self.branches, id.index, id.generation)
    }

    /// Dereferences a supervisor handle in O(1).
    pub fn supervisor(&self, id: SupervisorId) -> Result<&Supervisor, PoolError> {
        get(&self.supervisors, id.index, id.generation)
    }

    /// Visits every owned branch in slot order.
    pub fn for_each_branch<F>(&self, mut f: F)
    where
        F: FnMut(&WorkBranch),
    {
        for slot in &self.branches {
            if let Some(branch) = &slot.value {
                f(branch);
            }
        }
    }

    /// Visits every owned supervisor in slot order.
    pub fn for_each_supervisor<F>(&self, mut f: F)
    where
        F: FnMut(&Supervisor),
    {
        for slot in &self.supervisors {
            if let Some(supervisor) = &slot.value {
                f(supervisor);
            }
        }
    }

    pub fn num_branches(&self) -> usize {
        self.branches.iter().filter(|s| s.value.is_some()).count()
    }

    pub fn num_supervisors(&self) -> usize {
        self.supervisors.iter().filter(|s| s.value.is_some()).count()
    }

    // ---- routed submission ----

    /// Routes a task to the less-loaded of two rotating candidates.
    ///
    /// # Panics
    ///
    /// Panics when no branch is attached; routing into an empty workspace
    /// is a contract violation.
    pub fn submit<F>(&mut self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pick().submit(f);
    }

    /// Routed head-of-line submission; see
    /// [`WorkBranch::submit_urgent`](crate::WorkBranch::submit_urgent).
    pub fn submit_urgent<F>(&mut self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pick().submit_urgent(f);
    }

    /// Routed sequence submission; the whole group lands on one branch.
    pub fn submit_sequence<I>(&mut self, jobs: I)
    where
        I: IntoIterator<Item = Job>,
    {
        self.pick().submit_sequence(jobs);
    }

    /// Routed result-bearing submission.
    pub fn submit_with_result<F, R>(&mut self, f: F) -> JobHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.pick().submit_with_result(f)
    }

    /// Routed urgent result-bearing submission.
    pub fn submit_urgent_with_result<F, R>(&mut self, f: F) -> JobHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.pick().submit_urgent_with_result(f)
    }

    /// Waits on every owned branch in turn; `true` when all of them
    /// drained within their (unbounded) barriers.
    pub fn wait_all(&self) -> bool {
        let mut drained = true;
        self.for_each_branch(|branch| drained &= branch.wait_tasks());
        drained
    }

    // ---- internals ----

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Two-choice pick: current cursor vs the next position, ties to the
    /// current one. Advances the cursor as a side effect.
    fn pick(&mut self) -> &WorkBranch {
        let cursor_live = self
            .branches
            .get(self.cursor)
            .map_or(false, |s| s.value.is_some());
        let first = if cursor_live {
            self.cursor
        } else {
            first_occupied(&self.branches).expect("workspace has no branch attached")
        };
        let second = next_occupied(&self.branches, first).unwrap_or(first);
        self.cursor = second;

        let a = self.branches[first].value.as_ref().unwrap();
        let b = self.branches[second].value.as_ref().unwrap();
        if b.num_tasks() < a.num_tasks() {
            b
        } else {
            a
        }
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("branches", &self.num_branches())
            .field("supervisors", &self.num_supervisors())
            .finish()
    }
}

// ---- slab helpers ----

fn store<T>(slots: &mut Vec<Slot<T>>, generation: u64, value: T) -> usize {
    match slots.iter_mut().position(|s| s.value.is_none()) {
        Some(index) => {
            slots[index] = Slot {
                generation,
                value: Some(value),
            };
            index
        }
        None => {
            slots.push(Slot {
                generation,
                value: Some(value),
            });
            slots.len() - 1
        }
    }
}

fn get<T>(slots: &[Slot<T>], index: usize, generation: u64) -> Result<&T, PoolError> {
    slots
        .get(index)
        .filter(|s| s.generation == generation)
        .and_then(|s| s.value.as_ref())
        .ok_or(PoolError::StaleHandle)
}

fn take<T>(slots: &mut [Slot<T>], index: usize, generation: u64) -> Result<T, PoolError> {
    let slot = slots
        .get_mut(index)
        .filter(|s| s.generation == generation)
        .ok_or(PoolError::StaleHandle)?;
    slot.value.take().ok_or(PoolError::StaleHandle)
}

fn first_occupied<T>(slots: &[Slot<T>]) -> Option<usize> {
    slots.iter().position(|s| s.value.is_some())
}

/// Next occupied slot strictly after `from`, wrapping; `from` itself when
/// it is the only occupied slot.
fn next_occupied<T>(slots: &[Slot<T>], from: usize) -> Option<usize> {
    let len = slots.len();
    (1..=len)
        .map(|step| (from + step) % len)
        .find(|&i| slots[i].value.is_some())
}
