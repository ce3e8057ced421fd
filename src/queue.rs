//! # Lock-guarded double-ended task queue.
//!
//! [`TaskQueue`] is the buffer between submitters and the workers of one
//! branch. It never blocks: waiting for work is the branch's concern, and
//! the queue exposes no condition variable of its own.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

/// Thread-safe double-ended FIFO.
///
/// All mutations pass through a single internal mutex. Ordering guarantees:
/// back-pushes come out in back-push order, and a later front-push precedes
/// all earlier front-pushes.
///
/// The length is mirrored into an atomic that is updated inside the critical
/// section, so [`len`](TaskQueue::len) reads committed state without taking
/// the lock. Callers that hold another lock (the branch mutex, the
/// supervisor mutex) can therefore sample queue depth freely.
pub struct TaskQueue<T> {
    items: Mutex<VecDeque<T>>,
    len: AtomicUsize,
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
        }
    }

    /// Appends an item at the tail.
    pub fn push_back(&self, item: T) {
        let mut items = self.items.lock();
        items.push_back(item);
        self.len.store(items.len(), Ordering::Release);
    }

    /// Inserts an item at the head, ahead of everything already queued.
    pub fn push_front(&self, item: T) {
        let mut items = self.items.lock();
        items.push_front(item);
        self.len.store(items.len(), Ordering::Release);
    }

    /// Pops the head without blocking. `None` when the queue is empty.
    pub fn try_pop(&self) -> Option<T> {
        let mut items = self.items.lock();
        let item = items.pop_front();
        self.len.store(items.len(), Ordering::Release);
        item
    }

    /// Number of queued items at the moment of the call.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
