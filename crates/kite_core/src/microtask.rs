//! Microtask scheduling
//!
//! Renders are deferred by one microtask so that every mutation made in the
//! same synchronous turn lands in a single render. The host decides what a
//! "microtask" is by providing a [`MicrotaskScheduler`]:
//!
//! - [`MicrotaskQueue`]: a FIFO the host drains at the end of each turn
//!   (event handler, timer callback, frame), like a JS microtask checkpoint
//! - [`futures::executor::LocalSpawner`]: tasks are spawned onto a
//!   `LocalPool` and run the next time the pool is driven
//!
//! ```rust
//! use kite_core::microtask::{MicrotaskQueue, MicrotaskScheduler};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let queue = MicrotaskQueue::new();
//! let ran = Rc::new(Cell::new(false));
//! let flag = ran.clone();
//! queue.queue_microtask(Box::new(move || flag.set(true)));
//!
//! assert!(!ran.get());
//! assert_eq!(queue.run_until_idle(), 1);
//! assert!(ran.get());
//! ```

use futures::executor::LocalSpawner;
use futures::task::LocalSpawnExt;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A unit of deferred work
pub type Microtask = Box<dyn FnOnce() + 'static>;

/// Queues work to run after the current synchronous turn
///
/// Implementations must never run the task re-entrantly from inside
/// `queue_microtask`; the whole point is to run it *later*.
pub trait MicrotaskScheduler {
    fn queue_microtask(&self, task: Microtask);
}

impl<S: MicrotaskScheduler + ?Sized> MicrotaskScheduler for Rc<S> {
    fn queue_microtask(&self, task: Microtask) {
        (**self).queue_microtask(task)
    }
}

/// A host-drained microtask FIFO
///
/// Cheap to clone; clones share the same queue.
#[derive(Clone, Default)]
pub struct MicrotaskQueue {
    tasks: Rc<RefCell<VecDeque<Microtask>>>,
}

impl MicrotaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to run
    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Run queued tasks until the queue is empty, including tasks queued by
    /// the tasks themselves. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        // The borrow must end before the task runs: tasks queue more tasks.
        while let Some(task) = self.pop() {
            task();
            ran += 1;
        }
        if ran > 0 {
            tracing::trace!(ran, "microtask queue drained");
        }
        ran
    }

    fn pop(&self) -> Option<Microtask> {
        self.tasks.borrow_mut().pop_front()
    }
}

impl MicrotaskScheduler for MicrotaskQueue {
    fn queue_microtask(&self, task: Microtask) {
        self.tasks.borrow_mut().push_back(task);
    }
}

impl MicrotaskScheduler for LocalSpawner {
    fn queue_microtask(&self, task: Microtask) {
        let slot = Rc::new(RefCell::new(Some(task)));
        let deferred = slot.clone();
        let spawned = self.spawn_local(async move {
            let task = deferred.borrow_mut().take();
            if let Some(task) = task {
                task();
            }
        });
        if let Err(err) = spawned {
            // A render that never runs leaves the instance stuck, so run it now.
            tracing::warn!(%err, "local pool rejected microtask, running inline");
            let task = slot.borrow_mut().take();
            if let Some(task) = task {
                task();
            }
        }
    }
}
