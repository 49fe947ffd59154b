//! Microtask Scheduler
//!
//! The runtime never blocks. Work that must happen "after the current
//! synchronous turn" is queued here as a microtask:
//!
//! 1. The dependency registry queues one flush per turn to deliver batched
//!    notifications.
//! 2. Component renderers queue the reset of their pending-update flag so
//!    that re-triggers within one update are coalesced.
//! 3. [`Deferred`] signals queue their continuations when resolved.
//!
//! The host drives the queue by calling [`flush_microtasks`] at the end of
//! every synchronous turn (after handling an event, after the initial
//! render, ...). Tasks queued while flushing run in the same flush, in FIFO
//! order, so a single call always drains everything that became ready.
//!
//! # Threading
//!
//! The queue is thread-local. Every thread that uses the runtime is an
//! independent, single-threaded event loop.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

type Microtask = Box<dyn FnOnce()>;

thread_local! {
    static MICROTASKS: RefCell<VecDeque<Microtask>> = RefCell::new(VecDeque::new());
}

/// Queue a task to run at the end of the current synchronous turn.
pub fn queue_microtask<F>(task: F)
where
    F: FnOnce() + 'static,
{
    let _ = MICROTASKS.try_with(|queue| queue.borrow_mut().push_back(Box::new(task)));
}

/// Queue a task behind everything that is already pending, including any
/// scheduled notification flush.
pub fn next_tick<F>(task: F)
where
    F: FnOnce() + 'static,
{
    queue_microtask(task);
}

/// Run queued microtasks until the queue is empty.
///
/// Returns the number of tasks that ran.
pub fn flush_microtasks() -> usize {
    let mut ran = 0;
    loop {
        // The borrow ends before the task runs so tasks may queue more tasks.
        let next = MICROTASKS.with(|queue| queue.borrow_mut().pop_front());
        let Some(task) = next else {
            break;
        };
        task();
        ran += 1;
    }
    if ran > 0 {
        tracing::trace!(ran, "microtasks flushed");
    }
    ran
}

/// Number of microtasks waiting to run.
pub fn pending_microtasks() -> usize {
    MICROTASKS.with(|queue| queue.borrow().len())
}

/// A one-shot completion signal.
///
/// Components return a `Deferred` from their `before_remove` hook to keep
/// their nodes in the tree until an asynchronous step (an exit animation,
/// a confirmation, ...) completes. Continuations registered with
/// [`Deferred::then`] run as microtasks once [`Deferred::resolve`] is called.
#[derive(Clone, Default)]
pub struct Deferred(Rc<DeferredInner>);

#[derive(Default)]
struct DeferredInner {
    resolved: Cell<bool>,
    waiters: RefCell<Vec<Microtask>>,
}

impl Deferred {
    /// Create an unresolved signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a signal that is already resolved.
    pub fn resolved() -> Self {
        let deferred = Self::new();
        deferred.0.resolved.set(true);
        deferred
    }

    /// Resolve the signal. Resolving twice has no effect.
    pub fn resolve(&self) {
        if self.0.resolved.replace(true) {
            return;
        }
        let waiters = std::mem::take(&mut *self.0.waiters.borrow_mut());
        for waiter in waiters {
            queue_microtask(waiter);
        }
    }

    /// Whether [`resolve`](Self::resolve) has been called.
    pub fn is_resolved(&self) -> bool {
        self.0.resolved.get()
    }

    /// Run `task` as a microtask once the signal resolves.
    pub fn then<F>(&self, task: F)
    where
        F: FnOnce() + 'static,
    {
        if self.is_resolved() {
            queue_microtask(task);
        } else {
            self.0.waiters.borrow_mut().push(Box::new(task));
        }
    }
}

impl std::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("resolved", &self.is_resolved())
            .field("waiters", &self.0.waiters.borrow().len())
            .finish()
    }
}
