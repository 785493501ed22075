//! Deferred execution at the end of the current scheduling turn
//!
//! The client never flushes inline. It hands a task to a [`Scheduler`],
//! which runs it once the synchronous work that queued it has finished.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// Work deferred to the end of the turn
pub type Task = Box<dyn FnOnce()>;

pub trait Scheduler {
    /// Run `task` once, after the current synchronous work completes
    fn defer(&self, task: Task);
}

impl<S: Scheduler + ?Sized> Scheduler for Rc<S> {
    fn defer(&self, task: Task) {
        (**self).defer(task)
    }
}

/// Explicit task queue drained by its owner at turn boundaries
///
/// For hosts without a cooperative runtime. Tasks deferred while
/// `run_pending` is draining run in the same drain.
#[derive(Default)]
pub struct TurnQueue {
    tasks: RefCell<VecDeque<Task>>,
}

impl TurnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting for the next drain
    pub fn pending(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Run queued tasks until the queue is empty, returning how many ran
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        loop {
            // borrow must end before the task runs, tasks may defer more work
            let task = self.tasks.borrow_mut().pop_front();
            match task {
                Some(task) => {
                    task();
                    count += 1;
                }
                None => break,
            }
        }
        count
    }
}

impl Scheduler for TurnQueue {
    fn defer(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }
}

impl fmt::Debug for TurnQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Defers onto the current tokio `LocalSet`
///
/// The task runs the next time the calling task yields. Calling `defer`
/// outside a `LocalSet` panics (see `tokio::task::spawn_local`).
///
/// The deferred task joins the back of the `LocalSet` run queue, so the
/// turn boundary is weaker than with [`TurnQueue`]: a task woken earlier
/// (e.g. the stdio reader with an inbound frame) may run before the flush.
/// A request issued from a response handler in that window is sent in the
/// batch that is still waiting to flush, not in a fresh one. Use
/// `TurnQueue` when strict per-turn batching matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSpawner;

impl Scheduler for LocalSpawner {
    fn defer(&self, task: Task) {
        tokio::task::spawn_local(async move { task() });
    }
}
