//! Host deferral primitive.
//!
//! The digest core never runs deferred work itself. `eval_async` arms a
//! fallback digest and `apply_async` arms a coalescing flush through a
//! [`Scheduler`] supplied by the host. [`ManualScheduler`] is a deterministic
//! implementation whose turns are advanced explicitly, which is what tests and
//! single-threaded embedders use.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;

/// A deferred, single-shot unit of work.
pub type DeferredTask = Box<dyn FnOnce()>;

/// Handle to a deferred task, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

/// Schedules callbacks to run after the current synchronous execution completes.
///
/// No ordering is guaranteed relative to other host work.
pub trait Scheduler {
    /// Queue `task` for a future turn. It must never run synchronously inside this call.
    fn defer(&self, task: DeferredTask) -> TaskId;

    /// Cancel a task that has not run yet. Returns true if it was still pending.
    fn cancel(&self, id: TaskId) -> bool;
}

/// Default bound on turns for [`ManualScheduler::run_until_idle`].
const MAX_IDLE_TURNS: usize = 1_000;

/// A scheduler whose turns are driven by the caller.
///
/// # Example
///
/// ```
/// use scope_flow::{ManualScheduler, Scheduler};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let scheduler = ManualScheduler::new();
/// let ran = Rc::new(Cell::new(false));
/// let flag = ran.clone();
/// scheduler.defer(Box::new(move || flag.set(true)));
///
/// assert!(!ran.get());
/// assert_eq!(scheduler.run_turn(), 1);
/// assert!(ran.get());
/// ```
#[derive(Default)]
pub struct ManualScheduler {
    queue: RefCell<VecDeque<(TaskId, DeferredTask)>>,
    next_id: Cell<u64>,
}

impl ManualScheduler {
    /// Create a scheduler with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting for a turn.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Returns true if a task with this id is still waiting.
    pub fn is_pending(&self, id: TaskId) -> bool {
        self.queue.borrow().iter().any(|(queued, _)| *queued == id)
    }

    /// Run one turn: every task that was pending when the turn began, in FIFO order.
    ///
    /// Tasks deferred while the turn runs wait for the next turn. Tasks
    /// cancelled while the turn runs are skipped. Returns how many tasks ran.
    pub fn run_turn(&self) -> usize {
        let Some(last) = self.queue.borrow().back().map(|(id, _)| *id) else {
            return 0;
        };
        let mut ran = 0;
        loop {
            // Pop one at a time so tasks may defer or cancel while we iterate.
            let next = {
                let mut queue = self.queue.borrow_mut();
                match queue.front() {
                    Some((id, _)) if *id <= last => queue.pop_front(),
                    _ => None,
                }
            };
            let Some((_, task)) = next else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }

    /// Run turns until nothing is pending. Returns the total number of tasks run.
    ///
    /// Gives up after a fixed number of turns so a task that always re-defers
    /// itself cannot hang the caller.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        for _ in 0..MAX_IDLE_TURNS {
            if self.pending() == 0 {
                break;
            }
            total += self.run_turn();
        }
        total
    }
}

impl Scheduler for ManualScheduler {
    fn defer(&self, task: DeferredTask) -> TaskId {
        let id = TaskId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.queue.borrow_mut().push_back((id, task));
        id
    }

    fn cancel(&self, id: TaskId) -> bool {
        let mut queue = self.queue.borrow_mut();
        let before = queue.len();
        queue.retain(|(queued, _)| *queued != id);
        queue.len() != before
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_tasks_deferred_during_a_turn_wait_for_the_next() {
        let scheduler = Rc::new(ManualScheduler::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_log = log.clone();
        let inner_scheduler = scheduler.clone();
        scheduler.defer(Box::new(move || {
            inner_log.borrow_mut().push("first");
            let later_log = inner_log.clone();
            inner_scheduler.defer(Box::new(move || later_log.borrow_mut().push("second")));
        }));

        assert_eq!(scheduler.run_turn(), 1);
        assert_eq!(*log.borrow(), vec!["first"]);
        assert_eq!(scheduler.pending(), 1);

        assert_eq!(scheduler.run_turn(), 1);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
        assert_eq!(scheduler.run_turn(), 0);
    }

    #[test]
    fn test_cancel_removes_pending_task() {
        let scheduler = ManualScheduler::new();
        let ran = Rc::new(Cell::new(0));

        let counter = ran.clone();
        let id = scheduler.defer(Box::new(move || counter.set(counter.get() + 1)));
        assert!(scheduler.is_pending(id));
        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));

        assert_eq!(scheduler.run_until_idle(), 0);
        assert_eq!(ran.get(), 0);
    }

    #[test]
    fn test_run_until_idle_is_bounded() {
        fn requeue(scheduler: Rc<ManualScheduler>) {
            let next = scheduler.clone();
            scheduler.defer(Box::new(move || requeue(next)));
        }

        let scheduler = Rc::new(ManualScheduler::new());
        requeue(scheduler.clone());
        assert_eq!(scheduler.run_until_idle(), MAX_IDLE_TURNS);
        assert_eq!(scheduler.pending(), 1);
    }
}
