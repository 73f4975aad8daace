//! The unit of work the scheduler runs.

use std::fmt::{self, Debug, Formatter};

use crate::counter::Counter;
use crate::Scheduler;

/// A function pointer and an opaque argument, invoked exactly once on some worker fiber.
///
/// The scheduler never dereferences or frees `arg`; ownership and lifetime of the pointed-to
/// memory is entirely the submitter's responsibility. Tasks are copied by value into the queue,
/// so the caller's source buffer may be reused or freed as soon as [`Scheduler::add_tasks`]
/// returns.
#[derive(Clone, Copy)]
pub struct Task {
    function: fn(&Scheduler, *mut ()),
    arg: *mut (),
}

// Safety: `Task` is only ever executed on a worker fiber owned by the `Scheduler` that received
// it; the submitter is responsible for `arg` being safe to access from whichever worker thread
// eventually runs `function`.
unsafe impl Send for Task {}

impl Task {
    /// Creates a task that will call `function(scheduler, arg)` exactly once.
    pub fn new(function: fn(&Scheduler, *mut ()), arg: *mut ()) -> Task {
        Task { function, arg }
    }

    pub(crate) fn run(self, scheduler: &Scheduler) {
        (self.function)(scheduler, self.arg);
    }
}

impl Debug for Task {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter
            .debug_struct("Task")
            .field("function", &(self.function as usize as *const ()))
            .field("arg", &self.arg)
            .finish()
    }
}

/// A batch of tasks submitted together, optionally tied to a [`Counter`] for fan-in.
///
/// Returned by nothing directly -- this is just the argument shape accepted by
/// [`Scheduler::add_tasks`]; kept as its own type so call sites read as "a batch of work plus how
/// to know when it's done" rather than two loosely related parameters.
#[derive(Debug)]
pub struct TaskBatch<'a> {
    pub tasks: &'a [Task],
    pub counter: Option<&'a Counter>,
}

impl<'a> TaskBatch<'a> {
    pub fn new(tasks: &'a [Task]) -> TaskBatch<'a> {
        TaskBatch {
            tasks,
            counter: None,
        }
    }

    pub fn with_counter(tasks: &'a [Task], counter: &'a Counter) -> TaskBatch<'a> {
        TaskBatch {
            tasks,
            counter: Some(counter),
        }
    }
}
