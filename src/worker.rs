//! Per-OS-thread bookkeeping and the generic fiber body every pooled fiber runs.
//!
//! Every pool fiber executes the same [`worker_fiber_proc`]. A fiber doesn't keep its identity
//! tied to one task: once a task finishes the fiber goes back to the pool and is handed whatever
//! task (or parked-counter wakeup) becomes ready next, possibly on a different OS thread.
//!
//! The handoff between "the fiber that's about to suspend" and "the fiber that's about to run"
//! is a post-switch hook: the suspending side stashes what should happen to itself in a
//! thread-local [`Disposition`] immediately before calling `resume()`, and the newly-resumed side
//! reads it back out via [`handle_handoff`] before doing anything else. This keeps the handoff
//! race-free without a lock: both sides run on the same OS thread, one right after the other,
//! with the context switch itself providing the synchronization.

use std::cell::Cell;
use std::time::Duration;

use fiber::{Fiber, FiberId};

use crate::counter::{AddWaiterOutcome, Counter};
use crate::error::{fatal, SchedulerError};
use crate::Scheduler;

const SPIN_ITERATIONS: u32 = 64;
const BACKOFF_INTERVAL: Duration = Duration::from_micros(200);

pub(crate) enum Disposition {
    /// The fiber that just suspended finished its task cleanly and should go back to the pool.
    ReturnToPool,
    /// The fiber that just suspended called `wait_for_counter` and should be parked.
    Park {
        counter: *const Counter,
        target: usize,
    },
    /// The fiber that just suspended is permanently retiring at shutdown; destroy its stack.
    Retire,
}

thread_local! {
    static SCHEDULER_PTR: Cell<*const Scheduler> = Cell::new(std::ptr::null());
    static DISPOSITION: Cell<Option<Disposition>> = Cell::new(None);
    static ROOT_FIBER: Cell<Option<Fiber>> = Cell::new(None);
    static ROOT_FIBER_ID: Cell<Option<FiberId>> = Cell::new(None);
}

pub(crate) fn set_disposition(disposition: Disposition) {
    DISPOSITION.with(|cell| cell.set(Some(disposition)));
}

/// Whether the fiber *currently* executing on this OS thread is a pool fiber rather than the
/// thread's own root/idle context.
///
/// Deliberately not a plain thread-local flag toggled around running a task: a fiber can suspend
/// mid-task on one OS thread and resume on another (per the crate's migration guarantee), so any
/// state meant to describe "this task is still in progress" has to be read off the fiber that's
/// actually running right now, not cached per-thread. Comparing the live `fiber::current()` id
/// against this thread's stashed root id is safe to re-derive after every switch for exactly that
/// reason.
pub(crate) fn in_task() -> bool {
    match (fiber::current(), ROOT_FIBER_ID.with(Cell::get)) {
        (Some(current), Some(root)) => current != root,
        _ => false,
    }
}

fn current_scheduler() -> &'static Scheduler {
    let ptr = SCHEDULER_PTR.with(Cell::get);
    debug_assert!(!ptr.is_null(), "worker fiber running without a scheduler");
    unsafe { &*ptr }
}

/// Runs once at the top of every fiber switch: applies whatever disposition the fiber we just
/// switched away from (`prev`) requested before it suspended.
///
/// The very first time this runs on a given OS thread, no disposition has ever been set, which
/// is how we recognize `prev` as the thread's original root context and stash it for the
/// eventual shutdown handoff back.
pub(crate) fn handle_handoff(scheduler: &Scheduler, prev: Fiber) {
    match DISPOSITION.with(|cell| cell.take()) {
        None => {
            ROOT_FIBER_ID.with(|cell| cell.set(Some(prev.id())));
            ROOT_FIBER.with(|cell| cell.set(Some(prev)));
        }
        Some(Disposition::ReturnToPool) => {
            scheduler.pool().release(prev);
        }
        Some(Disposition::Park { counter, target }) => {
            // Safety: the waiting task's stack frame (which owns the `&Counter` this pointer was
            // derived from) is suspended, not dropped, so the referent stays alive exactly as
            // long as `prev` itself does.
            let counter = unsafe { &*counter };
            match counter.add_waiter(prev, target) {
                Ok(AddWaiterOutcome::Parked) => {}
                Ok(AddWaiterOutcome::AlreadySatisfied(fiber)) => {
                    tracing::trace!("counter already satisfied, re-queuing fiber immediately");
                    scheduler.ready().push(fiber);
                }
                Err((_fiber, err)) => fatal(err),
            }
        }
        Some(Disposition::Retire) => {
            // Safety: a retiring fiber is never resumed again; the worker thread that owned it
            // is unwinding back to its root context in the same step.
            unsafe { prev.destroy() };
        }
    }
}

/// Picks the next unit of work and returns a fiber ready to `resume()`, spinning and then
/// parking while none is available. Returns `None` once shutdown has been signaled and no work
/// remains.
pub(crate) fn dispatch_next(scheduler: &Scheduler) -> Option<Fiber> {
    let mut spins = 0u32;
    loop {
        if let Some(fiber) = scheduler.ready().pop() {
            return Some(fiber);
        }

        if let Some(queued) = scheduler.queue().pop() {
            let fiber = match scheduler.pool().acquire() {
                Ok(fiber) => fiber,
                Err(err) => fatal(err),
            };
            PENDING_TASK.with(|cell| cell.set(Some(queued)));
            return Some(fiber);
        }

        if scheduler.is_shutting_down() {
            return None;
        }

        if spins < SPIN_ITERATIONS {
            spins += 1;
            std::hint::spin_loop();
        } else {
            scheduler.ready().wait_timeout(BACKOFF_INTERVAL);
        }
    }
}

thread_local! {
    static PENDING_TASK: Cell<Option<crate::queue::QueuedTask>> = Cell::new(None);
}

/// Entry point run by every worker OS thread. Blocks until the scheduler shuts down.
pub(crate) fn run_worker_thread(scheduler: &Scheduler) {
    fiber::init();
    SCHEDULER_PTR.with(|cell| cell.set(scheduler as *const Scheduler));

    if let Some(first) = dispatch_next(scheduler) {
        let prev = unsafe { first.resume() };
        handle_handoff(scheduler, prev);
    }
}

/// The function body every pooled fiber runs, forever, until it is retired at shutdown.
pub(crate) fn worker_fiber_proc(prev: Fiber) -> ! {
    let scheduler = current_scheduler();
    handle_handoff(scheduler, prev);

    loop {
        if let Some(queued) = PENDING_TASK.with(|cell| cell.take()) {
            run_queued_task(scheduler, queued);
        }

        set_disposition(Disposition::ReturnToPool);
        match dispatch_next(scheduler) {
            Some(next) => {
                let prev = unsafe { next.resume() };
                handle_handoff(scheduler, prev);
            }
            None => {
                set_disposition(Disposition::Retire);
                let root = ROOT_FIBER
                    .with(|cell| cell.take())
                    .expect("worker fiber retiring without a stashed root context");
                unsafe {
                    root.resume();
                }
                unreachable!("a retired worker fiber was resumed");
            }
        }
    }
}

fn run_queued_task(scheduler: &Scheduler, queued: crate::queue::QueuedTask) {
    queued.task.run(scheduler);

    if let Some(counter) = queued.counter {
        // Safety: see `Disposition::Park` above -- the submitter's contract requires the counter
        // to outlive every task it was handed to.
        let counter: &Counter = unsafe { &*counter };
        counter.fetch_sub(1);
    }
}

/// Called by [`Scheduler::wait_for_counter`](crate::Scheduler::wait_for_counter) to suspend the
/// calling task fiber until `counter` reaches `target`.
pub(crate) fn park_on_counter(
    scheduler: &Scheduler,
    counter: &Counter,
    target: usize,
) -> Result<(), SchedulerError> {
    if !in_task() {
        return Err(SchedulerError::OffFiberWait);
    }

    if counter.load() == target {
        return Ok(());
    }

    // Acquired directly from the pool rather than through `dispatch_next`: the switch must
    // happen regardless of whether other work happens to be available right now, because the
    // thing that makes the old fiber wake up again (`counter` reaching `target`) is published by
    // `handle_handoff`'s `Park` arm only *after* the switch completes. Gating the switch itself on
    // `dispatch_next` finding ready work would leave a window where the counter reaches `target`
    // before the fiber is parked and after nothing else is left to run, which no one would ever
    // notice -- a lost wakeup that deadlocks the whole run.
    let next = match scheduler.pool().acquire() {
        Ok(fiber) => fiber,
        Err(err) => fatal(err),
    };

    set_disposition(Disposition::Park {
        counter: counter as *const Counter,
        target,
    });

    let prev = unsafe { next.resume() };
    handle_handoff(scheduler, prev);
    Ok(())
}
