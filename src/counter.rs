//! The dependency-counter primitive tasks wait on.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::SchedulerError;
use crate::ready_list::ReadyFiberList;
use fiber::Fiber;

/// Number of fibers that may simultaneously wait on one [`Counter`].
///
/// A deliberate, documented bound rather than a growable list: if more than this many fibers try
/// to park on the same counter at once, [`Counter::add_waiter`] returns
/// [`SchedulerError::WaiterSlotsFull`], which the worker loop treats as a fatal precondition
/// violation. Widen this constant (and accept the larger per-counter footprint) if your
/// dependency graphs fan in more than four ways onto a single counter.
pub const WAITER_SLOTS: usize = 4;

struct WaiterSlot {
    fiber: Fiber,
    target: usize,
}

/// An atomically-updated integer that a fixed, small number of fibers can park on.
///
/// Counters are the only synchronization primitive application code touches directly. A task
/// that needs to wait for a batch of other tasks calls [`Scheduler::wait_for_counter`] (not a
/// method here -- that's where the actual fiber switch happens), which parks the calling fiber
/// here via `add_waiter` if the target hasn't already been reached. Whenever this counter's
/// value changes, every registered waiter whose `target` now matches is handed to the
/// scheduler's ready list so some worker can resume it.
///
/// [`Scheduler::wait_for_counter`]: crate::Scheduler::wait_for_counter
pub struct Counter {
    value: AtomicUsize,
    // The scan-on-update in `modify_and_scan` and the re-check in `add_waiter` must observe a
    // consistent view of both the value and the waiter slots, so both are guarded by the same
    // lock rather than updated independently.
    waiters: Mutex<[Option<WaiterSlot>; WAITER_SLOTS]>,
    ready: ReadyFiberList,
}

impl Counter {
    /// Creates a new counter starting at `initial`, bound to the scheduler's ready list so that
    /// satisfied waiters can be published for other workers to pick up.
    pub(crate) fn new(initial: usize, ready: ReadyFiberList) -> Counter {
        Counter {
            value: AtomicUsize::new(initial),
            waiters: Mutex::new([(); WAITER_SLOTS].map(|_| None)),
            ready,
        }
    }

    /// Returns the counter's current value.
    pub fn load(&self) -> usize {
        self.value.load(Ordering::SeqCst)
    }

    /// Sets the counter to `value`, waking any waiters whose target it now matches.
    pub fn store(&self, value: usize) {
        self.modify_and_scan(|_| value);
    }

    /// Adds `amount` to the counter, returning the prior value.
    pub fn fetch_add(&self, amount: usize) -> usize {
        self.modify_and_scan(|old| old + amount)
    }

    /// Subtracts `amount` from the counter, returning the prior value.
    ///
    /// Panics on underflow: a task completion decrementing a counter past zero means the batch
    /// bookkeeping has a bug, and continuing silently would make that bug far harder to find.
    pub fn fetch_sub(&self, amount: usize) -> usize {
        self.modify_and_scan(|old| {
            old.checked_sub(amount)
                .expect("fibertask: counter underflowed")
        })
    }

    fn modify_and_scan(&self, update: impl FnOnce(usize) -> usize) -> usize {
        let mut waiters = self.waiters.lock();
        let old = self.value.load(Ordering::SeqCst);
        let new = update(old);
        self.value.store(new, Ordering::SeqCst);

        for slot in waiters.iter_mut() {
            let matches = slot.as_ref().is_some_and(|s| s.target == new);
            if matches {
                let woken = slot.take().unwrap();
                tracing::debug!(fiber = ?woken.fiber.id(), target = new, "counter reached waiter's target");
                self.ready.push(woken.fiber);
            }
        }

        old
    }

    /// Registers `fiber` to be resumed (via the ready list) once this counter reaches `target`.
    ///
    /// Called by the worker loop immediately after it has switched away from the waiting fiber
    /// (the post-switch hook): re-checks the value after installing the slot and returns
    /// [`AddWaiterOutcome::AlreadySatisfied`] -- handing `fiber` back to the caller -- if another
    /// update landed in the meantime, so no wakeup is ever lost to that race.
    pub(crate) fn add_waiter(
        &self,
        fiber: Fiber,
        target: usize,
    ) -> Result<AddWaiterOutcome, (Fiber, SchedulerError)> {
        let mut waiters = self.waiters.lock();

        if self.value.load(Ordering::SeqCst) == target {
            return Ok(AddWaiterOutcome::AlreadySatisfied(fiber));
        }

        let slot = match waiters.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => slot,
            None => {
                return Err((
                    fiber,
                    SchedulerError::WaiterSlotsFull {
                        limit: WAITER_SLOTS,
                    },
                ))
            }
        };
        *slot = Some(WaiterSlot { fiber, target });

        // Re-check after installing: if a concurrent `modify_and_scan` ran between our first
        // load and taking the lock just now it would have scanned a slot array that didn't yet
        // contain ours, so we must re-test the predicate ourselves before releasing the lock.
        if self.value.load(Ordering::SeqCst) == target {
            let fiber = slot.take().unwrap().fiber;
            return Ok(AddWaiterOutcome::AlreadySatisfied(fiber));
        }

        Ok(AddWaiterOutcome::Parked)
    }
}

pub(crate) enum AddWaiterOutcome {
    Parked,
    AlreadySatisfied(Fiber),
}
