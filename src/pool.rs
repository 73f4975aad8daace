//! The fixed-size free list of reusable worker fibers.

use crossbeam_queue::ArrayQueue;
use fiber::Fiber;

use crate::error::SchedulerError;

/// A bounded free list of fibers, pre-allocated once at [`Scheduler::run`](crate::Scheduler::run)
/// startup and reused for the lifetime of the run.
///
/// Every fiber handed out by [`acquire`](FiberPool::acquire) is expected back via
/// [`release`](FiberPool::release) once it finishes the work it was given and has no further use
/// for its stack; `release` should never be called with a fiber that's still mid-task.
pub(crate) struct FiberPool {
    free: ArrayQueue<Fiber>,
    capacity: usize,
}

impl FiberPool {
    /// Allocates `capacity` fibers up front, each running `fiber_proc` once first resumed and
    /// sized at `stack_size` bytes.
    pub(crate) fn new(capacity: usize, stack_size: usize, fiber_proc: fn(Fiber) -> !) -> FiberPool {
        let free = ArrayQueue::new(capacity);
        for _ in 0..capacity {
            let fiber = Fiber::new(stack_size, fiber_proc);
            // Capacity matches the loop bound exactly, so this can never fail.
            free.push(fiber)
                .unwrap_or_else(|_| unreachable!("fiber pool overfilled during initialization"));
        }

        FiberPool { free, capacity }
    }

    /// Takes a fiber out of the free list, if one is available.
    ///
    /// Returning `None` here is treated by the worker loop as pool exhaustion -- a fatal
    /// precondition violation, since every fiber this pool ever hands out is always eventually
    /// returned via [`release`](FiberPool::release), so running dry means more fibers are
    /// simultaneously in flight than `fiber_pool_size` allows for.
    pub(crate) fn acquire(&self) -> Result<Fiber, SchedulerError> {
        self.free.pop().ok_or(SchedulerError::PoolExhausted {
            pool_size: self.capacity,
        })
    }

    /// Returns a finished fiber to the free list.
    pub(crate) fn release(&self, fiber: Fiber) {
        if self.free.push(fiber).is_err() {
            unreachable!("fiber pool received more fibers back than it ever handed out");
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Destroys every fiber currently sitting in the free list.
    ///
    /// Called once, after every worker thread has joined at the end of `Scheduler::run`. Each
    /// worker thread destroys its own current (idle) fiber as it retires; this cleans up the
    /// rest, which were sitting unused in the free list when shutdown was signaled.
    pub(crate) fn drain_and_destroy(&self) {
        while let Some(fiber) = self.free.pop() {
            unsafe {
                fiber.destroy();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fiber_proc(mut suspended: Fiber) -> ! {
        loop {
            suspended = unsafe { suspended.resume() };
        }
    }

    #[test]
    fn acquire_then_release_round_trips() {
        let pool = FiberPool::new(2, 64 * 1024, fiber_proc);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert!(pool.acquire().is_err());
        pool.release(a);
        pool.release(b);
        assert!(pool.acquire().is_ok());
        assert!(pool.acquire().is_ok());
    }
}
