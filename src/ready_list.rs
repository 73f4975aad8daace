//! The list of fibers that are ready to resume running.

use std::sync::Arc;

use crossbeam_queue::SegQueue;
use fiber::Fiber;
use parking_lot::{Condvar, Mutex};

/// A cheaply-cloneable handle to the scheduler's ready fiber list.
///
/// Held by every [`Counter`](crate::counter::Counter) and by the worker loop itself, so a fiber
/// parked on a counter can be handed back to the same list a freshly-queued [`Task`] waits on.
/// Cloning shares the underlying queue and idle-wait condvar; it does not duplicate them.
#[derive(Clone)]
pub(crate) struct ReadyFiberList {
    inner: Arc<Inner>,
}

struct Inner {
    queue: SegQueue<Fiber>,
    idle: Mutex<()>,
    condvar: Condvar,
}

impl ReadyFiberList {
    pub(crate) fn new() -> ReadyFiberList {
        ReadyFiberList {
            inner: Arc::new(Inner {
                queue: SegQueue::new(),
                idle: Mutex::new(()),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Publishes `fiber` as ready to run and wakes one idle worker.
    pub(crate) fn push(&self, fiber: Fiber) {
        self.inner.queue.push(fiber);
        let _guard = self.inner.idle.lock();
        self.inner.condvar.notify_one();
    }

    /// Takes the next ready fiber, if any, without blocking.
    pub(crate) fn pop(&self) -> Option<Fiber> {
        self.inner.queue.pop()
    }

    /// Parks the calling worker thread until woken by a `push` or `notify_all`, or until
    /// `timeout` elapses -- whichever comes first. Used by the worker loop's backoff strategy
    /// after a few spin iterations have failed to find any work.
    pub(crate) fn wait_timeout(&self, timeout: std::time::Duration) {
        let mut guard = self.inner.idle.lock();
        self.inner.condvar.wait_for(&mut guard, timeout);
    }

    /// Wakes every worker parked in `wait_timeout`, used during shutdown so no worker is left
    /// sleeping past the point `Scheduler::run` is ready to join it.
    pub(crate) fn notify_all(&self) {
        let _guard = self.inner.idle.lock();
        self.inner.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pop_round_trips() {
        fn fiber_proc(mut suspended: Fiber) -> ! {
            loop {
                suspended = unsafe { suspended.resume() };
            }
        }

        let list = ReadyFiberList::new();
        let fiber = Fiber::new(64 * 1024, fiber_proc);
        let id = fiber.id();
        list.push(fiber);
        let popped = list.pop().expect("fiber should be in the list");
        assert_eq!(popped.id(), id);
        assert!(list.pop().is_none());
    }
}
