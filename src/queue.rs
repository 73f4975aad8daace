//! The shared, multi-producer multi-consumer queue of runnable tasks.

use crossbeam_queue::SegQueue;

use crate::counter::Counter;
use crate::error::SchedulerError;
use crate::task::Task;

/// A task plus the counter (if any) to decrement once it finishes running.
///
/// The counter is carried as a raw pointer rather than a borrow so `QueuedTask` can sit in the
/// queue without infecting [`TaskQueue`] with a lifetime parameter. Soundness relies on the same
/// contract [`Scheduler::add_tasks`](crate::Scheduler::add_tasks) documents: a counter passed
/// alongside a batch must outlive every task in that batch, which in practice means the
/// submitting fiber waits on it before returning.
pub(crate) struct QueuedTask {
    pub(crate) task: Task,
    pub(crate) counter: Option<*const Counter>,
}

// Safety: see the note on `Task`'s own `Send` impl; the same reasoning extends to the counter
// pointer, which is only ever dereferenced on whichever worker thread runs this task.
unsafe impl Send for QueuedTask {}

/// A lock-free FIFO of pending tasks, optionally capped at a configured capacity.
///
/// Every worker thread both pushes (via [`Scheduler::add_tasks`](crate::Scheduler::add_tasks))
/// and pops (from its own idle loop) this same queue; `crossbeam_queue::SegQueue` already
/// provides the fine-grained, contention-tolerant synchronization this requires without an
/// explicit lock.
pub(crate) struct TaskQueue {
    queue: SegQueue<QueuedTask>,
    capacity: Option<usize>,
    len: std::sync::atomic::AtomicUsize,
}

impl TaskQueue {
    pub(crate) fn new(capacity: Option<usize>) -> TaskQueue {
        TaskQueue {
            queue: SegQueue::new(),
            capacity,
            len: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Pushes `tasks` onto the queue, failing the whole batch without pushing any of it if doing
    /// so would exceed a configured capacity.
    pub(crate) fn push_batch(
        &self,
        tasks: &[Task],
        counter: Option<*const Counter>,
    ) -> Result<(), SchedulerError> {
        use std::sync::atomic::Ordering;

        if let Some(capacity) = self.capacity {
            let current = self.len.load(Ordering::SeqCst);
            if current + tasks.len() > capacity {
                return Err(SchedulerError::QueueOverflow { capacity });
            }
        }

        for task in tasks {
            self.queue.push(QueuedTask {
                task: *task,
                counter,
            });
        }
        self.len.fetch_add(tasks.len(), Ordering::SeqCst);
        tracing::debug!(count = tasks.len(), "pushed task batch onto queue");
        Ok(())
    }

    pub(crate) fn pop(&self) -> Option<QueuedTask> {
        let queued = self.queue.pop();
        if queued.is_some() {
            self.len.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        }
        queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Scheduler;

    fn noop(_: &Scheduler, _: *mut ()) {}

    #[test]
    fn push_then_pop_preserves_order() {
        let queue = TaskQueue::new(None);
        let tasks = [Task::new(noop, std::ptr::null_mut()); 3];
        queue.push_batch(&tasks, None).unwrap();
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn bounded_queue_rejects_overflowing_batch() {
        let queue = TaskQueue::new(Some(2));
        let tasks = [Task::new(noop, std::ptr::null_mut()); 3];
        assert!(matches!(
            queue.push_batch(&tasks, None),
            Err(SchedulerError::QueueOverflow { capacity: 2 })
        ));
        assert!(queue.pop().is_none());
    }
}
