//! The entry point tying the task queue, fiber pool, and counters into a running scheduler.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::SchedulerConfig;
use crate::counter::Counter;
use crate::error::SchedulerError;
use crate::pool::FiberPool;
use crate::queue::TaskQueue;
use crate::ready_list::ReadyFiberList;
use crate::task::{Task, TaskBatch};
use crate::worker;

/// The running instance of the fiber-based task scheduler.
///
/// There is no long-lived handle to a `Scheduler` returned to callers: [`Scheduler::run`]
/// constructs one, drives it to completion of the tasks it was given, and tears it down again
/// before returning. Application code only ever sees `&Scheduler` references, passed into task
/// functions, used to call [`add_tasks`](Scheduler::add_tasks) and
/// [`wait_for_counter`](Scheduler::wait_for_counter).
pub struct Scheduler {
    queue: TaskQueue,
    pool: FiberPool,
    ready: ReadyFiberList,
    shutdown: AtomicBool,
    config: SchedulerConfig,
    root_counter: Counter,
}

impl Scheduler {
    /// Starts the scheduler: allocates the fiber pool, submits `initial_tasks`, spawns
    /// `config.worker_thread_count - 1` additional worker threads, and runs the Worker Loop on
    /// the calling thread itself -- so a default config puts exactly one worker per logical CPU
    /// to work, rather than leaving the caller idle while an extra thread does everything. Blocks
    /// until every task transitively reachable from `initial_tasks` (through nested
    /// `add_tasks`/`wait_for_counter` calls) has completed, then joins the other workers and
    /// destroys all pooled fibers before returning.
    pub fn run(config: SchedulerConfig, initial_tasks: &[Task]) -> Result<(), SchedulerError> {
        config.validate()?;

        let ready = ReadyFiberList::new();
        let pool = FiberPool::new(
            config.fiber_pool_size,
            config.fiber_stack_size,
            worker::worker_fiber_proc,
        );
        let queue = TaskQueue::new(config.task_queue_capacity);
        // `add_tasks` itself stores the batch length into the counter (see its doc comment), so
        // the counter starts at zero here rather than double-counting the initial batch.
        let root_counter = Counter::new(0, ready.clone());

        let scheduler = Scheduler {
            queue,
            pool,
            ready,
            shutdown: AtomicBool::new(false),
            config,
            root_counter,
        };

        scheduler.add_tasks(TaskBatch::with_counter(initial_tasks, &scheduler.root_counter))?;

        tracing::info!(
            workers = scheduler.config.worker_thread_count,
            tasks = initial_tasks.len(),
            "scheduler run starting"
        );

        std::thread::scope(|scope| {
            for worker_index in 1..scheduler.config.worker_thread_count {
                let scheduler = &scheduler;
                scope.spawn(move || {
                    tracing::trace!(worker = worker_index, "worker thread starting");
                    worker::run_worker_thread(scheduler);
                    tracing::trace!(worker = worker_index, "worker thread exiting");
                });
            }

            tracing::trace!(worker = 0, "calling thread entering worker loop");
            worker::run_worker_thread(&scheduler);
            tracing::trace!(worker = 0, "calling thread exiting worker loop");
        });

        scheduler.pool.drain_and_destroy();
        tracing::info!("scheduler run complete");
        Ok(())
    }

    /// Submits a batch of tasks for workers to run.
    ///
    /// If `batch` carries a counter, its full length is added to the counter before any task in
    /// the batch becomes visible in the queue, so a worker can never finish a task and observe
    /// its sibling's contribution to the counter as missing.
    pub fn add_tasks(&self, batch: TaskBatch) -> Result<(), SchedulerError> {
        if let Some(counter) = batch.counter {
            counter.fetch_add(batch.tasks.len());
        }

        let counter_ptr = batch.counter.map(|counter| counter as *const Counter);
        match self.queue.push_batch(batch.tasks, counter_ptr) {
            Ok(()) => {
                self.ready.notify_all();
                Ok(())
            }
            Err(err) => {
                if let Some(counter) = batch.counter {
                    counter.fetch_sub(batch.tasks.len());
                }
                Err(err)
            }
        }
    }

    /// Suspends the calling task until `counter` reaches `target`, letting the worker thread
    /// pick up other ready work in the meantime.
    ///
    /// Returns [`SchedulerError::OffFiberWait`] if called other than from within a task function
    /// -- there is no fiber to suspend and resume later if the caller isn't running on one.
    pub fn wait_for_counter(&self, counter: &Counter, target: usize) -> Result<(), SchedulerError> {
        worker::park_on_counter(self, counter, target)
    }

    pub(crate) fn pool(&self) -> &FiberPool {
        &self.pool
    }

    pub(crate) fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub(crate) fn ready(&self) -> &ReadyFiberList {
        &self.ready
    }

    /// Whether workers should stop looking for new work once the ready list and task queue run
    /// dry.
    ///
    /// There's no longer a dedicated thread whose job is to notice the root counter reaching zero
    /// and flip a flag -- the calling thread is itself a worker now. So any worker that finds
    /// itself with nothing left to do checks the root counter directly here; the first one to see
    /// it hit zero latches `shutdown` and wakes whoever else might be parked in
    /// [`ReadyFiberList::wait_timeout`](crate::ready_list::ReadyFiberList::wait_timeout). Every
    /// task still in the queue or ready list by that point is guaranteed to have been enqueued
    /// before the root counter could reach zero (it can only reach zero after every initial task
    /// returns, and a task can only enqueue descendants while it's still running), so this never
    /// cuts off work that hasn't been submitted yet.
    pub(crate) fn is_shutting_down(&self) -> bool {
        if self.shutdown.load(Ordering::SeqCst) {
            return true;
        }

        if self.root_counter.load() == 0 {
            self.shutdown.store(true, Ordering::SeqCst);
            self.ready.notify_all();
            return true;
        }

        false
    }

    /// Creates a counter bound to this scheduler's ready list, for application code that wants
    /// its own fan-in point separate from whatever counter a task batch was submitted with.
    pub fn new_counter(&self, initial: usize) -> Counter {
        Counter::new(initial, self.ready.clone())
    }
}
