//! Error types surfaced by the scheduler.

use thiserror::Error;

/// A fatal precondition violation raised while the scheduler is running.
///
/// Per the failure-semantics policy these describe bugs in how the scheduler is being used (a
/// counter with more waiters than slots, a task queue configured with a capacity that's been
/// exceeded) or a platform primitive failing in a way that leaves no safe path forward. The
/// worker loop does not attempt local recovery for these: it logs full diagnostic state and
/// calls [`fatal`], which aborts the process. `Scheduler::run` and `Scheduler::add_tasks`
/// surface them as an ordinary `Result` so callers who *can* recover (e.g. reject a caller's
/// oversized batch before submitting it) have the chance to.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A counter already has [`WAITER_SLOTS`](crate::counter::WAITER_SLOTS) fibers parked on it.
    #[error("counter has no free waiter slots (limit is {limit} concurrent waiters)")]
    WaiterSlotsFull { limit: usize },

    /// The fiber pool has no free fibers to hand out.
    #[error("fiber pool exhausted (configured size is {pool_size})")]
    PoolExhausted { pool_size: usize },

    /// A bounded task queue would exceed its configured capacity.
    #[error("task queue would exceed its configured capacity of {capacity}")]
    QueueOverflow { capacity: usize },

    /// `Scheduler::wait_for_counter` was called from a worker thread's root context rather than
    /// from a task running on a fiber.
    #[error("wait_for_counter called off-fiber; only task fibers may wait on a counter")]
    OffFiberWait,

    /// A platform primitive (thread spawn, stack or guard-page allocation) failed during setup.
    #[error("platform failure during scheduler startup: {0}")]
    Platform(#[from] std::io::Error),

    /// A [`SchedulerConfig`](crate::config::SchedulerConfig) value was invalid.
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),
}

impl SchedulerError {
    /// Stringifies this error's diagnostic fields for inclusion in a `tracing::error!` event,
    /// separate from `Display` so the error message itself stays short.
    pub(crate) fn diagnostic_fields(&self) -> String {
        format!("{self:?}")
    }
}

/// Logs `err` with full diagnostic context and aborts the process.
///
/// Called only for the precondition violations in §7 that have no safe recovery (pool
/// exhaustion mid-run, a counter's waiter slots overflowing, an off-fiber wait). Never called
/// for ordinary setup failures, which are returned as `Result` instead.
pub(crate) fn fatal(err: SchedulerError) -> ! {
    tracing::error!(error = %err, fields = %err.diagnostic_fields(), "fatal scheduler precondition violation, aborting");
    std::process::abort();
}
