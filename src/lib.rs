//! A fiber-based task scheduler: a fixed pool of worker threads runs application-submitted
//! tasks on cooperatively-switched fibers, so a task waiting on other tasks never blocks the
//! underlying OS thread.
//!
//! The basic flow: call [`Scheduler::run`] with an initial batch of [`Task`]s and a
//! [`SchedulerConfig`]. From within a running task, call [`Scheduler::add_tasks`] to submit more
//! work (optionally tied to a [`Counter`] for fan-in) and [`Scheduler::wait_for_counter`] to
//! suspend until that counter reaches a target value. `Scheduler::run` returns once every task
//! reachable from the initial batch has completed.

mod config;
mod counter;
mod error;
mod pool;
mod queue;
mod ready_list;
mod scheduler;
mod task;
mod worker;

pub use config::SchedulerConfig;
pub use counter::Counter;
pub use error::SchedulerError;
pub use scheduler::Scheduler;
pub use task::{Task, TaskBatch};
