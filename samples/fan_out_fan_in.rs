//! Fans out 10,000 independent tasks that each bump a shared atomic counter, then fans back in
//! through the scheduler's own dependency counter before reporting the total.

use std::sync::atomic::{AtomicU64, Ordering};

use fibertask::{Scheduler, SchedulerConfig, Task, TaskBatch};

const TASK_COUNT: usize = 10_000;

fn increment(_scheduler: &Scheduler, arg: *mut ()) {
    let shared = unsafe { &*(arg as *const AtomicU64) };
    shared.fetch_add(1, Ordering::SeqCst);
}

struct MainArgs {
    shared: AtomicU64,
}

unsafe impl Send for MainArgs {}

fn main_task(scheduler: &Scheduler, arg: *mut ()) {
    let args = unsafe { &*(arg as *const MainArgs) };
    let counter = scheduler.new_counter(0);

    let tasks: Vec<Task> = (0..TASK_COUNT)
        .map(|_| Task::new(increment, &args.shared as *const AtomicU64 as *mut ()))
        .collect();

    scheduler
        .add_tasks(TaskBatch::with_counter(&tasks, &counter))
        .expect("add_tasks");
    scheduler
        .wait_for_counter(&counter, 0)
        .expect("wait_for_counter");

    println!(
        "shared counter after fan-out/fan-in: {}",
        args.shared.load(Ordering::SeqCst)
    );
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = MainArgs {
        shared: AtomicU64::new(0),
    };

    Scheduler::run(
        SchedulerConfig::new(),
        &[Task::new(main_task, &args as *const MainArgs as *mut ())],
    )
    .expect("scheduler run failed");

    assert_eq!(args.shared.load(Ordering::SeqCst), TASK_COUNT as u64);
}
