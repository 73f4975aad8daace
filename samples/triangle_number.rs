//! Computes a large triangle number by splitting the sum into fixed-size chunks and running
//! each chunk as its own task, fanning back in through a counter before printing the total.

use fibertask::{Scheduler, SchedulerConfig, Task, TaskBatch};

const N: u64 = 47_593_243;
const CHUNK: u64 = 10_000;

struct ChunkJob {
    start: u64,
    end: u64,
    partial: *mut u64,
}

// Safety: `partial` always points into the `partials` vec owned by `main_task`'s stack, which
// stays alive for as long as the scheduler run does because `main_task` doesn't return until
// every chunk task has written its slot.
unsafe impl Send for ChunkJob {}

fn sum_chunk(_scheduler: &Scheduler, arg: *mut ()) {
    let job = unsafe { Box::from_raw(arg as *mut ChunkJob) };
    let mut sum = 0u64;
    let mut i = job.start + 1;
    while i <= job.end {
        sum += i;
        i += 1;
    }
    unsafe {
        *job.partial = sum;
    }
}

struct MainArgs {
    result: *mut u64,
}

unsafe impl Send for MainArgs {}

fn main_task(scheduler: &Scheduler, arg: *mut ()) {
    let args = unsafe { &*(arg as *const MainArgs) };

    let chunk_count = ((N + CHUNK - 1) / CHUNK) as usize;
    let mut partials = vec![0u64; chunk_count];
    let counter = scheduler.new_counter(0);

    let tasks: Vec<Task> = (0..chunk_count)
        .map(|i| {
            let start = i as u64 * CHUNK;
            let end = ((i as u64 + 1) * CHUNK).min(N);
            let job = Box::new(ChunkJob {
                start,
                end,
                partial: &mut partials[i] as *mut u64,
            });
            Task::new(sum_chunk, Box::into_raw(job) as *mut ())
        })
        .collect();

    scheduler
        .add_tasks(TaskBatch::with_counter(&tasks, &counter))
        .expect("add_tasks");
    scheduler
        .wait_for_counter(&counter, 0)
        .expect("wait_for_counter");

    unsafe {
        *args.result = partials.iter().sum();
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let mut result = 0u64;
    let args = MainArgs {
        result: &mut result as *mut u64,
    };

    Scheduler::run(
        SchedulerConfig::new(),
        &[Task::new(main_task, &args as *const MainArgs as *mut ())],
    )
    .expect("scheduler run failed");

    let expected = N * (N + 1) / 2;
    println!("T({N}) = {result} (expected {expected})");
    assert_eq!(result, expected);
}
