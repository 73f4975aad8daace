use criterion::{criterion_group, criterion_main, Criterion};

use fibertask::{Scheduler, SchedulerConfig, Task, TaskBatch};

fn noop_task(_scheduler: &Scheduler, _arg: *mut ()) {}

fn fan_out_noop_tasks(scheduler: &Scheduler, _arg: *mut ()) {
    let counter = scheduler.new_counter(0);
    let tasks = [Task::new(noop_task, std::ptr::null_mut()); 1_000];
    scheduler
        .add_tasks(TaskBatch::with_counter(&tasks, &counter))
        .expect("add_tasks");
    scheduler
        .wait_for_counter(&counter, 0)
        .expect("wait_for_counter");
}

fn fan_out_fan_in_1000(c: &mut Criterion) {
    c.bench_function("run 1000 noop tasks through one fan-out/fan-in", |b| {
        b.iter(|| {
            Scheduler::run(
                SchedulerConfig::default(),
                &[Task::new(fan_out_noop_tasks, std::ptr::null_mut())],
            )
            .expect("scheduler run failed");
        });
    });
}

fn single_task_run(c: &mut Criterion) {
    c.bench_function("run a single no-op task end to end", |b| {
        b.iter(|| {
            Scheduler::run(
                SchedulerConfig::default(),
                &[Task::new(noop_task, std::ptr::null_mut())],
            )
            .expect("scheduler run failed");
        });
    });
}

criterion_group!(benches, single_task_run, fan_out_fan_in_1000);
criterion_main!(benches);
