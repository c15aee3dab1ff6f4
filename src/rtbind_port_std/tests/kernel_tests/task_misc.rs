//! Checks task lookup, priorities, suspension, and self-deletion.
use rtbind::kernel::{prelude::*, CurrentTask, Task, TaskRef, TaskState};
use rtbind_port_std::{MAX_PRIORITIES, TIMER_TASK_PRIORITY};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{Driver, SeqTracker, System};

static SEQ: SeqTracker = SeqTracker::new();
static WORKER_RUNS: AtomicUsize = AtomicUsize::new(0);

pub fn app<D: Driver>() {
    let _main = Task::<System<D>>::build()
        .name("main")
        .priority(2)
        .stack_depth(256)
        .spawn(main_body::<D>);
    let _worker = Task::<System<D>>::build()
        .name("worker")
        .priority(1)
        .spawn(worker_body::<D>);
    let _victim = Task::<System<D>>::build()
        .name("victim")
        .priority(1)
        .spawn(victim_body::<D>);

    assert_eq!(System::<D>::number_of_tasks(), 3);
    System::<D>::start_scheduler();
}

fn main_body<D: Driver>(task: &CurrentTask<System<D>>) {
    SEQ.expect_and_replace(0, 1);

    assert_eq!(task.name(), "main");
    assert_eq!(task.priority(), 2);
    assert_eq!(task.state(), TaskState::Running);
    assert_eq!(task.stack_high_water_mark(), 256);
    assert_eq!(TaskRef::<System<D>>::current(), Some(task.task().to_ref()));
    assert_eq!(
        TaskRef::<System<D>>::handle_by_name("main").map(TaskRef::id),
        Some(task.id())
    );
    assert_eq!(TaskRef::<System<D>>::handle_by_name("nobody"), None);

    // The system tasks are created by `start_scheduler`
    assert_eq!(System::<D>::number_of_tasks(), 5);
    let idle = TaskRef::<System<D>>::idle_handle().unwrap();
    assert_eq!(idle.name(), "IDLE");
    assert_eq!(idle.priority(), 0);
    assert_eq!(idle.state(), TaskState::Ready);
    let timer_service = TaskRef::<System<D>>::handle_by_name("Tmr Svc").unwrap();
    assert_eq!(timer_service.priority(), TIMER_TASK_PRIORITY);

    let worker = TaskRef::<System<D>>::handle_by_name("worker").unwrap();
    let victim = TaskRef::<System<D>>::handle_by_name("victim").unwrap();
    assert_eq!(worker.state(), TaskState::Ready);
    assert_eq!(WORKER_RUNS.load(Ordering::Relaxed), 0);

    // Raising `worker` above us switches to it immediately
    worker.set_priority(3);
    assert_eq!(WORKER_RUNS.load(Ordering::Relaxed), 1);
    assert_eq!(worker.state(), TaskState::Suspended);
    assert_eq!(worker.priority(), 3);

    worker.resume();
    assert_eq!(WORKER_RUNS.load(Ordering::Relaxed), 2);
    assert_eq!(worker.state(), TaskState::Suspended);

    // Suspension doesn't nest
    worker.suspend();
    worker.resume();
    assert_eq!(WORKER_RUNS.load(Ordering::Relaxed), 3);

    // Nothing to abort
    assert!(!worker.abort_delay());

    // Out-of-range priorities are clamped
    worker.set_priority(100);
    assert_eq!(worker.priority(), MAX_PRIORITIES - 1);

    // Let `victim` run
    SEQ.expect_and_replace(1, 2);
    task.delay(1);
    SEQ.expect_and_replace(3, 4);

    assert_eq!(victim.state(), TaskState::Deleted);
    assert_eq!(System::<D>::number_of_tasks(), 4);
    assert_eq!(TaskRef::<System<D>>::handle_by_name("victim"), None);

    D::success();
}

fn worker_body<D: Driver>(task: &CurrentTask<System<D>>) {
    WORKER_RUNS.fetch_add(1, Ordering::Relaxed);
    task.suspend_self();
}

fn victim_body<D: Driver>(task: &CurrentTask<System<D>>) {
    SEQ.expect_and_replace(2, 3);
    assert_eq!(task.state(), TaskState::Running);
    task.delete_self();
}
