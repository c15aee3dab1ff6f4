//! Checks relative and periodic delays, aborting a delay, and manual tick
//! adjustment.
use rtbind::kernel::{prelude::*, CurrentTask, Task, TaskRef, TaskState};

use crate::{Driver, SeqTracker, System};

static SEQ: SeqTracker = SeqTracker::new();

pub fn app<D: Driver>() {
    let _sleeper = Task::<System<D>>::build()
        .name("sleeper")
        .priority(2)
        .spawn(sleeper_body::<D>);
    let _main = Task::<System<D>>::build()
        .name("main")
        .priority(1)
        .spawn(main_body::<D>);

    System::<D>::start_scheduler();
}

fn sleeper_body<D: Driver>(task: &CurrentTask<System<D>>) {
    SEQ.expect_and_replace(0, 1);
    task.delay(100); // aborted by `main`

    SEQ.expect_and_replace(2, 3);
    assert_eq!(System::<D>::tick_count(), 0);
    task.suspend_self();

    // Resumed by `main`
    SEQ.expect_and_replace(4, 5);
    task.delay(4);

    SEQ.expect_and_replace(6, 7);
    task.suspend_self();
}

fn main_body<D: Driver>(task: &CurrentTask<System<D>>) {
    SEQ.expect_and_replace(1, 2);
    let sleeper = TaskRef::<System<D>>::handle_by_name("sleeper").unwrap();
    assert_eq!(sleeper.state(), TaskState::Blocked);

    // `sleeper` has a higher priority and runs immediately
    assert!(sleeper.abort_delay());
    SEQ.expect_and_replace(3, 4);
    assert_eq!(sleeper.state(), TaskState::Suspended);
    assert!(!sleeper.abort_delay());

    // Relative delays
    assert_eq!(System::<D>::tick_count(), 0);
    task.delay(5);
    assert_eq!(System::<D>::tick_count(), 5);
    task.delay(0); // yield
    assert_eq!(System::<D>::tick_count(), 5);

    // Periodic delays are relative to the time the task started
    assert_eq!(task.previous_wake_time(), 0);
    assert!(task.delay_until(10));
    assert_eq!(System::<D>::tick_count(), 10);
    assert!(task.delay_until(10));
    assert_eq!(System::<D>::tick_count(), 20);

    // Fall behind by more than a period. The missed wake times are
    // skipped without delaying.
    task.delay(25);
    assert_eq!(System::<D>::tick_count(), 45);
    assert!(!task.delay_until(10));
    assert_eq!(task.previous_wake_time(), 30);
    assert!(!task.delay_until(10));
    assert_eq!(task.previous_wake_time(), 40);
    assert!(task.delay_until(10));
    assert_eq!(System::<D>::tick_count(), 50);

    // Manual tick adjustment. `step_tick` defers the context switch to the
    // next scheduling point.
    sleeper.resume();
    SEQ.expect_and_replace(5, 6);
    System::<D>::step_tick(4);
    assert_eq!(System::<D>::tick_count(), 54);
    assert_eq!(sleeper.state(), TaskState::Ready);
    System::<D>::yield_now();
    SEQ.expect_and_replace(7, 8);

    assert!(!System::<D>::catch_up_ticks(6));
    assert_eq!(System::<D>::tick_count(), 60);

    D::success();
}
