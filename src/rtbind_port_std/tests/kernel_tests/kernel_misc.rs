//! Checks the kernel control surface: scheduler state, critical sections,
//! interrupt masking, and the interrupt context.
use rtbind::kernel::{prelude::*, CurrentTask, KernelVersion, SchedulerState, Task};

use crate::{Driver, SeqTracker, System};

static SEQ: SeqTracker = SeqTracker::new();

pub fn app<D: Driver>() {
    assert_eq!(
        System::<D>::VERSION,
        KernelVersion {
            major: 0,
            minor: 1,
            build: 0
        }
    );
    assert_eq!(System::<D>::VERSION_NUMBER, "0.1.0");
    assert_eq!(System::<D>::VERSION.to_string(), System::<D>::VERSION_NUMBER);
    assert_eq!(
        System::<D>::scheduler_state(),
        SchedulerState::NotStarted
    );
    assert_eq!(System::<D>::tick_count(), 0);
    assert_eq!(System::<D>::idle_run_time_counter(), 0);

    let _high = Task::<System<D>>::build()
        .name("high")
        .priority(2)
        .spawn(high_body::<D>);
    let _main = Task::<System<D>>::build()
        .name("main")
        .priority(1)
        .spawn(main_body::<D>);

    System::<D>::start_scheduler();
    assert_eq!(
        System::<D>::scheduler_state(),
        SchedulerState::NotStarted
    );
}

fn high_body<D: Driver>(task: &CurrentTask<System<D>>) {
    SEQ.expect_and_replace(0, 1);
    task.delay(2);
    SEQ.expect_and_replace(2, 3);
    task.delay(2);
    SEQ.expect_and_replace(4, 5);
    task.suspend_self();
}

fn main_body<D: Driver>(task: &CurrentTask<System<D>>) {
    SEQ.expect_and_replace(1, 2);
    assert_eq!(System::<D>::scheduler_state(), SchedulerState::Running);
    assert!(!System::<D>::is_interrupt_context());

    // A critical section holds off the preemption by `high`
    System::<D>::enter_critical();
    System::<D>::enter_critical();
    System::<D>::step_tick(2);
    unsafe { System::<D>::exit_critical() };
    assert_eq!(SEQ.get(), 2);
    unsafe { System::<D>::exit_critical() };
    SEQ.expect_and_replace(3, 4);

    // So does masking interrupts
    System::<D>::disable_interrupts();
    assert!(!System::<D>::catch_up_ticks(2));
    assert_eq!(SEQ.get(), 4);
    unsafe { System::<D>::enable_interrupts() };
    SEQ.expect_and_replace(5, 6);
    assert_eq!(System::<D>::tick_count(), 4);

    // Interrupt context
    let (in_isr, ticks) = rtbind_port_std::interrupt::<D::Traits, _>(|| {
        let mask = System::<D>::enter_critical_from_isr();
        let result = (
            System::<D>::is_interrupt_context(),
            System::<D>::tick_count_from_isr(),
        );
        unsafe { System::<D>::exit_critical_from_isr(mask) };
        result
    });
    assert!(in_isr);
    assert_eq!(ticks, 4);
    assert!(!System::<D>::is_interrupt_context());

    // Nothing has idled so far. Every tick came from `step_tick` and
    // `catch_up_ticks`.
    assert_eq!(System::<D>::idle_run_time_counter(), 0);

    // `high` is suspended, so the idle task runs through our delay
    task.delay(3);
    assert_eq!(System::<D>::tick_count(), 7);
    assert_eq!(System::<D>::idle_run_time_counter(), 3);

    D::success();
}
