//! Checks one-shot and auto-reload timers, timer commands, and deletion.
use rtbind::kernel::{prelude::*, CurrentTask, HigherPriorityTaskWoken, Task, Timer};
use std::{
    pin::pin,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{Driver, System};

static ONE_SHOT_FIRED: AtomicUsize = AtomicUsize::new(0);
static PERIODIC_FIRED: AtomicUsize = AtomicUsize::new(0);
static STATIC_FIRED: AtomicUsize = AtomicUsize::new(0);

pub fn app<D: Driver>() {
    let _main = Task::<System<D>>::build()
        .name("main")
        .priority(1)
        .spawn(main_body::<D>);

    System::<D>::start_scheduler();
}

fn fired(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::Relaxed)
}

fn main_body<D: Driver>(task: &CurrentTask<System<D>>) {
    // One-shot
    let mut one_shot = Timer::<System<D>>::build(10)
        .name("one-shot")
        .spawn(|_: &Timer<System<D>>| {
            ONE_SHOT_FIRED.fetch_add(1, Ordering::Relaxed);
        });
    assert!(one_shot.is_valid());
    assert_eq!(one_shot.name(), "one-shot");
    assert_eq!(one_shot.period(), 10);
    assert!(!one_shot.reload_mode());
    assert!(!one_shot.is_active());

    let t0 = System::<D>::tick_count();
    assert!(one_shot.start(0));
    assert!(one_shot.is_active());
    assert_eq!(one_shot.expiry_time(), t0 + 10);
    task.delay(15);
    assert_eq!(fired(&ONE_SHOT_FIRED), 1);
    assert!(!one_shot.is_active());

    // Auto-reload
    let periodic = Timer::<System<D>>::build(5)
        .name("periodic")
        .auto_reload(true)
        .spawn(|timer: &Timer<System<D>>| {
            assert_eq!(timer.name(), "periodic");
            PERIODIC_FIRED.fetch_add(1, Ordering::Relaxed);
        });
    assert!(periodic.reload_mode());
    assert!(periodic.start(0));
    task.delay(22);
    assert_eq!(fired(&PERIODIC_FIRED), 4);
    assert!(periodic.is_active());
    assert!(periodic.stop(0));
    task.delay(10);
    assert_eq!(fired(&PERIODIC_FIRED), 4);

    // Changing the period restarts the timer
    assert!(!periodic.change_period(0, 0));
    assert!(!periodic.is_active());
    assert!(periodic.change_period(3, 0));
    assert!(periodic.is_active());
    assert_eq!(periodic.period(), 3);
    assert_eq!(
        periodic.expiry_time(),
        System::<D>::tick_count().wrapping_add(3)
    );
    periodic.set_reload_mode(false);
    task.delay(10);
    assert_eq!(fired(&PERIODIC_FIRED), 5);
    assert!(!periodic.is_active());

    // `reset` restarts the countdown
    assert!(one_shot.start(0));
    task.delay(7);
    assert!(one_shot.reset(0));
    task.delay(7);
    assert_eq!(fired(&ONE_SHOT_FIRED), 1);
    task.delay(4);
    assert_eq!(fired(&ONE_SHOT_FIRED), 2);

    // Commands from an interrupt handler wake up the timer service task
    let woken = rtbind_port_std::interrupt::<D::Traits, _>(|| {
        let mut woken = HigherPriorityTaskWoken::new();
        assert!(one_shot.start_from_isr(&mut woken));
        woken
    });
    assert!(woken.is_set());
    assert!(one_shot.is_active());

    // A deleted timer never fires
    assert!(one_shot.as_mut().delete(0));
    assert!(!one_shot.is_valid());
    task.delay(20);
    assert_eq!(fired(&ONE_SHOT_FIRED), 2);

    // Static storage
    let mut static_timer = pin!(Timer::<System<D>>::build(2)
        .name("static")
        .finish_static(|_: &Timer<System<D>>| {
            STATIC_FIRED.fetch_add(1, Ordering::Relaxed);
        }));
    assert!(static_timer.as_mut().init());
    assert!(static_timer.start(0));
    task.delay(3);
    assert_eq!(fired(&STATIC_FIRED), 1);
    assert!(static_timer.as_mut().delete(0));

    D::success();
}
