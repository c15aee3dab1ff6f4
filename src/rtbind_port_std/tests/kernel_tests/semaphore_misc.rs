//! Checks binary and counting semaphores, and how giving a semaphore
//! dispatches a waiting task in various contexts.
use rtbind::kernel::{
    prelude::*, BinarySemaphore, CountingSemaphore, CurrentTask, HigherPriorityTaskWoken,
    SchedulerState, StaticBinarySemaphore, StaticCountingSemaphore, Task, MAX_DELAY,
};
use std::{
    pin::pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use crate::{Driver, System};

static TAKEN: AtomicUsize = AtomicUsize::new(0);

pub fn app<D: Driver>() {
    let sem = Arc::new(BinarySemaphore::<System<D>>::new());

    let _waiter = Task::<System<D>>::build()
        .name("waiter")
        .priority(2)
        .spawn({
            let sem = Arc::clone(&sem);
            move |_: &CurrentTask<System<D>>| {
                if sem.take(MAX_DELAY) {
                    TAKEN.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
    let _main = Task::<System<D>>::build()
        .name("main")
        .priority(1)
        .spawn(move |_: &CurrentTask<System<D>>| main_body::<D>(&sem));

    System::<D>::start_scheduler();
}

fn taken() -> usize {
    TAKEN.load(Ordering::Relaxed)
}

fn main_body<D: Driver>(sem: &BinarySemaphore<System<D>>) {
    // Counting semaphore
    let counting = CountingSemaphore::<System<D>>::new(5, 2);
    assert!(counting.is_valid());
    assert_eq!(counting.count(), 2);
    assert!(counting.take(0));
    assert!(counting.take(0));
    assert!(!counting.take(0));
    for _ in 0..5 {
        assert!(counting.give());
    }
    assert!(!counting.give());
    assert_eq!(counting.count(), 5);

    assert!(!CountingSemaphore::<System<D>>::new(0, 0).is_valid());
    assert!(!CountingSemaphore::<System<D>>::new(2, 3).is_valid());

    // Binary semaphore, created empty
    let binary = BinarySemaphore::<System<D>>::new();
    assert_eq!(binary.count(), 0);
    let t0 = System::<D>::tick_count();
    assert!(!binary.take(3));
    assert_eq!(System::<D>::tick_count(), t0 + 3);
    assert!(binary.give());
    assert!(!binary.give());
    assert!(binary.take(0));

    // Static storage
    let mut static_binary = pin!(StaticBinarySemaphore::<System<D>>::new());
    assert!(static_binary.as_mut().init());
    assert!(static_binary.give());
    assert!(static_binary.take(0));
    let mut static_counting = pin!(StaticCountingSemaphore::<System<D>>::new(3, 3));
    assert!(static_counting.as_mut().init());
    assert_eq!(static_counting.count(), 3);

    // Giving to a higher-priority waiter switches to it immediately
    assert_eq!(taken(), 0);
    assert!(sem.give());
    assert_eq!(taken(), 1);

    // From an interrupt handler, without `yield_from_isr`, the switch waits
    // for the next scheduling point
    let woken = rtbind_port_std::interrupt::<D::Traits, _>(|| {
        let mut woken = HigherPriorityTaskWoken::new();
        assert!(!sem.take_from_isr(&mut woken));
        assert!(!woken.is_set());
        assert!(sem.give_from_isr(&mut woken));
        assert!(!sem.give_from_isr(&mut woken));
        woken
    });
    assert!(woken.is_set());
    assert_eq!(taken(), 1);
    System::<D>::yield_now();
    assert_eq!(taken(), 2);

    // A suspended scheduler holds off the switch
    System::<D>::suspend_all();
    assert_eq!(System::<D>::scheduler_state(), SchedulerState::Suspended);
    assert!(sem.give());
    assert_eq!(taken(), 2);
    assert!(System::<D>::resume_all());
    assert_eq!(taken(), 3);
    assert_eq!(System::<D>::scheduler_state(), SchedulerState::Running);

    // So does a critical section
    {
        let _cs = System::<D>::critical_section();
        assert!(sem.give());
        assert_eq!(taken(), 3);
    }
    assert_eq!(taken(), 4);

    D::success();
}
