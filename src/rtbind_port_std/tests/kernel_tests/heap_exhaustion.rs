//! Checks that dynamic objects fail gracefully when the kernel heap is
//! exhausted, and that static objects don't use it.
use rtbind::kernel::{
    prelude::*, BinarySemaphore, CurrentTask, DynamicEventGroup, DynamicMessageBuffer,
    DynamicMutex, DynamicQueue, DynamicStreamBuffer, StaticQueue, Task, Timer,
};
use rtbind_port_std::{heap_used, set_heap_limit};
use std::{
    pin::pin,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{Driver, System};

static STATIC_TASK_RUNS: AtomicUsize = AtomicUsize::new(0);

pub fn app<D: Driver>() {
    assert_eq!(heap_used::<D::Traits>(), 0);
    let _main = Task::<System<D>>::build()
        .name("main")
        .priority(1)
        .spawn(main_body::<D>);
    assert_ne!(heap_used::<D::Traits>(), 0);

    System::<D>::start_scheduler();
}

fn main_body<D: Driver>(_: &CurrentTask<System<D>>) {
    let used = heap_used::<D::Traits>();
    set_heap_limit::<D::Traits>(Some(used));

    assert!(!DynamicQueue::<System<D>, u32>::new(4).is_valid());
    assert!(!BinarySemaphore::<System<D>>::new().is_valid());
    assert!(!DynamicMutex::<System<D>>::new().is_valid());
    assert!(!DynamicEventGroup::<System<D>>::new().is_valid());
    assert!(!DynamicStreamBuffer::<System<D>>::new(16, 1).is_valid());
    assert!(!DynamicMessageBuffer::<System<D>>::new(16).is_valid());
    assert!(!Task::<System<D>>::build()
        .name("starved")
        .spawn(|_: &CurrentTask<System<D>>| {})
        .is_valid());
    assert!(!Timer::<System<D>>::build(1)
        .spawn(|_: &Timer<System<D>>| {})
        .is_valid());
    assert_eq!(heap_used::<D::Traits>(), used);

    // Static objects bring their own memory
    let mut queue = pin!(StaticQueue::<System<D>, u32, 4>::new());
    assert!(queue.as_mut().init());
    assert!(queue.send_to_back(42, 0));
    assert_eq!(queue.receive(0), Some(42));

    let mut task = pin!(Task::<System<D>>::build()
        .name("static")
        .priority(2)
        .finish_static::<_, 64>(|task: &CurrentTask<System<D>>| {
            STATIC_TASK_RUNS.fetch_add(1, Ordering::Relaxed);
            task.suspend_self();
        }));
    assert!(task.as_mut().init());
    assert_eq!(STATIC_TASK_RUNS.load(Ordering::Relaxed), 1);
    assert_eq!(heap_used::<D::Traits>(), used);

    // Lifting the limit
    set_heap_limit::<D::Traits>(None);
    {
        let queue = DynamicQueue::<System<D>, u32>::new(4);
        assert!(queue.is_valid());
        assert!(heap_used::<D::Traits>() > used);
    }
    assert_eq!(heap_used::<D::Traits>(), used);

    D::success();
}
