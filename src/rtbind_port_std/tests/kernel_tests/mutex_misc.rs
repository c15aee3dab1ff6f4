//! Checks mutex ownership, priority inheritance, and recursive locking.
use rtbind::kernel::{
    prelude::*, BinarySemaphore, CurrentTask, DynamicMutex, DynamicRecursiveMutex, StaticMutex,
    StaticRecursiveMutex, Task, TaskRef, MAX_DELAY,
};
use std::{pin::pin, sync::Arc};

use crate::{Driver, SeqTracker, System};

static SEQ: SeqTracker = SeqTracker::new();

struct Shared<D: Driver> {
    mutex: DynamicMutex<System<D>>,
    go: BinarySemaphore<System<D>>,
    recursive: DynamicRecursiveMutex<System<D>>,
    go_recursive: BinarySemaphore<System<D>>,
}

pub fn app<D: Driver>() {
    let shared = Arc::new(Shared::<D> {
        mutex: DynamicMutex::new(),
        go: BinarySemaphore::new(),
        recursive: DynamicRecursiveMutex::new(),
        go_recursive: BinarySemaphore::new(),
    });
    assert!(shared.mutex.is_valid());
    assert!(shared.recursive.is_valid());

    let _contender = Task::<System<D>>::build()
        .name("contender")
        .priority(3)
        .spawn({
            let shared = Arc::clone(&shared);
            move |_: &CurrentTask<System<D>>| contender_body::<D>(&shared)
        });
    let _recursive_contender = Task::<System<D>>::build()
        .name("recursive contender")
        .priority(3)
        .spawn({
            let shared = Arc::clone(&shared);
            move |task: &CurrentTask<System<D>>| recursive_contender_body::<D>(task, &shared)
        });
    let _main = Task::<System<D>>::build()
        .name("main")
        .priority(1)
        .spawn(move |task: &CurrentTask<System<D>>| main_body::<D>(task, &shared));

    System::<D>::start_scheduler();
}

fn contender_body<D: Driver>(shared: &Shared<D>) {
    assert!(shared.go.take(MAX_DELAY));
    SEQ.expect_and_replace(1, 2);

    // `main` holds the mutex
    assert!(!shared.mutex.lock(0));
    assert!(!shared.mutex.unlock());
    assert!(shared.mutex.lock(MAX_DELAY));

    SEQ.expect_and_replace(3, 4);
    assert_eq!(shared.mutex.holder(), TaskRef::current());
    assert!(shared.mutex.unlock());
}

fn recursive_contender_body<D: Driver>(task: &CurrentTask<System<D>>, shared: &Shared<D>) {
    assert!(shared.go_recursive.take(MAX_DELAY));
    SEQ.expect_and_replace(5, 6);

    // `main` has undone all but one of its locks
    assert!(!shared.recursive.lock(0));
    assert!(!shared.recursive.unlock());

    assert!(shared.go_recursive.take(MAX_DELAY));
    SEQ.expect_and_replace(7, 8);

    // ...and now the last one
    assert!(shared.recursive.lock(0));
    assert_eq!(shared.recursive.holder(), TaskRef::current());
    assert!(shared.recursive.unlock());
    task.suspend_self();
}

fn main_body<D: Driver>(task: &CurrentTask<System<D>>, shared: &Shared<D>) {
    SEQ.expect_and_replace(0, 1);
    let me = TaskRef::<System<D>>::current();
    let mutex = &shared.mutex;

    assert_eq!(mutex.holder(), None);
    assert!(mutex.lock(0));
    assert_eq!(mutex.holder(), me);

    // Wake up `contender`, which blocks on the mutex and lends us its
    // priority
    assert!(shared.go.give());
    SEQ.expect_and_replace(2, 3);
    assert_eq!(task.priority(), 3);

    // Unlocking hands the mutex over to `contender`, which preempts us
    assert!(mutex.unlock());
    SEQ.expect_and_replace(4, 5);
    assert_eq!(task.priority(), 1);
    assert_eq!(mutex.holder(), None);

    // Not locked
    assert!(!mutex.unlock());

    {
        let _guard = mutex.lock_guard(0).unwrap();
        assert_eq!(mutex.holder(), me);
    }
    assert_eq!(mutex.holder(), None);

    // Recursive mutex: three locks take three unlocks before another task
    // can lock it
    let recursive = &shared.recursive;
    assert!(!recursive.unlock());
    for _ in 0..3 {
        assert!(recursive.lock(0));
    }
    assert_eq!(recursive.holder(), me);
    for _ in 0..2 {
        assert!(recursive.unlock());
    }
    assert_eq!(recursive.holder(), me);
    assert!(shared.go_recursive.give());
    SEQ.expect_and_replace(6, 7);

    assert!(recursive.unlock());
    assert_eq!(recursive.holder(), None);
    assert!(shared.go_recursive.give());
    SEQ.expect_and_replace(8, 9);
    assert_eq!(recursive.holder(), None);
    assert!(!recursive.unlock());

    {
        let _outer = recursive.lock_guard(0).unwrap();
        let _inner = recursive.lock_guard(0).unwrap();
        assert_eq!(recursive.holder(), me);
    }
    assert_eq!(recursive.holder(), None);

    // Static storage
    let mut static_mutex = pin!(StaticMutex::<System<D>>::new());
    assert!(static_mutex.as_mut().init());
    assert!(static_mutex.lock(0));
    assert!(static_mutex.unlock());
    let mut static_recursive = pin!(StaticRecursiveMutex::<System<D>>::new());
    assert!(static_recursive.as_mut().init());
    assert!(static_recursive.lock(0));
    assert!(static_recursive.lock(0));
    assert!(static_recursive.unlock());
    assert!(static_recursive.unlock());

    D::success();
}
