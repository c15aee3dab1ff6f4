//! Checks direct-to-task notifications.
use assert_matches::assert_matches;
use rtbind::kernel::{
    prelude::*, CurrentTask, HigherPriorityTaskWoken, NotificationBits, NotifyAction, Task,
    TaskRef, TaskState, MAX_DELAY,
};

use crate::{Driver, SeqTracker, System};

static SEQ: SeqTracker = SeqTracker::new();

pub fn app<D: Driver>() {
    let _waiter = Task::<System<D>>::build()
        .name("waiter")
        .priority(2)
        .spawn(waiter_body::<D>);
    let _main = Task::<System<D>>::build()
        .name("main")
        .priority(1)
        .spawn(main_body::<D>);

    System::<D>::start_scheduler();
}

fn waiter_body<D: Driver>(task: &CurrentTask<System<D>>) {
    SEQ.expect_and_replace(0, 1);
    let value = task.notify_wait(
        NotificationBits::EMPTY,
        NotificationBits::ALL,
        MAX_DELAY,
        0,
    );
    SEQ.expect_and_replace(2, 3);
    assert_matches!(value, Some(bits) if bits == NotificationBits::bit(3));

    // Used as a lightweight counting semaphore on slot 1
    assert_eq!(task.notify_take(true, MAX_DELAY, 1), 1);
    SEQ.expect_and_replace(4, 5);

    task.suspend_self();
}

fn main_body<D: Driver>(task: &CurrentTask<System<D>>) {
    SEQ.expect_and_replace(1, 2);
    let waiter = TaskRef::<System<D>>::handle_by_name("waiter").unwrap();

    // Waiting indefinitely for a notification is still a blocked state
    assert_matches!(waiter.state(), TaskState::Blocked);

    assert!(waiter.notify(NotifyAction::SetBits, NotificationBits::bit(3), 0));
    SEQ.expect_and_replace(3, 4);
    waiter.notify_give(1);
    SEQ.expect_and_replace(5, 6);
    assert_eq!(waiter.state(), TaskState::Suspended);

    // `waiter` isn't waiting anymore, so the notification stays pending
    let woken = rtbind_port_std::interrupt::<D::Traits, _>(|| {
        let mut woken = HigherPriorityTaskWoken::new();
        waiter.notify_give_from_isr(&mut woken, 1);
        assert!(waiter.notify_from_isr(
            &mut woken,
            NotifyAction::SetBits,
            NotificationBits::bit(0),
            2
        ));
        woken
    });
    assert!(!woken.is_set());
    assert!(waiter.notify_state_clear(1));
    assert!(!waiter.notify_state_clear(1));
    assert_eq!(
        waiter.notify_value_clear(NotificationBits::ALL, 2),
        NotificationBits::bit(0)
    );

    // Values on our own slot 2
    let value = NotificationBits::from_raw;
    assert!(task.notify(NotifyAction::SetValueWithoutOverwrite, value(5), 2));
    assert!(!task.notify(NotifyAction::SetValueWithoutOverwrite, value(6), 2));
    assert_eq!(
        task.notify_and_query(NotifyAction::SetValueWithOverwrite, value(7), 2),
        (true, value(5))
    );
    assert_eq!(
        task.notify_wait(NotificationBits::EMPTY, NotificationBits::EMPTY, 0, 2),
        Some(value(7))
    );
    assert!(!task.notify_state_clear(2));
    assert_eq!(task.notify_value_clear(NotificationBits::ALL, 2), value(7));

    // Nothing pending
    let t0 = System::<D>::tick_count();
    assert_eq!(
        task.notify_wait(NotificationBits::EMPTY, NotificationBits::EMPTY, 3, 2),
        None
    );
    assert_eq!(System::<D>::tick_count(), t0 + 3);

    // Increments on slot 1
    assert!(task.notify(NotifyAction::Increment, NotificationBits::EMPTY, 1));
    assert!(task.notify(NotifyAction::Increment, NotificationBits::EMPTY, 1));
    assert_eq!(task.notify_take(false, 0, 1), 2);
    assert_eq!(task.notify_take(true, 0, 1), 1);
    assert_eq!(task.notify_take(true, 0, 1), 0);

    D::success();
}
