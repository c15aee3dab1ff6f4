//! Checks event group wait conditions, rendezvous, and the interrupt handler
//! forms.
use rtbind::kernel::{
    prelude::*, CurrentTask, DynamicEventGroup, EventBits, EventGroupWaitFlags,
    HigherPriorityTaskWoken, StaticEventGroup, Task, MAX_DELAY,
};
use std::{pin::pin, sync::Arc};

use crate::{Driver, SeqTracker, System};

static SEQ: SeqTracker = SeqTracker::new();

pub fn app<D: Driver>() {
    let group = Arc::new(DynamicEventGroup::<System<D>>::new());
    assert!(group.is_valid());

    let _waiter = Task::<System<D>>::build()
        .name("waiter")
        .priority(2)
        .spawn({
            let group = Arc::clone(&group);
            move |task: &CurrentTask<System<D>>| waiter_body::<D>(task, &group)
        });
    let _main = Task::<System<D>>::build()
        .name("main")
        .priority(1)
        .spawn(move |_: &CurrentTask<System<D>>| main_body::<D>(&group));

    System::<D>::start_scheduler();
}

fn bits(indices: &[u32]) -> EventBits {
    indices
        .iter()
        .fold(EventBits::EMPTY, |acc, &i| acc | EventBits::bit(i))
}

fn waiter_body<D: Driver>(task: &CurrentTask<System<D>>, group: &DynamicEventGroup<System<D>>) {
    SEQ.expect_and_replace(0, 1);
    let got = group.wait(
        bits(&[0, 4]),
        EventGroupWaitFlags::ALL | EventGroupWaitFlags::CLEAR,
        MAX_DELAY,
    );
    SEQ.expect_and_replace(2, 3);
    assert_eq!(got, bits(&[0, 4]));

    // Rendezvous with `main`
    let got = group.sync(bits(&[6]), bits(&[5, 6]), MAX_DELAY);
    SEQ.expect_and_replace(4, 5);
    assert!(got.contains(bits(&[5, 6])));

    task.suspend_self();
}

fn main_body<D: Driver>(group: &DynamicEventGroup<System<D>>) {
    SEQ.expect_and_replace(1, 2);

    // Half of the condition
    assert_eq!(group.set(bits(&[0])), bits(&[0]));

    // The other half releases `waiter`, which clears the bits on exit
    assert_eq!(group.set(bits(&[4])), EventBits::EMPTY);
    SEQ.expect_and_replace(3, 4);

    // `waiter` arrived at the rendezvous first
    assert_eq!(group.get(), bits(&[6]));
    let got = group.sync(bits(&[5]), bits(&[5, 6]), MAX_DELAY);
    SEQ.expect_and_replace(5, 6);
    assert_eq!(got, bits(&[5, 6]));
    assert_eq!(group.get(), EventBits::EMPTY);

    // Polling
    group.set(bits(&[2]));
    assert!(group
        .wait(bits(&[2, 3]), EventGroupWaitFlags::empty(), 0)
        .test(2));
    assert_eq!(group.get(), bits(&[2]));
    assert_eq!(
        group.wait(bits(&[2, 3]), EventGroupWaitFlags::ALL, 0),
        bits(&[2])
    );

    // Timeout
    let t0 = System::<D>::tick_count();
    assert_eq!(
        group.wait(bits(&[3]), EventGroupWaitFlags::empty(), 10),
        bits(&[2])
    );
    assert_eq!(System::<D>::tick_count(), t0 + 10);

    assert_eq!(group.clear(bits(&[2])), bits(&[2]));
    assert_eq!(group.get(), EventBits::EMPTY);

    // A satisfied non-clearing wait leaves the bits alone
    group.set(bits(&[1, 7]));
    assert_eq!(
        group.wait(bits(&[1, 7]), EventGroupWaitFlags::ALL, MAX_DELAY),
        bits(&[1, 7])
    );
    assert_eq!(group.get(), bits(&[1, 7]));

    // Interrupt handler forms
    rtbind_port_std::interrupt::<D::Traits, _>(|| {
        let mut woken = HigherPriorityTaskWoken::new();
        assert!(group.set_from_isr(bits(&[3]), &mut woken));
        assert!(!woken.is_set());
        assert!(group.clear_from_isr(bits(&[1])));
        assert_eq!(group.get_from_isr(), bits(&[3, 7]));
    });

    // Static storage
    let mut static_group = pin!(StaticEventGroup::<System<D>>::new());
    assert!(static_group.as_mut().init());
    assert_eq!((*static_group).set(bits(&[0, 1])), bits(&[0, 1]));
    assert_eq!(
        static_group.wait(bits(&[1]), EventGroupWaitFlags::CLEAR, 0),
        bits(&[0, 1])
    );
    assert_eq!(static_group.get(), bits(&[0]));

    D::success();
}
