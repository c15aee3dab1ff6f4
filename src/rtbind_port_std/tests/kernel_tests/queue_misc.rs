//! Checks queue ordering, blocking, overwriting, and the interrupt handler
//! forms.
use rtbind::kernel::{
    prelude::*, CurrentTask, DynamicQueue, HigherPriorityTaskWoken, StaticQueue, Task, MAX_DELAY,
};
use std::{
    pin::pin,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use crate::{Driver, System};

static RECEIVED: AtomicU32 = AtomicU32::new(0);

pub fn app<D: Driver>() {
    let pipe = Arc::new(DynamicQueue::<System<D>, u32>::new(4));
    assert!(pipe.is_valid());

    let _consumer = Task::<System<D>>::build()
        .name("consumer")
        .priority(2)
        .spawn({
            let pipe = Arc::clone(&pipe);
            move |_: &CurrentTask<System<D>>| {
                if let Some(x) = pipe.receive(MAX_DELAY) {
                    RECEIVED.fetch_add(x, Ordering::Relaxed);
                }
            }
        });
    let _main = Task::<System<D>>::build()
        .name("main")
        .priority(1)
        .spawn(move |task: &CurrentTask<System<D>>| main_body::<D>(task, &pipe));

    System::<D>::start_scheduler();
}

fn main_body<D: Driver>(task: &CurrentTask<System<D>>, pipe: &DynamicQueue<System<D>, u32>) {
    // Ordering and capacity
    let q = DynamicQueue::<System<D>, u32>::new(3);
    assert_eq!(q.receive(0), None);
    assert_eq!(q.peek(0), None);
    assert!(q.send_to_back(1, 0));
    assert!(q.send_to_back(2, 0));
    assert!(q.send_to_back(3, 0));
    assert!(!q.send_to_back(4, 0));
    assert_eq!(q.messages_waiting(), 3);
    assert_eq!(q.spaces_available(), 0);

    assert_eq!(q.receive(0), Some(1));
    assert!(q.send_to_front(0, 0));
    assert_eq!(q.peek(0), Some(0));
    assert_eq!(q.receive(0), Some(0));
    assert_eq!(q.receive(0), Some(2));
    assert_eq!(q.receive(0), Some(3));
    assert_eq!(q.receive(0), None);

    // Blocking receive times out
    let t0 = System::<D>::tick_count();
    assert_eq!(q.receive(5), None);
    assert_eq!(System::<D>::tick_count(), t0 + 5);

    assert!(q.send_to_back(9, 0));
    q.reset();
    assert_eq!(q.messages_waiting(), 0);

    // The queue registry
    assert_eq!(q.name(), None);
    q.add_to_registry("numbers");
    assert_eq!(q.name(), Some("numbers"));
    q.unregister();
    assert_eq!(q.name(), None);

    // Mailbox
    let mailbox = DynamicQueue::<System<D>, u32>::new(1);
    assert!(mailbox.overwrite(5));
    assert!(mailbox.overwrite(6));
    assert_eq!(mailbox.messages_waiting(), 1);
    assert_eq!(mailbox.peek(0), Some(6));

    // Static storage
    let mut pinned = pin!(StaticQueue::<System<D>, u16, 2>::new());
    assert!(!pinned.is_valid());
    assert!(pinned.as_mut().init());
    assert!(pinned.send_to_back(0x1234, 0));
    assert!(pinned.send_to_front(0x5678, 0));
    assert!(!pinned.send_to_back(0, 0));
    assert_eq!(pinned.receive(0), Some(0x5678));
    assert_eq!(pinned.receive(0), Some(0x1234));

    // Sending to a higher-priority receiver switches to it immediately
    assert_eq!(RECEIVED.load(Ordering::Relaxed), 0);
    assert!(pipe.send_to_back(10, 0));
    assert_eq!(RECEIVED.load(Ordering::Relaxed), 10);

    // From an interrupt handler, the switch is deferred until the handler
    // returns
    rtbind_port_std::interrupt::<D::Traits, _>(|| {
        assert!(System::<D>::is_interrupt_context());
        let mut woken = HigherPriorityTaskWoken::new();
        assert!(pipe.send_to_back_from_isr(7, &mut woken));
        assert!(woken.is_set());
        assert_eq!(pipe.messages_waiting_from_isr(), 1);
        assert_eq!(RECEIVED.load(Ordering::Relaxed), 10);
        System::<D>::yield_from_isr(woken);
    });
    assert_eq!(RECEIVED.load(Ordering::Relaxed), 17);

    // Without a receiver, the flag stays clear
    rtbind_port_std::interrupt::<D::Traits, _>(|| {
        let mut woken = HigherPriorityTaskWoken::new();
        assert!(q.send_to_back_from_isr(1, &mut woken));
        assert!(q.send_to_front_from_isr(2, &mut woken));
        assert!(!woken.is_set());
        assert_eq!(q.peek_from_isr(), Some(2));
        assert_eq!(q.receive_from_isr(&mut woken), Some(2));
        assert!(!q.is_empty_from_isr());
        assert!(!q.is_full_from_isr());
    });

    // A full queue rejects sends from an interrupt handler without blocking
    // and leaves its contents alone
    assert!(q.send_to_back(3, 0));
    assert!(q.send_to_back(4, 0));
    let t0 = System::<D>::tick_count();
    rtbind_port_std::interrupt::<D::Traits, _>(|| {
        let mut woken = HigherPriorityTaskWoken::new();
        assert!(q.is_full_from_isr());
        assert!(!q.send_to_back_from_isr(5, &mut woken));
        assert!(!q.send_to_front_from_isr(6, &mut woken));
        assert!(!woken.is_set());
        assert_eq!(q.messages_waiting_from_isr(), 3);
        assert_eq!(q.peek_from_isr(), Some(1));
    });
    assert_eq!(System::<D>::tick_count(), t0);
    assert_eq!(q.receive(0), Some(1));
    assert_eq!(q.receive(0), Some(3));
    assert_eq!(q.receive(0), Some(4));
    assert_eq!(q.receive(0), None);
    assert_eq!(task.name(), "main");

    D::success();
}
