//! Checks stream buffers, message buffers, and trigger levels.
use rtbind::kernel::{
    prelude::*, CurrentTask, DynamicMessageBuffer, DynamicStreamBuffer, HigherPriorityTaskWoken,
    StaticMessageBuffer, StaticStreamBuffer, Task, MAX_DELAY,
};
use std::{
    pin::pin,
    sync::{Arc, Mutex},
};

use crate::{Driver, System};

static RECEIVED: Mutex<Vec<u8>> = Mutex::new(Vec::new());

pub fn app<D: Driver>() {
    let stream = Arc::new(DynamicStreamBuffer::<System<D>>::new(8, 4));
    assert!(stream.is_valid());

    let _reader = Task::<System<D>>::build()
        .name("reader")
        .priority(2)
        .spawn({
            let stream = Arc::clone(&stream);
            move |_: &CurrentTask<System<D>>| {
                let mut buf = [0u8; 8];
                let n = stream.receive(&mut buf, MAX_DELAY);
                RECEIVED.lock().unwrap().extend_from_slice(&buf[..n]);
            }
        });
    let _main = Task::<System<D>>::build()
        .name("main")
        .priority(1)
        .spawn(move |_: &CurrentTask<System<D>>| main_body::<D>(&stream));

    System::<D>::start_scheduler();
}

fn received() -> Vec<u8> {
    RECEIVED.lock().unwrap().clone()
}

fn main_body<D: Driver>(stream: &DynamicStreamBuffer<System<D>>) {
    // `reader` stays blocked until the trigger level is reached
    assert_eq!(stream.send(b"ab", 0), 2);
    assert_eq!(stream.bytes_available(), 2);
    assert!(received().is_empty());
    assert_eq!(stream.send(b"cd", 0), 2);
    assert_eq!(received(), b"abcd");
    assert!(stream.is_empty());

    // A buffer with a blocked reader can't be reset
    assert!(!stream.reset());

    assert!(!stream.set_trigger_level(9));
    assert!(stream.set_trigger_level(1));
    rtbind_port_std::interrupt::<D::Traits, _>(|| {
        let mut woken = HigherPriorityTaskWoken::new();
        assert_eq!(stream.send_from_isr(b"e", &mut woken), 1);
        assert!(woken.is_set());
        System::<D>::yield_from_isr(woken);
    });
    assert_eq!(received(), b"abcde");

    // Partial writes
    let s = DynamicStreamBuffer::<System<D>>::new(8, 1);
    assert_eq!(s.send(b"hello", 0), 5);
    assert_eq!(s.spaces_available(), 3);
    assert_eq!(s.send(b"world", 0), 3);
    assert!(s.is_full());
    let mut buf = [0u8; 16];
    assert_eq!(s.receive(&mut buf[..3], 0), 3);
    assert_eq!(&buf[..3], b"hel");
    assert_eq!(s.receive(&mut buf, 0), 5);
    assert_eq!(&buf[..5], b"lowor");
    assert!(s.is_empty());

    // Timeout
    let t0 = System::<D>::tick_count();
    assert_eq!(s.receive(&mut buf, 5), 0);
    assert_eq!(System::<D>::tick_count(), t0 + 5);

    assert_eq!(s.send(b"xyz", 0), 3);
    assert!(s.reset());
    assert_eq!(s.bytes_available(), 0);

    assert!(!DynamicStreamBuffer::<System<D>>::new(0, 0).is_valid());
    assert!(!DynamicStreamBuffer::<System<D>>::new(4, 5).is_valid());

    // Messages are sent and received whole
    let m = DynamicMessageBuffer::<System<D>>::new(16);
    assert!(m.is_valid());
    assert!(m.send(b"abc", 0));
    assert_eq!(m.spaces_available(), 9);
    assert!(!m.send(b"0123456789", 0));
    assert!(m.send(b"01234", 0));
    assert!(m.is_full());

    let mut small = [0u8; 2];
    assert_eq!(m.receive(&mut small, 0), 0);
    assert_eq!(m.receive(&mut buf, 0), 3);
    assert_eq!(&buf[..3], b"abc");
    assert_eq!(m.receive(&mut buf, 0), 5);
    assert_eq!(&buf[..5], b"01234");
    assert!(m.is_empty());
    assert_eq!(m.receive(&mut buf, 0), 0);

    // Never fits
    assert!(!m.send(&[0; 13], 10));

    // An empty message would be indistinguishable from a timeout
    assert!(!m.send(&[], 0));
    let woken = rtbind_port_std::interrupt::<D::Traits, _>(|| {
        let mut woken = HigherPriorityTaskWoken::new();
        assert!(!m.send_from_isr(&[], &mut woken));
        woken
    });
    assert!(!woken.is_set());
    assert!(m.is_empty());

    assert!(!DynamicMessageBuffer::<System<D>>::new(4).is_valid());

    // Static storage
    let mut static_stream = pin!(StaticStreamBuffer::<System<D>, 16>::new(1));
    assert!(static_stream.as_mut().init());
    assert_eq!(static_stream.send(b"static", 0), 6);
    assert_eq!(static_stream.receive(&mut buf, 0), 6);
    assert_eq!(&buf[..6], b"static");

    let mut static_message = pin!(StaticMessageBuffer::<System<D>, 32>::new());
    assert!(static_message.as_mut().init());
    assert!(static_message.send(b"one", 0));
    assert!(static_message.send(b"two", 0));
    assert_eq!(static_message.receive(&mut buf, 0), 3);
    assert_eq!(&buf[..3], b"one");
    assert_eq!(static_message.receive(&mut buf, 0), 3);
    assert_eq!(&buf[..3], b"two");

    D::success();
}
