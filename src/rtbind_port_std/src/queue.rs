//! Queues
use std::slice;

use rtbind::kernel::{
    raw::{KernelQueue, SendPosition},
    ResultCode, TickType,
};

use crate::{
    sched::{Inner, WaitOn},
    storage::{CbRef, StaticCb, Storage, QUEUE_CB_SIZE},
    PortInstance, QueueId, State, System,
};

pub(crate) struct QueueCb {
    length: usize,
    item_size: usize,
    storage: Storage,
    /// The index of the front item
    head: usize,
    count: usize,
    name: Option<&'static str>,
    allocation: usize,
    cb: Option<CbRef>,
}

impl QueueCb {
    /// Get the `i`-th item from the front.
    fn slot(&mut self, i: usize) -> &mut [u8] {
        let start = (self.head + i) % self.length * self.item_size;
        let item_size = self.item_size;
        &mut self.storage.bytes()[start..][..item_size]
    }

    fn push(&mut self, item: &[u8], position: SendPosition) -> bool {
        match position {
            SendPosition::Overwrite => {
                assert_eq!(
                    self.length, 1,
                    "overwriting is only allowed on a queue of length 1"
                );
                self.count = 1;
                self.slot(0).copy_from_slice(item);
            }
            _ if self.count == self.length => return false,
            SendPosition::Back => {
                let count = self.count;
                self.slot(count).copy_from_slice(item);
                self.count += 1;
            }
            SendPosition::Front => {
                self.head = (self.head + self.length - 1) % self.length;
                self.slot(0).copy_from_slice(item);
                self.count += 1;
            }
        }
        true
    }

    fn pop(&mut self, buffer: &mut [u8], remove: bool) -> bool {
        if self.count == 0 {
            return false;
        }
        buffer.copy_from_slice(self.slot(0));
        if remove {
            self.head = (self.head + 1) % self.length;
            self.count -= 1;
        }
        true
    }
}

impl Inner {
    #[track_caller]
    fn queue(&mut self, id: QueueId) -> &mut QueueCb {
        match self.queues.get_mut(id.index()) {
            Some(queue) => queue,
            None => panic!("invalid queue ID: {id:?}"),
        }
    }

    /// Returns `Some(preempt)` on success.
    fn queue_send(&mut self, id: QueueId, item: &[u8], position: SendPosition) -> Option<bool> {
        if !self.queue(id).push(item, position) {
            return None;
        }
        Some(self.wake_first(WaitOn::QueueReceive(id.index())))
    }

    /// Returns `Some(preempt)` on success.
    fn queue_receive(&mut self, id: QueueId, buffer: &mut [u8], remove: bool) -> Option<bool> {
        if !self.queue(id).pop(buffer, remove) {
            return None;
        }
        Some(if remove {
            self.wake_first(WaitOn::QueueSend(id.index()))
        } else {
            // The item is still there for another receiver
            self.wake_first(WaitOn::QueueReceive(id.index()))
        })
    }
}

impl State {
    fn create_queue(
        &self,
        length: usize,
        item_size: usize,
        storage: Option<*mut u8>,
        cb: Option<*mut StaticCb>,
    ) -> Result<QueueId, ResultCode> {
        if length == 0 {
            return Err(ResultCode::BadParam);
        }
        let bytes = length.checked_mul(item_size).ok_or(ResultCode::BadParam)?;
        let mut g = self.enter();
        let key = g.queues.vacant_key();

        let (storage, cb, allocation) = match (storage, cb) {
            (Some(storage), Some(cb)) => {
                let storage = if bytes == 0 {
                    Storage::owned(0)
                } else {
                    // Safety: Upheld by `raw_queue_create_static`'s caller
                    unsafe { Storage::borrowed(storage, bytes) }.ok_or(ResultCode::BadParam)?
                };
                // Safety: Upheld by `raw_queue_create_static`'s caller
                let cb = unsafe { CbRef::install(cb, 1, key) }.ok_or(ResultCode::BadParam)?;
                (storage, Some(cb), 0)
            }
            _ => {
                let allocation = QUEUE_CB_SIZE + bytes;
                self.heap.lock().allocate(allocation)?;
                (Storage::owned(bytes), None, allocation)
            }
        };

        g.queues.insert(QueueCb {
            length,
            item_size,
            storage,
            head: 0,
            count: 0,
            name: None,
            allocation,
            cb,
        });
        log::trace!("created queue {key} (length = {length}, item_size = {item_size})");
        Ok(QueueId::from_index(key))
    }

    fn delete_queue(&self, id: QueueId) {
        let mut g = self.enter();
        let _ = g.queue(id);
        g.assert_no_waiters(
            &[
                WaitOn::QueueSend(id.index()),
                WaitOn::QueueReceive(id.index()),
            ],
            "queue",
        );
        let queue = g.queues.remove(id.index());
        if let Some(cb) = &queue.cb {
            cb.check();
        }
        self.heap.lock().release(queue.allocation);
        log::trace!("deleted queue {}", id.index());
    }

    fn queue_send<I: PortInstance>(
        &self,
        id: QueueId,
        item: &[u8],
        position: SendPosition,
        ticks: TickType,
    ) -> ResultCode {
        let g = self.enter();
        let (g, sent) = self.wait_for::<I, _>(g, WaitOn::QueueSend(id.index()), ticks, |g| {
            g.queue_send(id, item, position)
        });
        match sent {
            Some(preempt) => {
                if preempt {
                    drop(self.reschedule::<I>(g));
                }
                ResultCode::Success
            }
            None => ResultCode::QueueOverflow,
        }
    }

    fn queue_receive<I: PortInstance>(
        &self,
        id: QueueId,
        buffer: &mut [u8],
        remove: bool,
        ticks: TickType,
    ) -> ResultCode {
        let g = self.enter();
        let (g, received) = self.wait_for::<I, _>(g, WaitOn::QueueReceive(id.index()), ticks, |g| {
            g.queue_receive(id, buffer, remove)
        });
        match received {
            Some(preempt) => {
                if preempt {
                    drop(self.reschedule::<I>(g));
                }
                ResultCode::Success
            }
            None => ResultCode::Timeout,
        }
    }
}

/// Get the item-sized slice at `ptr`.
///
/// # Safety
///
/// `ptr` must be valid for reading `len` bytes unless `len` is zero.
unsafe fn item<'a>(ptr: *const u8, len: usize) -> &'a [u8] {
    if len == 0 {
        &[]
    } else {
        // Safety: Upheld by the caller
        unsafe { slice::from_raw_parts(ptr, len) }
    }
}

/// The mutable counterpart of [`item`].
///
/// # Safety
///
/// `ptr` must be valid for writing `len` bytes unless `len` is zero.
unsafe fn item_mut<'a>(ptr: *mut u8, len: usize) -> &'a mut [u8] {
    if len == 0 {
        &mut []
    } else {
        // Safety: Upheld by the caller
        unsafe { slice::from_raw_parts_mut(ptr, len) }
    }
}

fn item_size<I: PortInstance>(id: QueueId) -> usize {
    I::port_state().enter().queue(id).item_size
}

unsafe impl<I: PortInstance> KernelQueue for System<I> {
    type RawQueueId = QueueId;
    type RawStaticQueueCb = StaticCb;

    fn raw_queue_create(length: usize, item_size: usize) -> Result<QueueId, ResultCode> {
        I::port_state().create_queue(length, item_size, None, None)
    }

    unsafe fn raw_queue_create_static(
        length: usize,
        item_size: usize,
        storage: *mut u8,
        cb: *mut StaticCb,
    ) -> Result<QueueId, ResultCode> {
        I::port_state().create_queue(length, item_size, Some(storage), Some(cb))
    }

    unsafe fn raw_queue_delete(this: QueueId) {
        I::port_state().delete_queue(this)
    }

    unsafe fn raw_queue_send(
        this: QueueId,
        item_ptr: *const u8,
        position: SendPosition,
        ticks: TickType,
    ) -> ResultCode {
        // Safety: Upheld by the caller
        let item = unsafe { item(item_ptr, item_size::<I>(this)) };
        I::port_state().queue_send::<I>(this, item, position, ticks)
    }

    unsafe fn raw_queue_send_from_isr(
        this: QueueId,
        item_ptr: *const u8,
        position: SendPosition,
        higher_priority_task_woken: &mut bool,
    ) -> ResultCode {
        // Safety: Upheld by the caller
        let item = unsafe { item(item_ptr, item_size::<I>(this)) };
        let mut g = I::port_state().enter();
        match g.queue_send(this, item, position) {
            Some(preempt) => {
                *higher_priority_task_woken |= preempt;
                ResultCode::Success
            }
            None => ResultCode::QueueOverflow,
        }
    }

    unsafe fn raw_queue_receive(this: QueueId, buffer: *mut u8, ticks: TickType) -> ResultCode {
        // Safety: Upheld by the caller
        let buffer = unsafe { item_mut(buffer, item_size::<I>(this)) };
        I::port_state().queue_receive::<I>(this, buffer, true, ticks)
    }

    unsafe fn raw_queue_receive_from_isr(
        this: QueueId,
        buffer: *mut u8,
        higher_priority_task_woken: &mut bool,
    ) -> ResultCode {
        // Safety: Upheld by the caller
        let buffer = unsafe { item_mut(buffer, item_size::<I>(this)) };
        let mut g = I::port_state().enter();
        match g.queue_receive(this, buffer, true) {
            Some(preempt) => {
                *higher_priority_task_woken |= preempt;
                ResultCode::Success
            }
            None => ResultCode::Timeout,
        }
    }

    unsafe fn raw_queue_peek(this: QueueId, buffer: *mut u8, ticks: TickType) -> ResultCode {
        // Safety: Upheld by the caller
        let buffer = unsafe { item_mut(buffer, item_size::<I>(this)) };
        I::port_state().queue_receive::<I>(this, buffer, false, ticks)
    }

    unsafe fn raw_queue_peek_from_isr(this: QueueId, buffer: *mut u8) -> ResultCode {
        // Safety: Upheld by the caller
        let buffer = unsafe { item_mut(buffer, item_size::<I>(this)) };
        let mut g = I::port_state().enter();
        // An interrupt handler can't be preempted, so a released receiver
        // simply runs later
        match g.queue_receive(this, buffer, false) {
            Some(_) => ResultCode::Success,
            None => ResultCode::Timeout,
        }
    }

    unsafe fn raw_queue_messages_waiting(this: QueueId) -> usize {
        I::port_state().enter().queue(this).count
    }

    unsafe fn raw_queue_messages_waiting_from_isr(this: QueueId) -> usize {
        I::port_state().enter().queue(this).count
    }

    unsafe fn raw_queue_spaces_available(this: QueueId) -> usize {
        let mut g = I::port_state().enter();
        let queue = g.queue(this);
        queue.length - queue.count
    }

    unsafe fn raw_queue_reset(this: QueueId) {
        let state = I::port_state();
        let mut g = state.enter();
        let queue = g.queue(this);
        queue.head = 0;
        queue.count = 0;
        log::trace!("reset queue {}", this.index());
        if g.wake_first(WaitOn::QueueSend(this.index())) {
            drop(state.reschedule::<I>(g));
        }
    }

    unsafe fn raw_queue_is_full_from_isr(this: QueueId) -> bool {
        let mut g = I::port_state().enter();
        let queue = g.queue(this);
        queue.count == queue.length
    }

    unsafe fn raw_queue_is_empty_from_isr(this: QueueId) -> bool {
        I::port_state().enter().queue(this).count == 0
    }

    unsafe fn raw_queue_add_to_registry(this: QueueId, name: &'static str) {
        I::port_state().enter().queue(this).name = Some(name);
    }

    unsafe fn raw_queue_unregister(this: QueueId) {
        I::port_state().enter().queue(this).name = None;
    }

    unsafe fn raw_queue_name(this: QueueId) -> Option<&'static str> {
        I::port_state().enter().queue(this).name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(length: usize, item_size: usize) -> QueueCb {
        QueueCb {
            length,
            item_size,
            storage: Storage::owned(length * item_size),
            head: 0,
            count: 0,
            name: None,
            allocation: 0,
            cb: None,
        }
    }

    #[test]
    fn fifo_order() {
        let mut q = queue(3, 2);
        assert!(q.push(&[1, 1], SendPosition::Back));
        assert!(q.push(&[2, 2], SendPosition::Back));
        assert!(q.push(&[0, 0], SendPosition::Front));
        assert!(!q.push(&[3, 3], SendPosition::Back));

        let mut buf = [0; 2];
        for expected in [[0, 0], [1, 1], [2, 2]] {
            assert!(q.pop(&mut buf, false));
            assert_eq!(buf, expected);
            assert!(q.pop(&mut buf, true));
            assert_eq!(buf, expected);
        }
        assert!(!q.pop(&mut buf, true));
    }

    #[test]
    fn overwrite() {
        let mut q = queue(1, 1);
        assert!(q.push(&[1], SendPosition::Overwrite));
        assert!(q.push(&[2], SendPosition::Overwrite));
        assert_eq!(q.count, 1);
        let mut buf = [0];
        assert!(q.pop(&mut buf, true));
        assert_eq!(buf, [2]);
    }

    #[test]
    #[should_panic = "length 1"]
    fn overwrite_long_queue() {
        queue(2, 1).push(&[1], SendPosition::Overwrite);
    }

    #[quickcheck_macros::quickcheck]
    fn wraps_around(ops: Vec<bool>) {
        let mut q = queue(4, 1);
        let mut model = std::collections::VecDeque::new();
        let mut next = 0u8;
        for push in ops {
            if push {
                let pushed = q.push(&[next], SendPosition::Back);
                assert_eq!(pushed, model.len() < 4);
                if pushed {
                    model.push_back(next);
                }
                next = next.wrapping_add(1);
            } else {
                let mut buf = [0];
                let popped = q.pop(&mut buf, true);
                assert_eq!(popped.then_some(buf[0]), model.pop_front());
            }
        }
    }
}
