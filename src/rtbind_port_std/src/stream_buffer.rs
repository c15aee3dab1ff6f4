//! Stream buffers and message buffers
use rtbind::kernel::{
    raw::{KernelStreamBuffer, StreamBufferKind},
    ResultCode, TickType,
};

use crate::{
    sched::{Inner, WaitOn},
    storage::{CbRef, StaticCb, Storage, STREAM_BUFFER_CB_SIZE},
    PortInstance, State, StreamBufferId, System, MESSAGE_LENGTH_BYTES,
};

/// The type of the length field of a message.
type MessageLength = u32;

pub(crate) struct StreamBufferCb {
    kind: StreamBufferKind,
    storage: Storage,
    size: usize,
    trigger_level: usize,
    /// The index of the oldest byte
    head: usize,
    len: usize,
    allocation: usize,
    cb: Option<CbRef>,
}

impl StreamBufferCb {
    fn spaces(&self) -> usize {
        self.size - self.len
    }

    /// The space required to accept `data` without blocking.
    fn required_space(&self, data: &[u8]) -> usize {
        match self.kind {
            StreamBufferKind::Stream => data.len().min(self.size),
            StreamBufferKind::Message => data.len() + MESSAGE_LENGTH_BYTES,
        }
    }

    fn copy_in(&mut self, data: &[u8]) {
        debug_assert!(data.len() <= self.spaces());
        let size = self.size;
        let tail = (self.head + self.len) % size;
        let first = data.len().min(size - tail);
        let bytes = self.storage.bytes();
        bytes[tail..][..first].copy_from_slice(&data[..first]);
        bytes[..data.len() - first].copy_from_slice(&data[first..]);
        self.len += data.len();
    }

    /// Copy the oldest bytes into `buffer` without consuming them.
    fn copy_out(&mut self, buffer: &mut [u8]) {
        debug_assert!(buffer.len() <= self.len);
        let size = self.size;
        let head = self.head;
        let first = buffer.len().min(size - head);
        let bytes = self.storage.bytes();
        buffer[..first].copy_from_slice(&bytes[head..][..first]);
        let rest = buffer.len() - first;
        buffer[first..].copy_from_slice(&bytes[..rest]);
    }

    fn consume(&mut self, count: usize) {
        self.head = (self.head + count) % self.size;
        self.len -= count;
    }

    /// Write as much of `data` as the buffer accepts. A message is written
    /// whole or not at all. Returns the number of bytes of `data` written.
    fn write(&mut self, data: &[u8]) -> usize {
        match self.kind {
            StreamBufferKind::Stream => {
                let count = data.len().min(self.spaces());
                self.copy_in(&data[..count]);
                count
            }
            StreamBufferKind::Message => {
                if self.spaces() < data.len() + MESSAGE_LENGTH_BYTES {
                    return 0;
                }
                let Ok(length) = MessageLength::try_from(data.len()) else {
                    return 0;
                };
                self.copy_in(&length.to_ne_bytes());
                self.copy_in(data);
                data.len()
            }
        }
    }

    /// Read into `buffer`. A message too large for `buffer` is left in
    /// place. Returns the number of bytes read.
    fn read(&mut self, buffer: &mut [u8]) -> usize {
        match self.kind {
            StreamBufferKind::Stream => {
                let count = buffer.len().min(self.len);
                self.copy_out(&mut buffer[..count]);
                self.consume(count);
                count
            }
            StreamBufferKind::Message => {
                if self.len < MESSAGE_LENGTH_BYTES {
                    return 0;
                }
                let mut header = [0; MESSAGE_LENGTH_BYTES];
                self.copy_out(&mut header);
                let length = MessageLength::from_ne_bytes(header) as usize;
                if length > buffer.len() {
                    log::debug!(
                        "a message of {length} bytes doesn't fit in a {}-byte buffer",
                        buffer.len()
                    );
                    return 0;
                }
                self.consume(MESSAGE_LENGTH_BYTES);
                self.copy_out(&mut buffer[..length]);
                self.consume(length);
                length
            }
        }
    }

    fn is_full(&self) -> bool {
        match self.kind {
            StreamBufferKind::Stream => self.spaces() == 0,
            // Not even an empty message fits
            StreamBufferKind::Message => self.spaces() <= MESSAGE_LENGTH_BYTES,
        }
    }

    /// Check if a blocked reader should be released.
    fn is_triggered(&self) -> bool {
        match self.kind {
            StreamBufferKind::Stream => self.len >= self.trigger_level,
            StreamBufferKind::Message => self.len > 0,
        }
    }
}

impl Inner {
    #[track_caller]
    fn stream_buffer(&mut self, id: StreamBufferId) -> &mut StreamBufferCb {
        match self.stream_buffers.get_mut(id.index()) {
            Some(stream_buffer) => stream_buffer,
            None => panic!("invalid stream buffer ID: {id:?}"),
        }
    }

    /// Write `data` and release the reader if the trigger level is reached.
    /// Returns the number of bytes written and whether the reader should
    /// preempt the running task.
    fn stream_buffer_write(&mut self, id: StreamBufferId, data: &[u8]) -> (usize, bool) {
        let stream_buffer = self.stream_buffer(id);
        let written = stream_buffer.write(data);
        let preempt = written > 0
            && stream_buffer.is_triggered()
            && self.wake_first(WaitOn::StreamBufferReceive(id.index()));
        (written, preempt)
    }

    /// Read into `buffer` and release the writer if anything was read.
    fn stream_buffer_read(&mut self, id: StreamBufferId, buffer: &mut [u8]) -> (usize, bool) {
        let read = self.stream_buffer(id).read(buffer);
        let preempt = read > 0 && self.wake_first(WaitOn::StreamBufferSend(id.index()));
        (read, preempt)
    }
}

impl State {
    fn create_stream_buffer(
        &self,
        size: usize,
        trigger_level: usize,
        kind: StreamBufferKind,
        memory: Option<(*mut u8, *mut StaticCb)>,
    ) -> Result<StreamBufferId, ResultCode> {
        let min_size = match kind {
            StreamBufferKind::Stream => 1,
            StreamBufferKind::Message => MESSAGE_LENGTH_BYTES + 1,
        };
        if size < min_size || trigger_level > size {
            return Err(ResultCode::BadParam);
        }

        let mut g = self.enter();
        let key = g.stream_buffers.vacant_key();
        let (storage, cb, allocation) = match memory {
            Some((storage, cb)) => {
                // Safety: Upheld by `raw_stream_buffer_create_static`'s caller
                let storage =
                    unsafe { Storage::borrowed(storage, size) }.ok_or(ResultCode::BadParam)?;
                // Safety: Upheld by `raw_stream_buffer_create_static`'s caller
                let cb = unsafe { CbRef::install(cb, 4, key) }.ok_or(ResultCode::BadParam)?;
                (storage, Some(cb), 0)
            }
            None => {
                let allocation = STREAM_BUFFER_CB_SIZE + size;
                self.heap.lock().allocate(allocation)?;
                (Storage::owned(size), None, allocation)
            }
        };

        g.stream_buffers.insert(StreamBufferCb {
            kind,
            storage,
            size,
            trigger_level: trigger_level.max(1),
            head: 0,
            len: 0,
            allocation,
            cb,
        });
        log::trace!("created stream buffer {key} ({kind:?}, size = {size})");
        Ok(StreamBufferId::from_index(key))
    }

    fn delete_stream_buffer(&self, id: StreamBufferId) {
        let mut g = self.enter();
        let _ = g.stream_buffer(id);
        g.assert_no_waiters(
            &[
                WaitOn::StreamBufferSend(id.index()),
                WaitOn::StreamBufferReceive(id.index()),
            ],
            "stream buffer",
        );
        let stream_buffer = g.stream_buffers.remove(id.index());
        if let Some(cb) = &stream_buffer.cb {
            cb.check();
        }
        self.heap.lock().release(stream_buffer.allocation);
        log::trace!("deleted stream buffer {}", id.index());
    }

    fn stream_buffer_send<I: PortInstance>(
        &self,
        id: StreamBufferId,
        data: &[u8],
        ticks: TickType,
    ) -> usize {
        let mut g = self.enter();
        let stream_buffer = g.stream_buffer(id);
        let required = stream_buffer.required_space(data);
        // A message larger than the buffer can never be sent
        let ticks = if required > stream_buffer.size { 0 } else { ticks };

        let (mut g, _) = self.wait_for::<I, _>(g, WaitOn::StreamBufferSend(id.index()), ticks, |g| {
            (g.stream_buffer(id).spaces() >= required).then_some(())
        });

        // On timeout, a stream buffer still takes whatever fits
        let (written, preempt) = g.stream_buffer_write(id, data);
        if preempt {
            drop(self.reschedule::<I>(g));
        }
        written
    }

    fn stream_buffer_receive<I: PortInstance>(
        &self,
        id: StreamBufferId,
        buffer: &mut [u8],
        ticks: TickType,
    ) -> usize {
        let g = self.enter();
        let (mut g, _) =
            self.wait_for::<I, _>(g, WaitOn::StreamBufferReceive(id.index()), ticks, |g| {
                (g.stream_buffer(id).len > 0).then_some(())
            });

        let (read, preempt) = g.stream_buffer_read(id, buffer);
        if preempt {
            drop(self.reschedule::<I>(g));
        }
        read
    }
}

unsafe impl<I: PortInstance> KernelStreamBuffer for System<I> {
    type RawStreamBufferId = StreamBufferId;
    type RawStaticStreamBufferCb = StaticCb;

    const RAW_MESSAGE_LENGTH_BYTES: usize = MESSAGE_LENGTH_BYTES;

    fn raw_stream_buffer_create(
        size: usize,
        trigger_level: usize,
        kind: StreamBufferKind,
    ) -> Result<StreamBufferId, ResultCode> {
        I::port_state().create_stream_buffer(size, trigger_level, kind, None)
    }

    unsafe fn raw_stream_buffer_create_static(
        size: usize,
        trigger_level: usize,
        kind: StreamBufferKind,
        storage: *mut u8,
        cb: *mut StaticCb,
    ) -> Result<StreamBufferId, ResultCode> {
        I::port_state().create_stream_buffer(size, trigger_level, kind, Some((storage, cb)))
    }

    unsafe fn raw_stream_buffer_delete(this: StreamBufferId) {
        I::port_state().delete_stream_buffer(this)
    }

    unsafe fn raw_stream_buffer_send(this: StreamBufferId, data: &[u8], ticks: TickType) -> usize {
        I::port_state().stream_buffer_send::<I>(this, data, ticks)
    }

    unsafe fn raw_stream_buffer_send_from_isr(
        this: StreamBufferId,
        data: &[u8],
        higher_priority_task_woken: &mut bool,
    ) -> usize {
        let mut g = I::port_state().enter();
        let (written, preempt) = g.stream_buffer_write(this, data);
        *higher_priority_task_woken |= preempt;
        written
    }

    unsafe fn raw_stream_buffer_receive(
        this: StreamBufferId,
        buffer: &mut [u8],
        ticks: TickType,
    ) -> usize {
        I::port_state().stream_buffer_receive::<I>(this, buffer, ticks)
    }

    unsafe fn raw_stream_buffer_receive_from_isr(
        this: StreamBufferId,
        buffer: &mut [u8],
        higher_priority_task_woken: &mut bool,
    ) -> usize {
        let mut g = I::port_state().enter();
        let (read, preempt) = g.stream_buffer_read(this, buffer);
        *higher_priority_task_woken |= preempt;
        read
    }

    unsafe fn raw_stream_buffer_bytes_available(this: StreamBufferId) -> usize {
        I::port_state().enter().stream_buffer(this).len
    }

    unsafe fn raw_stream_buffer_spaces_available(this: StreamBufferId) -> usize {
        I::port_state().enter().stream_buffer(this).spaces()
    }

    unsafe fn raw_stream_buffer_set_trigger_level(
        this: StreamBufferId,
        trigger_level: usize,
    ) -> bool {
        let mut g = I::port_state().enter();
        let stream_buffer = g.stream_buffer(this);
        if trigger_level > stream_buffer.size {
            return false;
        }
        stream_buffer.trigger_level = trigger_level.max(1);
        true
    }

    unsafe fn raw_stream_buffer_reset(this: StreamBufferId) -> bool {
        let mut g = I::port_state().enter();
        let _ = g.stream_buffer(this);
        if g.has_waiters(WaitOn::StreamBufferSend(this.index()))
            || g.has_waiters(WaitOn::StreamBufferReceive(this.index()))
        {
            return false;
        }
        let stream_buffer = g.stream_buffer(this);
        stream_buffer.head = 0;
        stream_buffer.len = 0;
        true
    }

    unsafe fn raw_stream_buffer_is_empty(this: StreamBufferId) -> bool {
        I::port_state().enter().stream_buffer(this).len == 0
    }

    unsafe fn raw_stream_buffer_is_full(this: StreamBufferId) -> bool {
        I::port_state().enter().stream_buffer(this).is_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(kind: StreamBufferKind, size: usize) -> StreamBufferCb {
        StreamBufferCb {
            kind,
            storage: Storage::owned(size),
            size,
            trigger_level: 1,
            head: 0,
            len: 0,
            allocation: 0,
            cb: None,
        }
    }

    #[test]
    fn stream_partial_write() {
        let mut sb = buffer(StreamBufferKind::Stream, 4);
        assert_eq!(sb.write(b"abc"), 3);
        assert_eq!(sb.write(b"def"), 1);
        assert!(sb.is_full());

        let mut out = [0; 2];
        assert_eq!(sb.read(&mut out), 2);
        assert_eq!(&out, b"ab");
        // Wraps around the end of the storage
        assert_eq!(sb.write(b"gh"), 2);
        let mut out = [0; 8];
        assert_eq!(sb.read(&mut out), 4);
        assert_eq!(&out[..4], b"cdgh");
    }

    #[test]
    fn messages_are_whole() {
        let mut mb = buffer(StreamBufferKind::Message, 16);
        assert_eq!(mb.write(b"hello"), 5);
        assert_eq!(mb.len, 5 + MESSAGE_LENGTH_BYTES);
        // 7 bytes left; 4 of them go to the length field
        assert_eq!(mb.write(b"world"), 0);
        assert_eq!(mb.write(b"abc"), 3);
        assert!(mb.is_full());

        let mut small = [0; 4];
        assert_eq!(mb.read(&mut small), 0);
        let mut out = [0; 8];
        assert_eq!(mb.read(&mut out), 5);
        assert_eq!(&out[..5], b"hello");
        assert_eq!(mb.read(&mut small), 3);
        assert_eq!(&small[..3], b"abc");
        assert_eq!(mb.len, 0);
    }

    #[quickcheck_macros::quickcheck]
    fn stream_preserves_order(chunks: Vec<(u8, u8)>) {
        let mut sb = buffer(StreamBufferKind::Stream, 7);
        let mut model = std::collections::VecDeque::new();
        let mut next = 0u8;
        for (write, read) in chunks {
            let data: Vec<u8> = (0..write % 10)
                .map(|_| {
                    next = next.wrapping_add(1);
                    next
                })
                .collect();
            let written = sb.write(&data);
            model.extend(&data[..written]);

            let mut out = vec![0; usize::from(read % 10)];
            let count = sb.read(&mut out);
            let expected: Vec<u8> = model.drain(..count).collect();
            assert_eq!(out[..count], expected[..]);
            assert_eq!(sb.len, model.len());
        }
    }
}
