//! Message buffers
//!
//! A message buffer is a stream buffer that transfers discrete messages.
//! Each message occupies its length plus
//! [`RAW_MESSAGE_LENGTH_BYTES`](super::raw::KernelStreamBuffer::RAW_MESSAGE_LENGTH_BYTES)
//! bytes of the buffer.
use core::{cell::UnsafeCell, marker::PhantomPinned, mem::MaybeUninit, ops::Deref, pin::Pin};

use super::{raw, raw::StreamBufferKind, HigherPriorityTaskWoken, TickType};

define_handle! {
    /// Owns a single message buffer.
    pub struct MessageBuffer<System: KernelStreamBuffer>(System::RawStreamBufferId);
    delete = raw_stream_buffer_delete;
}

impl<System: raw::KernelStreamBuffer> MessageBuffer<System> {
    /// Write `message` as a whole, blocking for up to `ticks` ticks until it
    /// fits. Returns `false` if nothing was written.
    ///
    /// Empty messages are rejected, so [`receive`](Self::receive) returning
    /// `0` always means that no message was delivered.
    #[inline]
    pub fn send(&self, message: &[u8], ticks: TickType) -> bool {
        if message.is_empty() {
            log::debug!("rejecting an empty message for {:?}", self.id());
            return false;
        }
        // Safety: `MessageBuffer` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_stream_buffer_send(self.id(), message, ticks) == message.len() }
    }

    /// Like [`send`](Self::send), but never blocks.
    #[inline]
    pub fn send_from_isr(&self, message: &[u8], woken: &mut HigherPriorityTaskWoken) -> bool {
        if message.is_empty() {
            return false;
        }
        let id = self.id();
        // Safety: `MessageBuffer` represents a permission to access the
        //         referenced object.
        woken.track(|w| unsafe { System::raw_stream_buffer_send_from_isr(id, message, w) })
            == message.len()
    }

    /// Read the next message into `buffer`, blocking for up to `ticks` ticks
    /// for one to arrive. Returns the message length, or `0` on timeout or if
    /// `buffer` is too small, in which case the message stays in the buffer.
    #[inline]
    pub fn receive(&self, buffer: &mut [u8], ticks: TickType) -> usize {
        // Safety: `MessageBuffer` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_stream_buffer_receive(self.id(), buffer, ticks) }
    }

    #[inline]
    pub fn receive_from_isr(&self, buffer: &mut [u8], woken: &mut HigherPriorityTaskWoken) -> usize {
        let id = self.id();
        // Safety: `MessageBuffer` represents a permission to access the
        //         referenced object.
        woken.track(|w| unsafe { System::raw_stream_buffer_receive_from_isr(id, buffer, w) })
    }

    /// Get the number of free bytes, including those that would be taken by
    /// the length field of the next message.
    #[inline]
    pub fn spaces_available(&self) -> usize {
        // Safety: `MessageBuffer` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_stream_buffer_spaces_available(self.id()) }
    }

    /// Discard all messages. Fails if a task is blocked on the buffer.
    #[inline]
    pub fn reset(&self) -> bool {
        // Safety: `MessageBuffer` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_stream_buffer_reset(self.id()) }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        // Safety: `MessageBuffer` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_stream_buffer_is_empty(self.id()) }
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        // Safety: `MessageBuffer` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_stream_buffer_is_full(self.id()) }
    }
}

/// A message buffer whose control block and storage are allocated from the
/// kernel heap.
pub struct DynamicMessageBuffer<System: raw::KernelStreamBuffer>(MessageBuffer<System>);

impl<System: raw::KernelStreamBuffer> DynamicMessageBuffer<System> {
    /// Create an empty message buffer of `size` bytes. Check [`is_valid`]
    /// for success.
    ///
    /// [`is_valid`]: MessageBuffer::is_valid
    pub fn new(size: usize) -> Self {
        Self(MessageBuffer::from_create_result(
            System::raw_stream_buffer_create(size, 0, StreamBufferKind::Message),
        ))
    }
}

impl<System: raw::KernelStreamBuffer> Deref for DynamicMessageBuffer<System> {
    type Target = MessageBuffer<System>;

    #[inline]
    fn deref(&self) -> &MessageBuffer<System> {
        &self.0
    }
}

/// A message buffer of `SIZE` bytes with an embedded control block and
/// storage.
pub struct StaticMessageBuffer<System: raw::KernelStreamBuffer, const SIZE: usize> {
    message_buffer: MessageBuffer<System>,
    cb: UnsafeCell<MaybeUninit<System::RawStaticStreamBufferCb>>,
    storage: UnsafeCell<MaybeUninit<[u8; SIZE]>>,
    _pin: PhantomPinned,
}

// Safety: `cb` and `storage` are only accessed by the kernel
unsafe impl<System: raw::KernelStreamBuffer, const SIZE: usize> Send
    for StaticMessageBuffer<System, SIZE>
{
}
unsafe impl<System: raw::KernelStreamBuffer, const SIZE: usize> Sync
    for StaticMessageBuffer<System, SIZE>
{
}

impl<System: raw::KernelStreamBuffer, const SIZE: usize> StaticMessageBuffer<System, SIZE> {
    /// Construct an unregistered (invalid) message buffer.
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            message_buffer: MessageBuffer::from_raw(None),
            cb: UnsafeCell::new(MaybeUninit::uninit()),
            storage: UnsafeCell::new(MaybeUninit::uninit()),
            _pin: PhantomPinned,
        }
    }

    /// Register the message buffer with the kernel. Returns `true` on
    /// success or if already registered.
    pub fn init(self: Pin<&mut Self>) -> bool {
        // Safety: No fields are moved out of `self`
        let this = unsafe { self.get_unchecked_mut() };
        if !this.message_buffer.is_valid() {
            // Safety: `this` is pinned, and `message_buffer` is dropped
            //         before `cb` and `storage`
            this.message_buffer = MessageBuffer::from_create_result(unsafe {
                System::raw_stream_buffer_create_static(
                    SIZE,
                    0,
                    StreamBufferKind::Message,
                    this.storage.get().cast(),
                    this.cb.get().cast(),
                )
            });
        }
        this.message_buffer.is_valid()
    }
}

impl<System: raw::KernelStreamBuffer, const SIZE: usize> Deref
    for StaticMessageBuffer<System, SIZE>
{
    type Target = MessageBuffer<System>;

    #[inline]
    fn deref(&self) -> &MessageBuffer<System> {
        &self.message_buffer
    }
}
