//! Stream buffers
//!
//! A stream buffer passes a byte stream from a single writer to a single
//! reader. Neither side is protected against concurrent access from a second
//! writer or reader; callers must serialize those themselves.
use core::{cell::UnsafeCell, marker::PhantomPinned, mem::MaybeUninit, ops::Deref, pin::Pin};

use super::{raw, raw::StreamBufferKind, HigherPriorityTaskWoken, TickType};

define_handle! {
    /// Owns a single stream buffer.
    pub struct StreamBuffer<System: KernelStreamBuffer>(System::RawStreamBufferId);
    delete = raw_stream_buffer_delete;
}

impl<System: raw::KernelStreamBuffer> StreamBuffer<System> {
    /// Write `data`, blocking for up to `ticks` ticks until all of it fits.
    /// Returns the number of bytes written, which is less than `data.len()`
    /// if the timeout expired.
    #[inline]
    pub fn send(&self, data: &[u8], ticks: TickType) -> usize {
        // Safety: `StreamBuffer` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_stream_buffer_send(self.id(), data, ticks) }
    }

    /// Write as much of `data` as fits without blocking.
    #[inline]
    pub fn send_from_isr(&self, data: &[u8], woken: &mut HigherPriorityTaskWoken) -> usize {
        let id = self.id();
        // Safety: `StreamBuffer` represents a permission to access the
        //         referenced object.
        woken.track(|w| unsafe { System::raw_stream_buffer_send_from_isr(id, data, w) })
    }

    /// Read up to `buffer.len()` bytes, blocking for up to `ticks` ticks
    /// while the buffer is empty. A blocked reader is released once the
    /// buffer holds as many bytes as the trigger level, or reads whatever is
    /// there when the timeout expires. Returns the number of bytes read.
    #[inline]
    pub fn receive(&self, buffer: &mut [u8], ticks: TickType) -> usize {
        // Safety: `StreamBuffer` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_stream_buffer_receive(self.id(), buffer, ticks) }
    }

    #[inline]
    pub fn receive_from_isr(&self, buffer: &mut [u8], woken: &mut HigherPriorityTaskWoken) -> usize {
        let id = self.id();
        // Safety: `StreamBuffer` represents a permission to access the
        //         referenced object.
        woken.track(|w| unsafe { System::raw_stream_buffer_receive_from_isr(id, buffer, w) })
    }

    /// Get the number of bytes that can be read without blocking.
    #[inline]
    pub fn bytes_available(&self) -> usize {
        // Safety: `StreamBuffer` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_stream_buffer_bytes_available(self.id()) }
    }

    /// Get the number of bytes that can be written without blocking.
    #[inline]
    pub fn spaces_available(&self) -> usize {
        // Safety: `StreamBuffer` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_stream_buffer_spaces_available(self.id()) }
    }

    /// Change the number of bytes that must be present before a blocked
    /// reader is released. Fails if `trigger_level` exceeds the buffer size.
    #[inline]
    pub fn set_trigger_level(&self, trigger_level: usize) -> bool {
        // Safety: `StreamBuffer` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_stream_buffer_set_trigger_level(self.id(), trigger_level) }
    }

    /// Discard the contents. Fails if a task is blocked on the buffer.
    #[inline]
    pub fn reset(&self) -> bool {
        // Safety: `StreamBuffer` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_stream_buffer_reset(self.id()) }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        // Safety: `StreamBuffer` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_stream_buffer_is_empty(self.id()) }
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        // Safety: `StreamBuffer` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_stream_buffer_is_full(self.id()) }
    }
}

/// A stream buffer whose control block and storage are allocated from the
/// kernel heap.
pub struct DynamicStreamBuffer<System: raw::KernelStreamBuffer>(StreamBuffer<System>);

impl<System: raw::KernelStreamBuffer> DynamicStreamBuffer<System> {
    /// Create an empty stream buffer of `size` bytes that releases a blocked
    /// reader once `trigger_level` bytes are present. Check [`is_valid`] for
    /// success.
    ///
    /// [`is_valid`]: StreamBuffer::is_valid
    pub fn new(size: usize, trigger_level: usize) -> Self {
        Self(StreamBuffer::from_create_result(
            System::raw_stream_buffer_create(size, trigger_level, StreamBufferKind::Stream),
        ))
    }
}

impl<System: raw::KernelStreamBuffer> Deref for DynamicStreamBuffer<System> {
    type Target = StreamBuffer<System>;

    #[inline]
    fn deref(&self) -> &StreamBuffer<System> {
        &self.0
    }
}

/// A stream buffer of `SIZE` bytes with an embedded control block and
/// storage.
pub struct StaticStreamBuffer<System: raw::KernelStreamBuffer, const SIZE: usize> {
    stream_buffer: StreamBuffer<System>,
    cb: UnsafeCell<MaybeUninit<System::RawStaticStreamBufferCb>>,
    storage: UnsafeCell<MaybeUninit<[u8; SIZE]>>,
    trigger_level: usize,
    _pin: PhantomPinned,
}

// Safety: `cb` and `storage` are only accessed by the kernel
unsafe impl<System: raw::KernelStreamBuffer, const SIZE: usize> Send
    for StaticStreamBuffer<System, SIZE>
{
}
unsafe impl<System: raw::KernelStreamBuffer, const SIZE: usize> Sync
    for StaticStreamBuffer<System, SIZE>
{
}

impl<System: raw::KernelStreamBuffer, const SIZE: usize> StaticStreamBuffer<System, SIZE> {
    /// Construct an unregistered (invalid) stream buffer.
    pub const fn new(trigger_level: usize) -> Self {
        Self {
            stream_buffer: StreamBuffer::from_raw(None),
            cb: UnsafeCell::new(MaybeUninit::uninit()),
            storage: UnsafeCell::new(MaybeUninit::uninit()),
            trigger_level,
            _pin: PhantomPinned,
        }
    }

    /// Register the stream buffer with the kernel. Returns `true` on success
    /// or if already registered.
    pub fn init(self: Pin<&mut Self>) -> bool {
        // Safety: No fields are moved out of `self`
        let this = unsafe { self.get_unchecked_mut() };
        if !this.stream_buffer.is_valid() {
            // Safety: `this` is pinned, and `stream_buffer` is dropped before
            //         `cb` and `storage`
            this.stream_buffer = StreamBuffer::from_create_result(unsafe {
                System::raw_stream_buffer_create_static(
                    SIZE,
                    this.trigger_level,
                    StreamBufferKind::Stream,
                    this.storage.get().cast(),
                    this.cb.get().cast(),
                )
            });
        }
        this.stream_buffer.is_valid()
    }
}

impl<System: raw::KernelStreamBuffer, const SIZE: usize> Deref
    for StaticStreamBuffer<System, SIZE>
{
    type Target = StreamBuffer<System>;

    #[inline]
    fn deref(&self) -> &StreamBuffer<System> {
        &self.stream_buffer
    }
}
