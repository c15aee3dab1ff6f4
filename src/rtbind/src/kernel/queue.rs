//! Queues
use core::{
    cell::UnsafeCell,
    marker::{PhantomData, PhantomPinned},
    mem::{size_of, MaybeUninit},
    ops::Deref,
    pin::Pin,
};

use super::{raw, raw::SendPosition, HigherPriorityTaskWoken, ResultCode, TickType};

/// Owns a single queue of `T` items, which are copied into and out of the
/// queue by value.
///
/// Use [`DynamicQueue`] or [`StaticQueue`] to create one.
pub struct Queue<System: raw::KernelQueue, T: Copy> {
    handle: Option<System::RawQueueId>,
    _phantom: PhantomData<fn(T) -> T>,
}

// Safety: Items are only ever moved between tasks by value
unsafe impl<System: raw::KernelQueue, T: Copy + Send> Send for Queue<System, T> {}
unsafe impl<System: raw::KernelQueue, T: Copy + Send> Sync for Queue<System, T> {}

impl<System: raw::KernelQueue, T: Copy> Queue<System, T> {
    const fn from_raw(handle: Option<System::RawQueueId>) -> Self {
        Self {
            handle,
            _phantom: PhantomData,
        }
    }

    fn from_create_result(result: Result<System::RawQueueId, ResultCode>) -> Self {
        match result {
            Ok(id) => Self::from_raw(Some(id)),
            Err(e) => {
                log::debug!("Queue creation failed: {:?}", e);
                Self::from_raw(None)
            }
        }
    }

    /// Get a flag indicating whether the queue was created successfully and
    /// is still owned by `self`.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    #[inline]
    pub fn raw_id(&self) -> Option<System::RawQueueId> {
        self.handle
    }

    #[inline]
    #[track_caller]
    fn id(&self) -> System::RawQueueId {
        match self.handle {
            Some(id) => id,
            None => super::macros::invalid_handle("Queue"),
        }
    }

    #[inline]
    fn send(&self, item: &T, position: SendPosition, ticks: TickType) -> bool {
        // Safety: `Queue` represents a permission to access the referenced
        //         object, and the queue was created with `size_of::<T>()`
        //         items
        unsafe { System::raw_queue_send(self.id(), (item as *const T).cast(), position, ticks) }
            .is_success()
    }

    #[inline]
    fn send_from_isr(
        &self,
        item: &T,
        position: SendPosition,
        woken: &mut HigherPriorityTaskWoken,
    ) -> bool {
        let id = self.id();
        // Safety: See `send`
        woken
            .track(|w| unsafe {
                System::raw_queue_send_from_isr(id, (item as *const T).cast(), position, w)
            })
            .is_success()
    }

    /// Append `item` to the back of the queue, blocking for up to `ticks`
    /// ticks for a free slot. Returns `false` on timeout.
    #[inline]
    pub fn send_to_back(&self, item: T, ticks: TickType) -> bool {
        self.send(&item, SendPosition::Back, ticks)
    }

    /// Insert `item` at the front of the queue, blocking for up to `ticks`
    /// ticks for a free slot. Returns `false` on timeout.
    #[inline]
    pub fn send_to_front(&self, item: T, ticks: TickType) -> bool {
        self.send(&item, SendPosition::Front, ticks)
    }

    /// Store `item` in a length-1 queue, replacing the item it holds if any.
    #[inline]
    pub fn overwrite(&self, item: T) -> bool {
        self.send(&item, SendPosition::Overwrite, 0)
    }

    #[inline]
    pub fn send_to_back_from_isr(&self, item: T, woken: &mut HigherPriorityTaskWoken) -> bool {
        self.send_from_isr(&item, SendPosition::Back, woken)
    }

    #[inline]
    pub fn send_to_front_from_isr(&self, item: T, woken: &mut HigherPriorityTaskWoken) -> bool {
        self.send_from_isr(&item, SendPosition::Front, woken)
    }

    #[inline]
    pub fn overwrite_from_isr(&self, item: T, woken: &mut HigherPriorityTaskWoken) -> bool {
        self.send_from_isr(&item, SendPosition::Overwrite, woken)
    }

    /// Remove the front item, blocking for up to `ticks` ticks for one to
    /// arrive. Returns `None` on timeout.
    #[inline]
    pub fn receive(&self, ticks: TickType) -> Option<T> {
        let mut item = MaybeUninit::<T>::uninit();
        // Safety: `Queue` represents a permission to access the referenced
        //         object, and `item` can hold `size_of::<T>()` bytes
        let result = unsafe { System::raw_queue_receive(self.id(), item.as_mut_ptr().cast(), ticks) };
        // Safety: The kernel filled `item` with a `T` sent to the queue
        result
            .is_success()
            .then(|| unsafe { item.assume_init() })
    }

    #[inline]
    pub fn receive_from_isr(&self, woken: &mut HigherPriorityTaskWoken) -> Option<T> {
        let id = self.id();
        let mut item = MaybeUninit::<T>::uninit();
        // Safety: See `receive`
        let result = woken.track(|w| unsafe {
            System::raw_queue_receive_from_isr(id, item.as_mut_ptr().cast(), w)
        });
        // Safety: See `receive`
        result
            .is_success()
            .then(|| unsafe { item.assume_init() })
    }

    /// Copy the front item without removing it, blocking for up to `ticks`
    /// ticks for one to arrive.
    #[inline]
    pub fn peek(&self, ticks: TickType) -> Option<T> {
        let mut item = MaybeUninit::<T>::uninit();
        // Safety: See `receive`
        let result = unsafe { System::raw_queue_peek(self.id(), item.as_mut_ptr().cast(), ticks) };
        // Safety: See `receive`
        result
            .is_success()
            .then(|| unsafe { item.assume_init() })
    }

    #[inline]
    pub fn peek_from_isr(&self) -> Option<T> {
        let mut item = MaybeUninit::<T>::uninit();
        // Safety: See `receive`
        let result = unsafe { System::raw_queue_peek_from_isr(self.id(), item.as_mut_ptr().cast()) };
        // Safety: See `receive`
        result
            .is_success()
            .then(|| unsafe { item.assume_init() })
    }

    #[inline]
    pub fn messages_waiting(&self) -> usize {
        // Safety: `Queue` represents a permission to access the referenced
        //         object.
        unsafe { System::raw_queue_messages_waiting(self.id()) }
    }

    #[inline]
    pub fn messages_waiting_from_isr(&self) -> usize {
        // Safety: `Queue` represents a permission to access the referenced
        //         object.
        unsafe { System::raw_queue_messages_waiting_from_isr(self.id()) }
    }

    #[inline]
    pub fn spaces_available(&self) -> usize {
        // Safety: `Queue` represents a permission to access the referenced
        //         object.
        unsafe { System::raw_queue_spaces_available(self.id()) }
    }

    /// Discard all items.
    #[inline]
    pub fn reset(&self) {
        // Safety: `Queue` represents a permission to access the referenced
        //         object.
        unsafe { System::raw_queue_reset(self.id()) }
    }

    #[inline]
    pub fn is_full_from_isr(&self) -> bool {
        // Safety: `Queue` represents a permission to access the referenced
        //         object.
        unsafe { System::raw_queue_is_full_from_isr(self.id()) }
    }

    #[inline]
    pub fn is_empty_from_isr(&self) -> bool {
        // Safety: `Queue` represents a permission to access the referenced
        //         object.
        unsafe { System::raw_queue_is_empty_from_isr(self.id()) }
    }

    /// Register the queue under `name` with the kernel's queue registry.
    #[inline]
    pub fn add_to_registry(&self, name: &'static str) {
        // Safety: `Queue` represents a permission to access the referenced
        //         object.
        unsafe { System::raw_queue_add_to_registry(self.id(), name) }
    }

    #[inline]
    pub fn unregister(&self) {
        // Safety: `Queue` represents a permission to access the referenced
        //         object.
        unsafe { System::raw_queue_unregister(self.id()) }
    }

    /// Get the name the queue was registered under.
    #[inline]
    pub fn name(&self) -> Option<&'static str> {
        // Safety: `Queue` represents a permission to access the referenced
        //         object.
        unsafe { System::raw_queue_name(self.id()) }
    }
}

impl<System: raw::KernelQueue, T: Copy> Drop for Queue<System, T> {
    fn drop(&mut self) {
        if let Some(id) = self.handle.take() {
            log::trace!("deleting Queue {:?}", id);
            // Safety: `self` owned the object, and it's not accessible
            //         anymore
            unsafe { System::raw_queue_delete(id) };
        }
    }
}

impl<System: raw::KernelQueue, T: Copy> core::fmt::Debug for Queue<System, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_tuple("Queue").field(&self.handle).finish()
    }
}

/// A queue whose control block and storage are allocated from the kernel
/// heap.
pub struct DynamicQueue<System: raw::KernelQueue, T: Copy>(Queue<System, T>);

impl<System: raw::KernelQueue, T: Copy> DynamicQueue<System, T> {
    /// Create an empty queue holding at most `length` items. Check
    /// [`is_valid`] for success.
    ///
    /// [`is_valid`]: Queue::is_valid
    pub fn new(length: usize) -> Self {
        Self(Queue::from_create_result(System::raw_queue_create(
            length,
            size_of::<T>(),
        )))
    }
}

impl<System: raw::KernelQueue, T: Copy> Deref for DynamicQueue<System, T> {
    type Target = Queue<System, T>;

    #[inline]
    fn deref(&self) -> &Queue<System, T> {
        &self.0
    }
}

/// A queue of at most `LENGTH` items with an embedded control block and
/// storage.
pub struct StaticQueue<System: raw::KernelQueue, T: Copy, const LENGTH: usize> {
    queue: Queue<System, T>,
    cb: UnsafeCell<MaybeUninit<System::RawStaticQueueCb>>,
    storage: UnsafeCell<MaybeUninit<[T; LENGTH]>>,
    _pin: PhantomPinned,
}

// Safety: `cb` and `storage` are only accessed by the kernel
unsafe impl<System: raw::KernelQueue, T: Copy + Send, const LENGTH: usize> Send
    for StaticQueue<System, T, LENGTH>
{
}
unsafe impl<System: raw::KernelQueue, T: Copy + Send, const LENGTH: usize> Sync
    for StaticQueue<System, T, LENGTH>
{
}

impl<System: raw::KernelQueue, T: Copy, const LENGTH: usize> StaticQueue<System, T, LENGTH> {
    /// Construct an unregistered (invalid) queue.
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            queue: Queue::from_raw(None),
            cb: UnsafeCell::new(MaybeUninit::uninit()),
            storage: UnsafeCell::new(MaybeUninit::uninit()),
            _pin: PhantomPinned,
        }
    }

    /// Register the queue with the kernel. Returns `true` on success or if
    /// already registered.
    pub fn init(self: Pin<&mut Self>) -> bool {
        // Safety: No fields are moved out of `self`
        let this = unsafe { self.get_unchecked_mut() };
        if !this.queue.is_valid() {
            // Safety: `this` is pinned, and `queue` is dropped before `cb`
            //         and `storage`
            this.queue = Queue::from_create_result(unsafe {
                System::raw_queue_create_static(
                    LENGTH,
                    size_of::<T>(),
                    this.storage.get().cast(),
                    this.cb.get().cast(),
                )
            });
        }
        this.queue.is_valid()
    }
}

impl<System: raw::KernelQueue, T: Copy, const LENGTH: usize> Deref
    for StaticQueue<System, T, LENGTH>
{
    type Target = Queue<System, T>;

    #[inline]
    fn deref(&self) -> &Queue<System, T> {
        &self.queue
    }
}
