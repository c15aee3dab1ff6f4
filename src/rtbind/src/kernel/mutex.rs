//! Mutexes
//!
//! A mutex differs from a binary semaphore in that it has an owner, and the
//! owner's priority is raised to that of the highest-priority task waiting
//! for the mutex (priority inheritance). Mutexes must not be used from
//! interrupt handlers except through [`Mutex::lock_from_isr`].
use core::{marker::PhantomData, marker::PhantomPinned, ops::Deref, pin::Pin};

use super::{
    raw, raw::SemaphoreKind, semaphore::SemaphoreCb, HigherPriorityTaskWoken, TaskRef, TickType,
};

define_handle! {
    /// Owns a single non-recursive mutex.
    pub struct Mutex<System: KernelSemaphore>(System::RawSemaphoreId);
    delete = raw_semaphore_delete;
}

define_handle! {
    /// Owns a single recursive mutex, which its owner can lock repeatedly.
    /// The mutex is released after as many unlocks as locks.
    pub struct RecursiveMutex<System: KernelSemaphore>(System::RawSemaphoreId);
    delete = raw_semaphore_delete;
}

impl<System: raw::KernelSemaphore> Mutex<System> {
    /// Lock the mutex, blocking for up to `ticks` ticks. Returns `false` on
    /// timeout.
    ///
    /// Locking a mutex already held by the current task deadlocks until the
    /// timeout expires.
    #[inline]
    pub fn lock(&self, ticks: TickType) -> bool {
        // Safety: `Mutex` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_semaphore_take(self.id(), ticks) }.is_success()
    }

    /// Attempt to lock the mutex from an interrupt handler. Never blocks.
    #[inline]
    pub fn lock_from_isr(&self, woken: &mut HigherPriorityTaskWoken) -> bool {
        let id = self.id();
        // Safety: `Mutex` represents a permission to access the
        //         referenced object.
        woken
            .track(|w| unsafe { System::raw_semaphore_take_from_isr(id, w) })
            .is_success()
    }

    /// Unlock the mutex. Returns `false` if the current task does not hold
    /// it.
    #[inline]
    pub fn unlock(&self) -> bool {
        // Safety: `Mutex` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_semaphore_give(self.id()) }.is_success()
    }

    /// Lock the mutex and return a guard that unlocks it when dropped.
    /// Returns `None` on timeout.
    #[inline]
    pub fn lock_guard(&self, ticks: TickType) -> Option<MutexGuard<'_, System>> {
        if self.lock(ticks) {
            Some(MutexGuard {
                mutex: self,
                _no_send_sync: PhantomData,
            })
        } else {
            None
        }
    }

    /// Get the task currently holding the mutex.
    #[inline]
    pub fn holder(&self) -> Option<TaskRef<System>>
    where
        System: raw::KernelTask,
    {
        // Safety: `Mutex` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_semaphore_holder(self.id()) }.map(TaskRef::from_id)
    }
}

impl<System: raw::KernelSemaphore> RecursiveMutex<System> {
    /// Lock the mutex, or increment its lock count if the current task
    /// already holds it. Returns `false` on timeout.
    #[inline]
    pub fn lock(&self, ticks: TickType) -> bool {
        // Safety: `RecursiveMutex` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_semaphore_take_recursive(self.id(), ticks) }.is_success()
    }

    /// Decrement the lock count, releasing the mutex when it reaches zero.
    /// Returns `false` if the current task does not hold the mutex.
    #[inline]
    pub fn unlock(&self) -> bool {
        // Safety: `RecursiveMutex` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_semaphore_give_recursive(self.id()) }.is_success()
    }

    /// Lock the mutex and return a guard that unlocks it once when dropped.
    #[inline]
    pub fn lock_guard(&self, ticks: TickType) -> Option<RecursiveMutexGuard<'_, System>> {
        if self.lock(ticks) {
            Some(RecursiveMutexGuard {
                mutex: self,
                _no_send_sync: PhantomData,
            })
        } else {
            None
        }
    }

    /// Get the task currently holding the mutex.
    #[inline]
    pub fn holder(&self) -> Option<TaskRef<System>>
    where
        System: raw::KernelTask,
    {
        // Safety: `RecursiveMutex` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_semaphore_holder(self.id()) }.map(TaskRef::from_id)
    }
}

/// An RAII implementation of a "scoped lock" of a [`Mutex`]. When this
/// structure is dropped (falls out of scope), the lock will be released.
#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a, System: raw::KernelSemaphore> {
    mutex: &'a Mutex<System>,
    _no_send_sync: PhantomData<*mut ()>,
}

impl<System: raw::KernelSemaphore> Drop for MutexGuard<'_, System> {
    #[inline]
    fn drop(&mut self) {
        let unlocked = self.mutex.unlock();
        debug_assert!(unlocked, "the guard outlived the lock");
    }
}

/// An RAII implementation of a "scoped lock" of a [`RecursiveMutex`].
#[must_use = "if unused the RecursiveMutex will immediately unlock"]
pub struct RecursiveMutexGuard<'a, System: raw::KernelSemaphore> {
    mutex: &'a RecursiveMutex<System>,
    _no_send_sync: PhantomData<*mut ()>,
}

impl<System: raw::KernelSemaphore> Drop for RecursiveMutexGuard<'_, System> {
    #[inline]
    fn drop(&mut self) {
        let unlocked = self.mutex.unlock();
        debug_assert!(unlocked, "the guard outlived the lock");
    }
}

/// A mutex whose control block is allocated from the kernel heap.
pub struct DynamicMutex<System: raw::KernelSemaphore>(Mutex<System>);

impl<System: raw::KernelSemaphore> DynamicMutex<System> {
    /// Create an unlocked mutex. Check [`is_valid`] for success.
    ///
    /// [`is_valid`]: Mutex::is_valid
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Mutex::from_create_result(System::raw_semaphore_create(
            SemaphoreKind::Mutex,
        )))
    }
}

/// A recursive mutex whose control block is allocated from the kernel heap.
pub struct DynamicRecursiveMutex<System: raw::KernelSemaphore>(RecursiveMutex<System>);

impl<System: raw::KernelSemaphore> DynamicRecursiveMutex<System> {
    /// Create an unlocked recursive mutex. Check [`is_valid`] for success.
    ///
    /// [`is_valid`]: RecursiveMutex::is_valid
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(RecursiveMutex::from_create_result(
            System::raw_semaphore_create(SemaphoreKind::RecursiveMutex),
        ))
    }
}

/// A mutex with an embedded control block.
///
/// ```rust,ignore
/// let mutex = core::pin::pin!(StaticMutex::<System>::new());
/// assert!(mutex.as_mut().init());
/// let _guard = mutex.lock_guard(MAX_DELAY);
/// ```
pub struct StaticMutex<System: raw::KernelSemaphore> {
    mutex: Mutex<System>,
    cb: SemaphoreCb<System>,
    _pin: PhantomPinned,
}

/// A recursive mutex with an embedded control block.
pub struct StaticRecursiveMutex<System: raw::KernelSemaphore> {
    mutex: RecursiveMutex<System>,
    cb: SemaphoreCb<System>,
    _pin: PhantomPinned,
}

// Safety: `cb` is only accessed by the kernel
unsafe impl<System: raw::KernelSemaphore> Send for StaticMutex<System> {}
unsafe impl<System: raw::KernelSemaphore> Sync for StaticMutex<System> {}
unsafe impl<System: raw::KernelSemaphore> Send for StaticRecursiveMutex<System> {}
unsafe impl<System: raw::KernelSemaphore> Sync for StaticRecursiveMutex<System> {}

impl<System: raw::KernelSemaphore> StaticMutex<System> {
    /// Construct an unregistered (invalid) mutex.
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            mutex: Mutex::from_raw(None),
            cb: SemaphoreCb::new(),
            _pin: PhantomPinned,
        }
    }

    /// Register the mutex with the kernel. Returns `true` on success or if
    /// already registered.
    pub fn init(self: Pin<&mut Self>) -> bool {
        // Safety: No fields are moved out of `self`
        let this = unsafe { self.get_unchecked_mut() };
        if !this.mutex.is_valid() {
            // Safety: `this` is pinned, and `mutex` is dropped before `cb`
            this.mutex = Mutex::from_create_result(unsafe { this.cb.create(SemaphoreKind::Mutex) });
        }
        this.mutex.is_valid()
    }
}

impl<System: raw::KernelSemaphore> StaticRecursiveMutex<System> {
    /// Construct an unregistered (invalid) recursive mutex.
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            mutex: RecursiveMutex::from_raw(None),
            cb: SemaphoreCb::new(),
            _pin: PhantomPinned,
        }
    }

    /// Register the mutex with the kernel. Returns `true` on success or if
    /// already registered.
    pub fn init(self: Pin<&mut Self>) -> bool {
        // Safety: No fields are moved out of `self`
        let this = unsafe { self.get_unchecked_mut() };
        if !this.mutex.is_valid() {
            // Safety: `this` is pinned, and `mutex` is dropped before `cb`
            this.mutex = RecursiveMutex::from_create_result(unsafe {
                this.cb.create(SemaphoreKind::RecursiveMutex)
            });
        }
        this.mutex.is_valid()
    }
}

impl<System: raw::KernelSemaphore> Deref for DynamicMutex<System> {
    type Target = Mutex<System>;

    #[inline]
    fn deref(&self) -> &Mutex<System> {
        &self.0
    }
}

impl<System: raw::KernelSemaphore> Deref for DynamicRecursiveMutex<System> {
    type Target = RecursiveMutex<System>;

    #[inline]
    fn deref(&self) -> &RecursiveMutex<System> {
        &self.0
    }
}

impl<System: raw::KernelSemaphore> Deref for StaticMutex<System> {
    type Target = Mutex<System>;

    #[inline]
    fn deref(&self) -> &Mutex<System> {
        &self.mutex
    }
}

impl<System: raw::KernelSemaphore> Deref for StaticRecursiveMutex<System> {
    type Target = RecursiveMutex<System>;

    #[inline]
    fn deref(&self) -> &RecursiveMutex<System> {
        &self.mutex
    }
}
