//! Semaphores
use core::{cell::UnsafeCell, marker::PhantomPinned, mem::MaybeUninit, ops::Deref, pin::Pin};

use super::{raw, raw::SemaphoreKind, HigherPriorityTaskWoken, ResultCode, TickType};

/// Semaphore count.
pub type SemaphoreValue = usize;

define_handle! {
    /// Owns a single semaphore.
    ///
    /// A semaphore maintains a count of permits that can be taken (possibly
    /// blocking) or given by application code and interrupt handlers. Use
    /// [`BinarySemaphore`] or [`CountingSemaphore`] (or their static
    /// counterparts) to create one.
    pub struct Semaphore<System: KernelSemaphore>(System::RawSemaphoreId);
    delete = raw_semaphore_delete;
}

impl<System: raw::KernelSemaphore> Semaphore<System> {
    /// Get the number of permits currently held by the semaphore.
    #[inline]
    pub fn count(&self) -> SemaphoreValue {
        // Safety: `Semaphore` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_semaphore_count(self.id()) }
    }

    /// Take a permit, blocking for up to `ticks` ticks until one is
    /// available. Returns `false` on timeout.
    #[inline]
    pub fn take(&self, ticks: TickType) -> bool {
        // Safety: `Semaphore` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_semaphore_take(self.id(), ticks) }.is_success()
    }

    /// The interrupt-context form of [`take`](Self::take). Never blocks.
    #[inline]
    pub fn take_from_isr(&self, woken: &mut HigherPriorityTaskWoken) -> bool {
        let id = self.id();
        // Safety: `Semaphore` represents a permission to access the
        //         referenced object.
        woken
            .track(|w| unsafe { System::raw_semaphore_take_from_isr(id, w) })
            .is_success()
    }

    /// Return a permit. Returns `false` if the semaphore is already at its
    /// maximum count.
    #[inline]
    pub fn give(&self) -> bool {
        // Safety: `Semaphore` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_semaphore_give(self.id()) }.is_success()
    }

    /// The interrupt-context form of [`give`](Self::give).
    #[inline]
    pub fn give_from_isr(&self, woken: &mut HigherPriorityTaskWoken) -> bool {
        let id = self.id();
        // Safety: `Semaphore` represents a permission to access the
        //         referenced object.
        woken
            .track(|w| unsafe { System::raw_semaphore_give_from_isr(id, w) })
            .is_success()
    }
}

/// A semaphore with a maximum count of one, created empty. Its control
/// block is allocated from the kernel heap.
pub struct BinarySemaphore<System: raw::KernelSemaphore>(Semaphore<System>);

impl<System: raw::KernelSemaphore> BinarySemaphore<System> {
    /// Create an empty binary semaphore. Check [`is_valid`] for success.
    ///
    /// [`is_valid`]: Semaphore::is_valid
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Semaphore::from_create_result(System::raw_semaphore_create(
            SemaphoreKind::Binary,
        )))
    }
}

/// A counting semaphore whose control block is allocated from the kernel
/// heap.
pub struct CountingSemaphore<System: raw::KernelSemaphore>(Semaphore<System>);

impl<System: raw::KernelSemaphore> CountingSemaphore<System> {
    /// Create a counting semaphore holding `initial` of at most `max`
    /// permits. Check [`is_valid`] for success.
    ///
    /// [`is_valid`]: Semaphore::is_valid
    pub fn new(max: SemaphoreValue, initial: SemaphoreValue) -> Self {
        Self(Semaphore::from_create_result(System::raw_semaphore_create(
            SemaphoreKind::Counting { max, initial },
        )))
    }
}

/// The embedded control block shared by the static semaphore and mutex
/// variants.
pub(crate) struct SemaphoreCb<System: raw::KernelSemaphore>(
    UnsafeCell<MaybeUninit<System::RawStaticSemaphoreCb>>,
);

impl<System: raw::KernelSemaphore> SemaphoreCb<System> {
    pub(crate) const fn new() -> Self {
        Self(UnsafeCell::new(MaybeUninit::uninit()))
    }

    /// # Safety
    ///
    /// `self` must not be moved or deallocated until the created object is
    /// deleted.
    pub(crate) unsafe fn create(
        &self,
        kind: SemaphoreKind,
    ) -> Result<System::RawSemaphoreId, ResultCode> {
        // Safety: Upheld by the caller
        unsafe { System::raw_semaphore_create_static(kind, self.0.get().cast()) }
    }
}

/// A binary semaphore with an embedded control block.
///
/// Construct with [`new`](Self::new), pin, and register with
/// [`init`](Self::init).
pub struct StaticBinarySemaphore<System: raw::KernelSemaphore> {
    semaphore: Semaphore<System>,
    cb: SemaphoreCb<System>,
    _pin: PhantomPinned,
}

// Safety: `cb` is only accessed by the kernel
unsafe impl<System: raw::KernelSemaphore> Send for StaticBinarySemaphore<System> {}
unsafe impl<System: raw::KernelSemaphore> Sync for StaticBinarySemaphore<System> {}

impl<System: raw::KernelSemaphore> StaticBinarySemaphore<System> {
    /// Construct an unregistered (invalid) semaphore.
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            semaphore: Semaphore::from_raw(None),
            cb: SemaphoreCb::new(),
            _pin: PhantomPinned,
        }
    }

    /// Register the semaphore with the kernel. Returns `true` on success or
    /// if already registered.
    pub fn init(self: Pin<&mut Self>) -> bool {
        // Safety: No fields are moved out of `self`
        let this = unsafe { self.get_unchecked_mut() };
        if !this.semaphore.is_valid() {
            // Safety: `this` is pinned, and `semaphore` is dropped (deleting
            //         the object) before `cb`
            this.semaphore =
                Semaphore::from_create_result(unsafe { this.cb.create(SemaphoreKind::Binary) });
        }
        this.semaphore.is_valid()
    }
}

/// A counting semaphore with an embedded control block.
///
/// Construct with [`new`](Self::new), pin, and register with
/// [`init`](Self::init).
pub struct StaticCountingSemaphore<System: raw::KernelSemaphore> {
    semaphore: Semaphore<System>,
    cb: SemaphoreCb<System>,
    max: SemaphoreValue,
    initial: SemaphoreValue,
    _pin: PhantomPinned,
}

// Safety: `cb` is only accessed by the kernel
unsafe impl<System: raw::KernelSemaphore> Send for StaticCountingSemaphore<System> {}
unsafe impl<System: raw::KernelSemaphore> Sync for StaticCountingSemaphore<System> {}

impl<System: raw::KernelSemaphore> StaticCountingSemaphore<System> {
    /// Construct an unregistered (invalid) semaphore that will hold `initial`
    /// of at most `max` permits.
    pub const fn new(max: SemaphoreValue, initial: SemaphoreValue) -> Self {
        Self {
            semaphore: Semaphore::from_raw(None),
            cb: SemaphoreCb::new(),
            max,
            initial,
            _pin: PhantomPinned,
        }
    }

    /// Register the semaphore with the kernel. Returns `true` on success or
    /// if already registered.
    pub fn init(self: Pin<&mut Self>) -> bool {
        // Safety: No fields are moved out of `self`
        let this = unsafe { self.get_unchecked_mut() };
        if !this.semaphore.is_valid() {
            let kind = SemaphoreKind::Counting {
                max: this.max,
                initial: this.initial,
            };
            // Safety: `this` is pinned, and `semaphore` is dropped (deleting
            //         the object) before `cb`
            this.semaphore = Semaphore::from_create_result(unsafe { this.cb.create(kind) });
        }
        this.semaphore.is_valid()
    }
}

macro_rules! impl_deref_to_semaphore {
    ($($Ty:ident),*) => {$(
        impl<System: raw::KernelSemaphore> Deref for $Ty<System> {
            type Target = Semaphore<System>;

            #[inline]
            fn deref(&self) -> &Semaphore<System> {
                &self.0
            }
        }
    )*};
}

impl_deref_to_semaphore!(BinarySemaphore, CountingSemaphore);

impl<System: raw::KernelSemaphore> Deref for StaticBinarySemaphore<System> {
    type Target = Semaphore<System>;

    #[inline]
    fn deref(&self) -> &Semaphore<System> {
        &self.semaphore
    }
}

impl<System: raw::KernelSemaphore> Deref for StaticCountingSemaphore<System> {
    type Target = Semaphore<System>;

    #[inline]
    fn deref(&self) -> &Semaphore<System> {
        &self.semaphore
    }
}
