//! Event groups
use core::{cell::UnsafeCell, marker::PhantomPinned, mem::MaybeUninit, ops::Deref, pin::Pin};

use super::{raw, raw::RawEventBits, EventBits, HigherPriorityTaskWoken, TickType};

pub use super::raw::EventGroupWaitFlags;

define_handle! {
    /// Owns a single event group, a set of [`EVENT_BITS_WIDTH`] flags tasks
    /// can wait on.
    ///
    /// [`EVENT_BITS_WIDTH`]: super::EVENT_BITS_WIDTH
    pub struct EventGroup<System: KernelEventGroup>(System::RawEventGroupId);
    delete = raw_event_group_delete;
}

#[inline]
fn to_raw(bits: EventBits) -> RawEventBits {
    // `EventBits` never exceeds the width of `RawEventBits`
    #[allow(clippy::unnecessary_cast)]
    let raw = bits.raw() as RawEventBits;
    raw
}

#[inline]
fn from_raw(raw: RawEventBits) -> EventBits {
    #[allow(clippy::unnecessary_cast)]
    EventBits::from_raw(raw as u32)
}

impl<System: raw::KernelEventGroup> EventGroup<System> {
    /// Wait for any of `bits` to be set, or all of them if `flags` contains
    /// [`EventGroupWaitFlags::ALL`], blocking for up to `ticks` ticks.
    ///
    /// Returns the flags at the moment the condition was satisfied or the
    /// timeout expired. The caller tells the two apart by inspecting the
    /// result. With [`EventGroupWaitFlags::CLEAR`], `bits` are cleared on
    /// success.
    #[inline]
    pub fn wait(&self, bits: EventBits, flags: EventGroupWaitFlags, ticks: TickType) -> EventBits {
        // Safety: `EventGroup` represents a permission to access the
        //         referenced object.
        from_raw(unsafe { System::raw_event_group_wait(self.id(), to_raw(bits), flags, ticks) })
    }

    /// Set `bits`. Returns the flags after waiting tasks were released,
    /// which may lack bits cleared on their behalf.
    #[inline]
    pub fn set(&self, bits: EventBits) -> EventBits {
        // Safety: `EventGroup` represents a permission to access the
        //         referenced object.
        from_raw(unsafe { System::raw_event_group_set(self.id(), to_raw(bits)) })
    }

    /// The interrupt-context form of [`set`](Self::set). Returns `false` if
    /// the request could not be posted.
    #[inline]
    pub fn set_from_isr(&self, bits: EventBits, woken: &mut HigherPriorityTaskWoken) -> bool {
        let id = self.id();
        // Safety: `EventGroup` represents a permission to access the
        //         referenced object.
        woken
            .track(|w| unsafe { System::raw_event_group_set_from_isr(id, to_raw(bits), w) })
            .is_success()
    }

    /// Clear `bits`. Returns the flags before they were cleared.
    #[inline]
    pub fn clear(&self, bits: EventBits) -> EventBits {
        // Safety: `EventGroup` represents a permission to access the
        //         referenced object.
        from_raw(unsafe { System::raw_event_group_clear(self.id(), to_raw(bits)) })
    }

    #[inline]
    pub fn clear_from_isr(&self, bits: EventBits) -> bool {
        // Safety: `EventGroup` represents a permission to access the
        //         referenced object.
        unsafe { System::raw_event_group_clear_from_isr(self.id(), to_raw(bits)) }.is_success()
    }

    #[inline]
    pub fn get(&self) -> EventBits {
        // Safety: `EventGroup` represents a permission to access the
        //         referenced object.
        from_raw(unsafe { System::raw_event_group_get(self.id()) })
    }

    #[inline]
    pub fn get_from_isr(&self) -> EventBits {
        // Safety: `EventGroup` represents a permission to access the
        //         referenced object.
        from_raw(unsafe { System::raw_event_group_get_from_isr(self.id()) })
    }

    /// Set `set`, then wait for all of `wait_for` and clear them. Used by a
    /// number of tasks to meet at a rendezvous point.
    #[inline]
    pub fn sync(&self, set: EventBits, wait_for: EventBits, ticks: TickType) -> EventBits {
        // Safety: `EventGroup` represents a permission to access the
        //         referenced object.
        from_raw(unsafe {
            System::raw_event_group_sync(self.id(), to_raw(set), to_raw(wait_for), ticks)
        })
    }
}

/// An event group whose control block is allocated from the kernel heap.
pub struct DynamicEventGroup<System: raw::KernelEventGroup>(EventGroup<System>);

impl<System: raw::KernelEventGroup> DynamicEventGroup<System> {
    /// Create an event group with all flags clear. Check [`is_valid`] for
    /// success.
    ///
    /// [`is_valid`]: EventGroup::is_valid
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(EventGroup::from_create_result(
            System::raw_event_group_create(),
        ))
    }
}

impl<System: raw::KernelEventGroup> Deref for DynamicEventGroup<System> {
    type Target = EventGroup<System>;

    #[inline]
    fn deref(&self) -> &EventGroup<System> {
        &self.0
    }
}

/// An event group with an embedded control block.
pub struct StaticEventGroup<System: raw::KernelEventGroup> {
    event_group: EventGroup<System>,
    cb: UnsafeCell<MaybeUninit<System::RawStaticEventGroupCb>>,
    _pin: PhantomPinned,
}

// Safety: `cb` is only accessed by the kernel
unsafe impl<System: raw::KernelEventGroup> Send for StaticEventGroup<System> {}
unsafe impl<System: raw::KernelEventGroup> Sync for StaticEventGroup<System> {}

impl<System: raw::KernelEventGroup> StaticEventGroup<System> {
    /// Construct an unregistered (invalid) event group.
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            event_group: EventGroup::from_raw(None),
            cb: UnsafeCell::new(MaybeUninit::uninit()),
            _pin: PhantomPinned,
        }
    }

    /// Register the event group with the kernel. Returns `true` on success
    /// or if already registered.
    pub fn init(self: Pin<&mut Self>) -> bool {
        // Safety: No fields are moved out of `self`
        let this = unsafe { self.get_unchecked_mut() };
        if !this.event_group.is_valid() {
            // Safety: `this` is pinned, and `event_group` is dropped before
            //         `cb`
            this.event_group = EventGroup::from_create_result(unsafe {
                System::raw_event_group_create_static(this.cb.get().cast())
            });
        }
        this.event_group.is_valid()
    }
}

impl<System: raw::KernelEventGroup> Deref for StaticEventGroup<System> {
    type Target = EventGroup<System>;

    #[inline]
    fn deref(&self) -> &EventGroup<System> {
        &self.event_group
    }
}
