//! Software timers
//!
//! Timer callbacks run in the kernel's timer service task. Every timer is
//! registered with the same trampoline function, which recovers the owning
//! [`Timer`] from the timer's context value and calls its body once per
//! expiry.
//!
//! Timer operations are commands posted to the timer service task and may
//! block for up to the given number of ticks if its command queue is full.
use core::{
    cell::UnsafeCell,
    ffi::c_void,
    fmt,
    marker::{PhantomData, PhantomPinned},
    mem::MaybeUninit,
    ops::Deref,
    pin::Pin,
    ptr::NonNull,
};

#[cfg(feature = "alloc")]
use alloc::boxed::Box;

use super::{raw, raw::TimerCommand, HigherPriorityTaskWoken, ResultCode, TickType, MAX_DELAY};

/// The body of a software timer, called from the timer service task on every
/// expiry.
///
/// Implemented for every `FnMut(&Timer<System>)` closure.
pub trait TimerFunction<System: raw::KernelTimer>: Send + 'static {
    fn expired(&mut self, timer: &Timer<System>);
}

impl<System, F> TimerFunction<System> for F
where
    System: raw::KernelTimer,
    F: FnMut(&Timer<System>) + Send + 'static,
{
    #[inline]
    fn expired(&mut self, timer: &Timer<System>) {
        self(timer)
    }
}

/// Owns a single software timer.
///
/// `Timer` is never constructed directly. [`DynamicTimer`] and
/// [`StaticTimer`] embed one alongside the timer body and dereference to it.
///
/// Dropping the timer posts a delete command, waiting up to
/// [`delete_block_time`](Self::delete_block_time) ticks for it to be
/// accepted.
pub struct Timer<System: raw::KernelTimer> {
    handle: Option<System::RawTimerId>,
    delete_block_time: TickType,
    body: Option<NonNull<dyn TimerFunction<System>>>,
}

// Safety: `body` is only accessed by the timer service task
unsafe impl<System: raw::KernelTimer> Send for Timer<System> {}
unsafe impl<System: raw::KernelTimer> Sync for Timer<System> {}

impl<System: raw::KernelTimer> Timer<System> {
    /// Construct a [`TimerBuilder`] to create a timer that expires `period`
    /// ticks after it's started.
    #[inline]
    pub const fn build(period: TickType) -> TimerBuilder<System> {
        TimerBuilder::new(period)
    }

    const fn unregistered(delete_block_time: TickType) -> Self {
        Self {
            handle: None,
            delete_block_time,
            body: None,
        }
    }

    /// Get a flag indicating whether the timer was created successfully and
    /// has not been deleted.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    #[inline]
    pub fn raw_id(&self) -> Option<System::RawTimerId> {
        self.handle
    }

    #[inline]
    #[track_caller]
    fn id(&self) -> System::RawTimerId {
        match self.handle {
            Some(id) => id,
            None => super::macros::invalid_handle("Timer"),
        }
    }

    /// # Safety
    ///
    /// `self` and `body` must stay in place until `self` is dropped.
    unsafe fn register(
        &mut self,
        body: NonNull<dyn TimerFunction<System>>,
        create: impl FnOnce(*mut c_void) -> Result<System::RawTimerId, ResultCode>,
    ) {
        debug_assert!(self.handle.is_none());
        self.body = Some(body);
        // New timers are dormant, so the callback can't observe `handle`
        // before it's stored
        match create((self as *mut Self).cast()) {
            Ok(id) => self.handle = Some(id),
            Err(e) => log::debug!("Timer creation failed: {:?}", e),
        }
    }

    /// Called by the trampoline on every expiry.
    ///
    /// # Safety
    ///
    /// Must be called only from the timer service task.
    unsafe fn expire(&self) {
        let Some(mut body) = self.body else {
            unreachable!("timer expired without a body")
        };
        // Safety: The body is only accessed by the timer service task
        unsafe { body.as_mut() }.expired(self);
    }

    #[inline]
    fn command(&self, command: TimerCommand, ticks: TickType) -> bool {
        // Safety: `Timer` represents a permission to access the referenced
        //         object.
        unsafe { System::raw_timer_command(self.id(), command, ticks) }.is_success()
    }

    #[inline]
    fn command_from_isr(&self, command: TimerCommand, woken: &mut HigherPriorityTaskWoken) -> bool {
        let id = self.id();
        // Safety: `Timer` represents a permission to access the referenced
        //         object.
        woken
            .track(|w| unsafe { System::raw_timer_command_from_isr(id, command, w) })
            .is_success()
    }

    /// Get a flag indicating whether the timer is running.
    #[inline]
    pub fn is_active(&self) -> bool {
        // Safety: `Timer` represents a permission to access the referenced
        //         object.
        unsafe { System::raw_timer_is_active(self.id()) }
    }

    /// Start the timer, or restart it if it's already running. Returns
    /// `false` if the command could not be posted within `ticks` ticks.
    #[inline]
    pub fn start(&self, ticks: TickType) -> bool {
        self.command(TimerCommand::Start, ticks)
    }

    #[inline]
    pub fn start_from_isr(&self, woken: &mut HigherPriorityTaskWoken) -> bool {
        self.command_from_isr(TimerCommand::Start, woken)
    }

    #[inline]
    pub fn stop(&self, ticks: TickType) -> bool {
        self.command(TimerCommand::Stop, ticks)
    }

    #[inline]
    pub fn stop_from_isr(&self, woken: &mut HigherPriorityTaskWoken) -> bool {
        self.command_from_isr(TimerCommand::Stop, woken)
    }

    /// Change the period and (re)start the timer.
    #[inline]
    pub fn change_period(&self, period: TickType, ticks: TickType) -> bool {
        self.command(TimerCommand::ChangePeriod(period), ticks)
    }

    #[inline]
    pub fn change_period_from_isr(
        &self,
        period: TickType,
        woken: &mut HigherPriorityTaskWoken,
    ) -> bool {
        self.command_from_isr(TimerCommand::ChangePeriod(period), woken)
    }

    /// Restart the timer so that it expires a whole period from now.
    #[inline]
    pub fn reset(&self, ticks: TickType) -> bool {
        self.command(TimerCommand::Reset, ticks)
    }

    #[inline]
    pub fn reset_from_isr(&self, woken: &mut HigherPriorityTaskWoken) -> bool {
        self.command_from_isr(TimerCommand::Reset, woken)
    }

    /// Switch between auto-reload (`true`) and one-shot (`false`) mode.
    #[inline]
    pub fn set_reload_mode(&self, auto_reload: bool) {
        // Safety: `Timer` represents a permission to access the referenced
        //         object.
        unsafe { System::raw_timer_set_reload_mode(self.id(), auto_reload) }
    }

    #[inline]
    pub fn reload_mode(&self) -> bool {
        // Safety: `Timer` represents a permission to access the referenced
        //         object.
        unsafe { System::raw_timer_reload_mode(self.id()) }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        // Safety: `Timer` represents a permission to access the referenced
        //         object.
        unsafe { System::raw_timer_name(self.id()) }
    }

    #[inline]
    pub fn period(&self) -> TickType {
        // Safety: `Timer` represents a permission to access the referenced
        //         object.
        unsafe { System::raw_timer_period(self.id()) }
    }

    /// Get the tick count at which the timer expires next.
    #[inline]
    pub fn expiry_time(&self) -> TickType {
        // Safety: `Timer` represents a permission to access the referenced
        //         object.
        unsafe { System::raw_timer_expiry_time(self.id()) }
    }

    /// Get the number of ticks dropping the timer waits for its delete
    /// command to be accepted.
    #[inline]
    pub fn delete_block_time(&self) -> TickType {
        self.delete_block_time
    }

    fn delete(&mut self, ticks: TickType) -> bool {
        let Some(id) = self.handle else {
            return false;
        };
        // Safety: `Timer` represents a permission to access the referenced
        //         object.
        let deleted = unsafe { System::raw_timer_command(id, TimerCommand::Delete, ticks) }
            .is_success();
        if deleted {
            log::trace!("deleted timer {:?}", id);
            self.handle = None;
        }
        deleted
    }

    fn delete_from_isr(&mut self, woken: &mut HigherPriorityTaskWoken) -> bool {
        let Some(id) = self.handle else {
            return false;
        };
        // Safety: `Timer` represents a permission to access the referenced
        //         object.
        let deleted = woken
            .track(|w| unsafe { System::raw_timer_command_from_isr(id, TimerCommand::Delete, w) })
            .is_success();
        if deleted {
            self.handle = None;
        }
        deleted
    }
}

/// The function registered with the kernel as the callback of every timer.
///
/// # Safety
///
/// `id` must be a timer created by [`Timer::register`].
unsafe fn timer_trampoline<System: raw::KernelTimer>(id: System::RawTimerId) {
    // Safety: Upheld by the caller
    let timer = unsafe { &*(System::raw_timer_context(id) as *const Timer<System>) };
    // Safety: The kernel calls timer callbacks from the timer service task
    unsafe { timer.expire() }
}

impl<System: raw::KernelTimer> Drop for Timer<System> {
    fn drop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        if !self.delete(self.delete_block_time) {
            // The kernel still refers to `self`, so it can't be released
            // until the command goes through
            log::debug!(
                "timer {:?} couldn't be deleted within {} ticks; waiting indefinitely",
                self.handle,
                self.delete_block_time
            );
            let deleted = self.delete(MAX_DELAY);
            debug_assert!(deleted);
        }
    }
}

impl<System: raw::KernelTimer> fmt::Debug for Timer<System> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Timer").field(&self.handle).finish()
    }
}

// ----------------------------------------------------------------------------

/// The builder for [`DynamicTimer`] and [`StaticTimer`].
#[must_use = "must call `spawn()` or `finish_static()` to create a timer"]
pub struct TimerBuilder<System> {
    name: &'static str,
    period: TickType,
    auto_reload: bool,
    delete_block_time: TickType,
    _phantom: PhantomData<fn() -> System>,
}

impl<System: raw::KernelTimer> TimerBuilder<System> {
    const fn new(period: TickType) -> Self {
        Self {
            name: "",
            period,
            auto_reload: false,
            delete_block_time: 0,
            _phantom: PhantomData,
        }
    }

    /// Specify the timer's name. Defaults to an empty string.
    pub const fn name(self, name: &'static str) -> Self {
        Self { name, ..self }
    }

    /// Make the timer restart itself after every expiry. Timers are one-shot
    /// by default.
    pub const fn auto_reload(self, auto_reload: bool) -> Self {
        Self {
            auto_reload,
            ..self
        }
    }

    /// Specify how long dropping the timer waits for the delete command to be
    /// accepted. Defaults to `0`.
    pub const fn delete_block_time(self, delete_block_time: TickType) -> Self {
        Self {
            delete_block_time,
            ..self
        }
    }

    /// Create a dormant timer whose control block is allocated from the
    /// kernel heap. Check [`is_valid`](Timer::is_valid) for success.
    #[cfg(feature = "alloc")]
    pub fn spawn<B: TimerFunction<System>>(self, body: B) -> Pin<Box<DynamicTimer<System, B>>> {
        let mut this = Box::pin(DynamicTimer {
            timer: Timer::unregistered(self.delete_block_time),
            body: UnsafeCell::new(body),
            _pin: PhantomPinned,
        });

        // Safety: No fields are moved out of `this`
        let this_mut = unsafe { this.as_mut().get_unchecked_mut() };
        // Safety: `UnsafeCell::get` is never null
        let body: NonNull<dyn TimerFunction<System>> =
            unsafe { NonNull::new_unchecked(this_mut.body.get()) };

        // Safety: `this` is pinned, and `timer` is dropped (deleting the
        //         timer) before `body`
        unsafe {
            this_mut.timer.register(body, |context| {
                System::raw_timer_create(
                    self.name,
                    self.period,
                    self.auto_reload,
                    context,
                    timer_trampoline::<System>,
                )
            })
        };
        this
    }

    /// Construct a [`StaticTimer`], which must be pinned and
    /// [initialized](StaticTimer::init) to create the timer.
    pub const fn finish_static<B: TimerFunction<System>>(
        self,
        body: B,
    ) -> StaticTimer<System, B> {
        StaticTimer {
            timer: Timer::unregistered(self.delete_block_time),
            cb: UnsafeCell::new(MaybeUninit::uninit()),
            body: UnsafeCell::new(body),
            name: self.name,
            period: self.period,
            auto_reload: self.auto_reload,
            _pin: PhantomPinned,
        }
    }
}

/// A timer whose control block is allocated from the kernel heap, created by
/// [`TimerBuilder::spawn`].
#[cfg(feature = "alloc")]
pub struct DynamicTimer<System: raw::KernelTimer, B> {
    timer: Timer<System>,
    body: UnsafeCell<B>,
    _pin: PhantomPinned,
}

// Safety: `body` is only accessed by the timer service task
#[cfg(feature = "alloc")]
unsafe impl<System: raw::KernelTimer, B: Send> Sync for DynamicTimer<System, B> {}

#[cfg(feature = "alloc")]
impl<System: raw::KernelTimer, B> DynamicTimer<System, B> {
    /// Delete the timer, waiting up to `ticks` ticks for the command to be
    /// accepted. On success, the timer becomes invalid and dropping it does
    /// nothing.
    pub fn delete(self: Pin<&mut Self>, ticks: TickType) -> bool {
        // Safety: No fields are moved out of `self`
        unsafe { self.get_unchecked_mut() }.timer.delete(ticks)
    }

    pub fn delete_from_isr(self: Pin<&mut Self>, woken: &mut HigherPriorityTaskWoken) -> bool {
        // Safety: No fields are moved out of `self`
        unsafe { self.get_unchecked_mut() }
            .timer
            .delete_from_isr(woken)
    }

    /// Change how long dropping the timer waits for the delete command to be
    /// accepted.
    pub fn set_delete_block_time(self: Pin<&mut Self>, ticks: TickType) {
        // Safety: No fields are moved out of `self`
        unsafe { self.get_unchecked_mut() }.timer.delete_block_time = ticks;
    }
}

#[cfg(feature = "alloc")]
impl<System: raw::KernelTimer, B> Deref for DynamicTimer<System, B> {
    type Target = Timer<System>;

    #[inline]
    fn deref(&self) -> &Timer<System> {
        &self.timer
    }
}

/// A timer with an embedded control block.
pub struct StaticTimer<System: raw::KernelTimer, B> {
    timer: Timer<System>,
    cb: UnsafeCell<MaybeUninit<System::RawStaticTimerCb>>,
    body: UnsafeCell<B>,
    name: &'static str,
    period: TickType,
    auto_reload: bool,
    _pin: PhantomPinned,
}

// Safety: `cb` is only accessed by the kernel, and `body` only by the timer
//         service task
unsafe impl<System: raw::KernelTimer, B: Send> Send for StaticTimer<System, B> {}
unsafe impl<System: raw::KernelTimer, B: Send> Sync for StaticTimer<System, B> {}

impl<System: raw::KernelTimer, B: TimerFunction<System>> StaticTimer<System, B> {
    /// Create the dormant timer. Returns `true` on success or if already
    /// created.
    pub fn init(self: Pin<&mut Self>) -> bool {
        // Safety: No fields are moved out of `self`
        let this = unsafe { self.get_unchecked_mut() };
        if this.timer.is_valid() {
            return true;
        }

        // Safety: `UnsafeCell::get` is never null
        let body: NonNull<dyn TimerFunction<System>> =
            unsafe { NonNull::new_unchecked(this.body.get()) };
        let (name, period, auto_reload) = (this.name, this.period, this.auto_reload);
        let cb = this.cb.get().cast();

        // Safety: `this` is pinned, and `timer` is dropped (deleting the
        //         timer) before the other fields
        unsafe {
            this.timer.register(body, |context| {
                System::raw_timer_create_static(
                    name,
                    period,
                    auto_reload,
                    context,
                    timer_trampoline::<System>,
                    cb,
                )
            })
        };
        this.timer.is_valid()
    }
}

impl<System: raw::KernelTimer, B> StaticTimer<System, B> {
    /// Delete the timer, waiting up to `ticks` ticks for the command to be
    /// accepted. On success, the timer becomes invalid and dropping it does
    /// nothing.
    pub fn delete(self: Pin<&mut Self>, ticks: TickType) -> bool {
        // Safety: No fields are moved out of `self`
        unsafe { self.get_unchecked_mut() }.timer.delete(ticks)
    }

    pub fn delete_from_isr(self: Pin<&mut Self>, woken: &mut HigherPriorityTaskWoken) -> bool {
        // Safety: No fields are moved out of `self`
        unsafe { self.get_unchecked_mut() }
            .timer
            .delete_from_isr(woken)
    }

    /// Change how long dropping the timer waits for the delete command to be
    /// accepted.
    pub fn set_delete_block_time(self: Pin<&mut Self>, ticks: TickType) {
        // Safety: No fields are moved out of `self`
        unsafe { self.get_unchecked_mut() }.timer.delete_block_time = ticks;
    }
}

impl<System: raw::KernelTimer, B> Deref for StaticTimer<System, B> {
    type Target = Timer<System>;

    #[inline]
    fn deref(&self) -> &Timer<System> {
        &self.timer
    }
}
