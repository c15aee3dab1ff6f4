use core::marker::PhantomData;

use super::{raw, HigherPriorityTaskWoken};

pub use raw::{KernelVersion, SchedulerState};

/// Provides access to the global functionalities of a kernel.
///
/// This trait is mostly comprised of the same methods as those of
/// [`raw::KernelBase`]. Unlike the latter, it's automatically implemented for
/// every kernel and is not meant to be used in trait bounds. Import it through
/// the [prelude](super::prelude).
pub trait Kernel: raw::KernelBase {
    /// The version of the kernel implementation.
    const VERSION: KernelVersion = Self::RAW_KERNEL_VERSION;

    /// The version string of the kernel implementation, e.g., `"0.1.0"`.
    /// A trailing `+` marks a development version.
    const VERSION_NUMBER: &'static str = Self::RAW_KERNEL_VERSION_NUMBER;

    /// Start dispatching tasks.
    ///
    /// This method returns only after [`end_scheduler`](Self::end_scheduler)
    /// is called, and only on kernels that support stopping the scheduler.
    #[inline]
    fn start_scheduler() {
        Self::raw_start_scheduler()
    }

    /// Stop the scheduler, returning control to the caller of
    /// [`start_scheduler`](Self::start_scheduler).
    #[inline]
    fn end_scheduler() {
        Self::raw_end_scheduler()
    }

    /// Hold off context switches without masking interrupts. Nestable.
    ///
    /// Blocking operations must not be called until the matching
    /// [`resume_all`](Self::resume_all).
    #[inline]
    fn suspend_all() {
        Self::raw_suspend_all()
    }

    /// Undo one [`suspend_all`](Self::suspend_all). Returns `true` if this
    /// call caused a context switch.
    #[inline]
    fn resume_all() -> bool {
        Self::raw_resume_all()
    }

    #[inline]
    fn scheduler_state() -> SchedulerState {
        Self::raw_scheduler_state()
    }

    /// Get the number of tasks the kernel is managing, including the idle
    /// task and tasks awaiting cleanup.
    #[inline]
    fn number_of_tasks() -> usize {
        Self::raw_number_of_tasks()
    }

    #[inline]
    fn tick_count() -> raw::TickType {
        Self::raw_tick_count()
    }

    #[inline]
    fn tick_count_from_isr() -> raw::TickType {
        Self::raw_tick_count_from_isr()
    }

    /// Get the time the idle task has spent running, in ticks. This tells
    /// how much of the processor time is left unused.
    #[inline]
    fn idle_run_time_counter() -> raw::TickType {
        Self::raw_idle_run_time_counter()
    }

    /// Advance the tick count by `ticks` after a tickless idle period.
    #[inline]
    fn step_tick(ticks: raw::TickType) {
        Self::raw_step_tick(ticks)
    }

    /// Process `ticks` ticks that were missed while the tick interrupt was
    /// masked. Returns `true` if a context switch is required.
    #[inline]
    fn catch_up_ticks(ticks: raw::TickType) -> bool {
        Self::raw_catch_up_ticks(ticks)
    }

    /// Let another ready task of the same priority run.
    #[inline]
    fn yield_now() {
        Self::raw_yield()
    }

    /// Request a context switch on return from the current interrupt handler
    /// if any operation recorded in `woken` unblocked a task that should
    /// preempt the interrupted one.
    #[inline]
    fn yield_from_isr(woken: HigherPriorityTaskWoken) {
        Self::raw_yield_from_isr(woken.is_set())
    }

    /// Enter a critical section. Critical sections nest.
    #[inline]
    fn enter_critical() {
        Self::raw_enter_critical()
    }

    /// Leave a critical section entered by
    /// [`enter_critical`](Self::enter_critical).
    ///
    /// # Safety
    ///
    /// Must be paired with a preceding `enter_critical` in the same task.
    /// Prefer [`critical_section`](Self::critical_section).
    #[inline]
    unsafe fn exit_critical() {
        // Safety: Upheld by the caller
        unsafe { Self::raw_exit_critical() }
    }

    /// Enter a critical section that ends when the returned guard is dropped.
    #[inline]
    fn critical_section() -> CriticalSection<Self> {
        Self::raw_enter_critical();
        CriticalSection {
            _phantom: PhantomData,
        }
    }

    /// Enter a critical section from an interrupt handler. Returns the
    /// interrupt state to restore with
    /// [`exit_critical_from_isr`](Self::exit_critical_from_isr).
    #[inline]
    fn enter_critical_from_isr() -> Self::RawInterruptMask {
        Self::raw_enter_critical_from_isr()
    }

    /// # Safety
    ///
    /// `mask` must be the value returned by the matching
    /// [`enter_critical_from_isr`](Self::enter_critical_from_isr), and
    /// critical sections must be exited in the reverse order of entry.
    #[inline]
    unsafe fn exit_critical_from_isr(mask: Self::RawInterruptMask) {
        // Safety: Upheld by the caller
        unsafe { Self::raw_exit_critical_from_isr(mask) }
    }

    /// Mask the interrupts the kernel is allowed to mask.
    #[inline]
    fn disable_interrupts() {
        Self::raw_disable_interrupts()
    }

    /// # Safety
    ///
    /// Must not be called inside a critical section.
    #[inline]
    unsafe fn enable_interrupts() {
        // Safety: Upheld by the caller
        unsafe { Self::raw_enable_interrupts() }
    }

    #[inline]
    fn is_interrupt_context() -> bool {
        Self::raw_is_interrupt_context()
    }
}

impl<T: raw::KernelBase> Kernel for T {}

/// An RAII guard of a task-context critical section, created by
/// [`Kernel::critical_section`].
#[must_use = "if unused the critical section will immediately end"]
pub struct CriticalSection<System: raw::KernelBase> {
    _phantom: PhantomData<(System, *mut ())>,
}

impl<System: raw::KernelBase> Drop for CriticalSection<System> {
    #[inline]
    fn drop(&mut self) {
        // Safety: `self` was created by a matching `raw_enter_critical` and
        //         can't leave the current task (`!Send`)
        unsafe { System::raw_exit_critical() }
    }
}
