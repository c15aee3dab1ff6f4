#![deny(unsafe_op_in_unsafe_fn)]
//! A simulation kernel for running [`rtbind`] on a hosted environment.
//!
//! The simulator implements every raw kernel trait of `rtbind` on
//! [`System`]`<Traits>`, where `Traits` is a marker type defined by
//! [`use_port!`]. Each instantiation of `use_port!` creates an independent
//! kernel instance, so a test binary can host several of them.
//!
//! ```rust,ignore
//! rtbind_port_std::use_port!(struct Traits);
//! type System = rtbind_port_std::System<Traits>;
//! ```
//!
//! # Execution model
//!
//! The simulated machine is a uniprocessor. Each task is backed by a host
//! thread, but only one of them runs at any moment; a task runs until it
//! blocks, yields, or is preempted by a kernel call that readies a
//! higher-priority task. Equal-priority tasks are not time-sliced.
//!
//! The tick count is virtual. It advances only when every task is blocked,
//! in which case it jumps to the earliest pending timeout. If no task has a
//! pending timeout at that point, the application has deadlocked and the
//! scheduler stops, returning from [`start_scheduler`][1].
//!
//! [1]: rtbind::kernel::Kernel::start_scheduler
//!
//! Interrupts are simulated by [`interrupt`], which runs a closure as an
//! interrupt handler of the running task.
//!
//! # Kernel heap
//!
//! Dynamic objects are accounted against a simulated kernel heap, which is
//! unlimited by default. [`set_heap_limit`] caps it to test allocation
//! failures.
use std::{fmt, marker::PhantomData, num::NonZeroUsize};

use rtbind::kernel::{
    raw::{KernelBase, KernelVersion, SchedulerState},
    Priority, StackDepth, TickType,
};

mod event_group;
mod queue;
mod sched;
mod semaphore;
mod storage;
mod stream_buffer;
mod task;
mod timer;

pub use self::{sched::State, storage::StaticCb};

/// Used by `use_port!`
#[doc(hidden)]
pub extern crate once_cell;

/// The number of priority levels. The timer service task runs at the
/// highest one.
pub const MAX_PRIORITIES: Priority = 8;

/// The priority of the timer service task.
pub const TIMER_TASK_PRIORITY: Priority = MAX_PRIORITIES - 1;

/// The stack depth of the idle task and the timer service task.
pub const MINIMAL_STACK_SIZE: StackDepth = 128;

/// The number of notification slots per task.
pub const NOTIFICATION_ARRAY_ENTRIES: usize = 3;

/// The size of the length field of a message in a message buffer.
pub const MESSAGE_LENGTH_BYTES: usize = 4;

macro_rules! define_id {
    ($( $(#[$meta:meta])* $Name:ident ),* $(,)?) => {$(
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $Name(NonZeroUsize);

        impl $Name {
            pub(crate) fn from_index(index: usize) -> Self {
                match NonZeroUsize::new(index.wrapping_add(1)) {
                    Some(x) => Self(x),
                    None => panic!("object index overflow"),
                }
            }

            pub(crate) fn index(self) -> usize {
                self.0.get() - 1
            }
        }

        impl fmt::Debug for $Name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($Name), "({})"), self.0)
            }
        }
    )*};
}

define_id! {
    /// Identifies a task.
    TaskId,
    /// Identifies a queue.
    QueueId,
    /// Identifies a semaphore or a mutex.
    SemaphoreId,
    EventGroupId,
    /// Identifies a stream buffer or a message buffer.
    StreamBufferId,
    TimerId,
}

/// The interrupt state saved by `enter_critical_from_isr`. `true` means
/// interrupts were masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedInterruptState(bool);

/// Implemented on a marker type by [`use_port!`].
///
/// # Safety
///
/// Only meant to be implemented by [`use_port!`].
#[doc(hidden)]
pub unsafe trait PortInstance: Send + Sync + 'static {
    fn port_state() -> &'static State;
}

/// The kernel type of the simulator instance identified by `I`.
pub struct System<I>(PhantomData<fn() -> I>);

impl<I> Clone for System<I> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I> Copy for System<I> {}

impl<I> fmt::Debug for System<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("System")
    }
}

unsafe impl<I: PortInstance> KernelBase for System<I> {
    type RawTaskId = TaskId;
    type RawInterruptMask = SavedInterruptState;

    const RAW_MAX_PRIORITIES: Priority = MAX_PRIORITIES;
    const RAW_MINIMAL_STACK_SIZE: StackDepth = MINIMAL_STACK_SIZE;
    const RAW_KERNEL_VERSION: KernelVersion = KernelVersion {
        major: 0,
        minor: 1,
        build: 0,
    };

    const RAW_KERNEL_VERSION_NUMBER: &'static str = "0.1.0";

    fn raw_start_scheduler() {
        I::port_state().start_scheduler::<I>()
    }

    fn raw_end_scheduler() {
        I::port_state().end_scheduler()
    }

    fn raw_suspend_all() {
        I::port_state().suspend_all()
    }

    fn raw_resume_all() -> bool {
        I::port_state().resume_all::<I>()
    }

    fn raw_scheduler_state() -> SchedulerState {
        I::port_state().scheduler_state()
    }

    fn raw_number_of_tasks() -> usize {
        I::port_state().number_of_tasks()
    }

    fn raw_tick_count() -> TickType {
        I::port_state().tick_count()
    }

    fn raw_tick_count_from_isr() -> TickType {
        I::port_state().tick_count()
    }

    fn raw_idle_run_time_counter() -> TickType {
        I::port_state().idle_run_time_counter()
    }

    fn raw_step_tick(ticks: TickType) {
        I::port_state().step_tick(ticks)
    }

    fn raw_catch_up_ticks(ticks: TickType) -> bool {
        I::port_state().catch_up_ticks::<I>(ticks)
    }

    fn raw_yield() {
        I::port_state().yield_cpu::<I>()
    }

    fn raw_yield_from_isr(switch_required: bool) {
        I::port_state().yield_from_isr(switch_required)
    }

    fn raw_enter_critical() {
        I::port_state().enter_critical()
    }

    unsafe fn raw_exit_critical() {
        I::port_state().exit_critical::<I>()
    }

    fn raw_enter_critical_from_isr() -> SavedInterruptState {
        SavedInterruptState(I::port_state().mask_interrupts())
    }

    unsafe fn raw_exit_critical_from_isr(mask: SavedInterruptState) {
        I::port_state().restore_interrupts::<I>(mask.0)
    }

    fn raw_disable_interrupts() {
        I::port_state().mask_interrupts();
    }

    unsafe fn raw_enable_interrupts() {
        I::port_state().restore_interrupts::<I>(false)
    }

    fn raw_is_interrupt_context() -> bool {
        I::port_state().is_interrupt_context()
    }

    fn raw_task_current() -> Option<TaskId> {
        I::port_state().current_task().map(TaskId::from_index)
    }

    fn raw_delay(ticks: TickType) {
        I::port_state().delay::<I>(ticks)
    }

    fn raw_delay_until(previous_wake_time: &mut TickType, increment: TickType) -> bool {
        I::port_state().delay_until::<I>(previous_wake_time, increment)
    }
}

/// Run `handler` as an interrupt handler of the running task.
///
/// The `*_from_isr` operations are available inside `handler`, and the
/// blocking operations are not. If `handler` requests a context switch by
/// `yield_from_isr`, the switch happens when the outermost handler returns.
///
/// # Panics
///
/// Panics if interrupts are masked, or if the caller is not running on the
/// simulated CPU.
pub fn interrupt<Traits: PortInstance, R>(handler: impl FnOnce() -> R) -> R {
    Traits::port_state().interrupt::<Traits, R>(handler)
}

/// Limit the simulated kernel heap to `limit` bytes. `None` removes the
/// limit.
///
/// The limit doesn't apply retroactively. Objects already allocated stay
/// allocated.
pub fn set_heap_limit<Traits: PortInstance>(limit: Option<usize>) {
    log::debug!("set_heap_limit({limit:?})");
    Traits::port_state().heap.lock().set_limit(limit);
}

/// Get the number of bytes allocated from the simulated kernel heap.
pub fn heap_used<Traits: PortInstance>() -> usize {
    Traits::port_state().heap.lock().used()
}

/// Define a marker type representing a simulator instance and implement
/// [`PortInstance`] on it.
///
/// ```rust,ignore
/// rtbind_port_std::use_port!(pub struct Traits);
/// pub type System = rtbind_port_std::System<Traits>;
/// ```
#[macro_export]
macro_rules! use_port {
    ($vis:vis struct $Traits:ident) => {
        $vis struct $Traits;

        mod port_std_impl {
            use super::$Traits;
            use $crate::once_cell::sync::Lazy;
            use $crate::{PortInstance, State};

            pub(super) static PORT_STATE: Lazy<State> = Lazy::new(State::new);

            unsafe impl PortInstance for $Traits {
                #[inline]
                fn port_state() -> &'static State {
                    &PORT_STATE
                }
            }
        }
    };
}
